use thiserror::Error;
use url::Url;

use switch_engine::RequestInfo;

#[derive(Debug, Error)]
pub enum RedirectError {
    #[error("unsupported request scheme '{0}'")]
    UnsupportedScheme(String),
    #[error("invalid request URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("request has no host")]
    MissingHost,
    #[error("cannot rewrite '{0}' to the target scheme")]
    SchemeRewrite(String),
}

/// An inbound request as seen by the switching adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchRequest {
    /// Absolute URL the client asked for.
    pub url: Url,
    /// Virtual root the application is mounted at.
    pub application_root: String,
    /// Whether the client is the server host itself.
    pub is_local: bool,
    /// Evaluate even when the mode would skip this request.
    pub force_evaluation: bool,
}

impl SwitchRequest {
    /// Wrap an absolute `http` or `https` URL.
    pub fn new(url: Url) -> Result<Self, RedirectError> {
        match url.scheme() {
            "http" | "https" => Ok(Self {
                url,
                application_root: "/".to_string(),
                is_local: false,
                force_evaluation: false,
            }),
            other => Err(RedirectError::UnsupportedScheme(other.to_string())),
        }
    }

    /// Parse an absolute request URL.
    pub fn parse(url: &str) -> Result<Self, RedirectError> {
        let parsed = Url::parse(url).map_err(|source| RedirectError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;
        Self::new(parsed)
    }

    /// Reassemble a request from the pieces a front proxy forwards:
    /// scheme, `Host` value and the request target (`/path?query`).
    pub fn from_parts(scheme: &str, host: &str, path_and_query: &str) -> Result<Self, RedirectError> {
        let scheme = scheme.trim().to_ascii_lowercase();
        if scheme != "http" && scheme != "https" {
            return Err(RedirectError::UnsupportedScheme(scheme));
        }
        let host = host.trim();
        if host.is_empty() {
            return Err(RedirectError::MissingHost);
        }
        let target = if path_and_query.starts_with('/') {
            path_and_query.to_string()
        } else {
            format!("/{path_and_query}")
        };
        Self::parse(&format!("{scheme}://{host}{target}"))
    }

    pub fn with_application_root(mut self, root: impl Into<String>) -> Self {
        self.application_root = root.into();
        self
    }

    pub fn local(mut self, is_local: bool) -> Self {
        self.is_local = is_local;
        self
    }

    pub fn forced(mut self, force_evaluation: bool) -> Self {
        self.force_evaluation = force_evaluation;
        self
    }

    /// Whether the request arrived over an encrypted transport.
    pub fn is_secure(&self) -> bool {
        self.url.scheme() == "https"
    }

    /// Host name without port, empty when the URL has none.
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    /// Descriptor handed to the evaluator.
    pub fn request_info(&self) -> RequestInfo {
        RequestInfo::new(self.url.path())
            .with_application_root(self.application_root.as_str())
            .local(self.is_local)
    }
}
