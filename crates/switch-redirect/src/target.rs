use serde::Serialize;
use url::Url;

use switch_engine::path::strip_application_root;
use switch_engine::{RedirectSettings, SecurityVerdict, WarningBypassMode};

use crate::request::{RedirectError, SwitchRequest};

/// A redirect the HTTP layer should issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Redirect {
    /// Absolute target URL.
    pub location: Url,
    /// Transport the target switches to.
    pub verdict: SecurityVerdict,
    /// Render the redirect so the browser's secure-to-insecure warning is
    /// not shown.
    pub bypass_warning: bool,
}

/// What the adapter should do with a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SwitchAction {
    /// Serve the request as it is.
    None,
    Redirect(Redirect),
}

impl SwitchAction {
    pub fn redirect(&self) -> Option<&Redirect> {
        match self {
            Self::Redirect(r) => Some(r),
            Self::None => None,
        }
    }
}

/// Turn a verdict into a concrete action for `request`.
///
/// Only a `Secure` verdict on a plain request or an `Insecure` verdict on an
/// encrypted one produces a redirect.
pub fn plan_redirect(
    request: &SwitchRequest,
    verdict: SecurityVerdict,
    settings: &RedirectSettings,
) -> Result<SwitchAction, RedirectError> {
    let to_secure = match (verdict, request.is_secure()) {
        (SecurityVerdict::Secure, false) => true,
        (SecurityVerdict::Insecure, true) => false,
        _ => return Ok(SwitchAction::None),
    };

    let mut location = match settings.targets() {
        Some(targets) => {
            let base = if to_secure {
                &targets.secure
            } else {
                &targets.insecure
            };
            if settings.maintain_path() {
                join_request(base, request)
            } else {
                base.clone()
            }
        }
        None => swap_scheme(&request.url, if to_secure { "https" } else { "http" })?,
    };

    let bypass_warning = !to_secure
        && match settings.warning_bypass_mode() {
            WarningBypassMode::AlwaysBypass => true,
            WarningBypassMode::NeverBypass => false,
            WarningBypassMode::BypassWithQueryParam => {
                let name = settings.bypass_query_param_name();
                let present = has_query_param(&request.url, name);
                if present {
                    remove_query_param(&mut location, name);
                }
                present
            }
        };

    Ok(SwitchAction::Redirect(Redirect {
        location,
        verdict,
        bypass_warning,
    }))
}

/// Same URL under `scheme`, without an explicit port.
fn swap_scheme(url: &Url, scheme: &str) -> Result<Url, RedirectError> {
    let mut target = url.clone();
    target
        .set_scheme(scheme)
        .and_then(|()| target.set_port(None))
        .map_err(|()| RedirectError::SchemeRewrite(url.to_string()))?;
    Ok(target)
}

/// Append the application-relative request path and query to `base`.
fn join_request(base: &Url, request: &SwitchRequest) -> Url {
    let relative = strip_application_root(request.url.path(), &request.application_root);
    let relative = relative.trim_start_matches('/');

    let mut target = base.clone();
    let joined = format!("{}/{}", base.path().trim_end_matches('/'), relative);
    target.set_path(&joined);
    target.set_query(request.url.query());
    target
}

/// Query parameter names are matched case-insensitively.
fn has_query_param(url: &Url, name: &str) -> bool {
    url.query_pairs().any(|(k, _)| k.eq_ignore_ascii_case(name))
}

fn remove_query_param(url: &mut Url, name: &str) {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !k.eq_ignore_ascii_case(name))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
}
