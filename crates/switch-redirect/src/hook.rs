use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::request::SwitchRequest;

/// Outcome of an [`EvaluationHook`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookDecision {
    /// Let evaluation proceed.
    Continue,
    /// Skip evaluation for this request. The `String` is a human-readable
    /// reason.
    Cancel(String),
}

/// Runs before a request is evaluated and may cancel the evaluation.
///
/// Hooks are synchronous and must not perform I/O. They run in the order they
/// were registered; the first `Cancel` wins and later hooks are not called.
pub trait EvaluationHook: Send + Sync {
    fn before_evaluate(&self, request: &SwitchRequest) -> HookDecision;
}

impl<F> EvaluationHook for F
where
    F: Fn(&SwitchRequest) -> HookDecision + Send + Sync,
{
    fn before_evaluate(&self, request: &SwitchRequest) -> HookDecision {
        self(request)
    }
}

// ---------------------------------------------------------------------------
// ExemptHosts
// ---------------------------------------------------------------------------

/// Cancels evaluation for requests whose host matches one of a set of glob
/// patterns (`*.internal.example.com`, `localhost`).
///
/// Host names are compared case-insensitively and without the port.
#[derive(Debug, Clone)]
pub struct ExemptHosts {
    patterns: Vec<String>,
    set: GlobSet,
}

impl ExemptHosts {
    pub fn new<I, S>(patterns: I) -> Result<Self, globset::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = GlobSetBuilder::new();
        let mut kept = Vec::new();
        for pattern in patterns {
            let pattern = pattern.as_ref().trim().to_ascii_lowercase();
            if pattern.is_empty() {
                continue;
            }
            builder.add(Glob::new(&pattern)?);
            kept.push(pattern);
        }
        Ok(Self {
            patterns: kept,
            set: builder.build()?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn is_exempt(&self, host: &str) -> bool {
        !host.is_empty() && self.set.is_match(host.to_ascii_lowercase())
    }
}

impl EvaluationHook for ExemptHosts {
    fn before_evaluate(&self, request: &SwitchRequest) -> HookDecision {
        if self.is_exempt(request.host()) {
            HookDecision::Cancel(format!("host '{}' is exempt", request.host()))
        } else {
            HookDecision::Continue
        }
    }
}
