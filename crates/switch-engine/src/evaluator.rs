use std::net::IpAddr;

use tracing::{debug, trace};

use crate::path::{directory_of, normalize_request_path};
use crate::ruleset::RuleSet;
use crate::verdict::{Evaluation, SecurityVerdict};

// ---------------------------------------------------------------------------
// Request descriptor
// ---------------------------------------------------------------------------

/// What the calling adapter knows about an inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInfo {
    /// Absolute request path as received, still percent-encoded, without
    /// the query string.
    pub path: String,
    /// Virtual root the application is mounted at (`/` for the site root).
    pub application_root: String,
    /// Whether the client is the server host itself.
    pub is_local: bool,
}

impl RequestInfo {
    /// A remote request for `path` against an application mounted at `/`.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            application_root: "/".to_string(),
            is_local: false,
        }
    }

    pub fn with_application_root(mut self, root: impl Into<String>) -> Self {
        self.application_root = root.into();
        self
    }

    pub fn local(mut self, is_local: bool) -> Self {
        self.is_local = is_local;
        self
    }
}

/// Whether `client` is the server host itself: the address the connection
/// was accepted on, or any loopback address.
pub fn is_local_client(client: IpAddr, server: IpAddr) -> bool {
    client == server || client.is_loopback()
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Evaluate `request` against `rules`.
///
/// Steps, in order: mode gate (skipped when `force_evaluation`), handler
/// exclusion, exact file rule, best directory rule, and finally the
/// `Insecure` fallback. Never fails.
pub fn evaluate(request: &RequestInfo, rules: &RuleSet, force_evaluation: bool) -> Evaluation {
    if let Some(skipped) = gate(&request.path, request.is_local, force_evaluation, rules) {
        return skipped;
    }

    let file_path = normalize_request_path(&request.path, &request.application_root);
    let directory_path = directory_of(&file_path);

    let evaluation = resolve(&file_path, directory_path, rules);
    debug!(
        path = %request.path,
        file_path = %file_path,
        directory_path,
        verdict = %evaluation.verdict,
        "request evaluated"
    );
    evaluation
}

/// Evaluate already-normalized, application-relative paths.
///
/// `request_path` is used both for handler exclusion and file lookup;
/// `request_directory_path` for the directory scan.
pub fn evaluate_paths(
    request_path: &str,
    request_directory_path: &str,
    is_local: bool,
    force_evaluation: bool,
    rules: &RuleSet,
) -> SecurityVerdict {
    if let Some(skipped) = gate(request_path, is_local, force_evaluation, rules) {
        return skipped.verdict;
    }
    resolve(request_path, request_directory_path, rules).verdict
}

/// Mode gate and handler exclusion. Returns the `Ignore` evaluation when the
/// request must not be evaluated.
fn gate(
    raw_path: &str,
    is_local: bool,
    force_evaluation: bool,
    rules: &RuleSet,
) -> Option<Evaluation> {
    if !force_evaluation && !rules.mode().requires_evaluation(is_local) {
        debug!(mode = %rules.mode(), is_local, "evaluation skipped by mode");
        return Some(Evaluation::skipped(format!(
            "mode '{}' does not require evaluation",
            rules.mode()
        )));
    }

    if rules.handler_filter().is_ignored(raw_path) {
        debug!(
            path = raw_path,
            policy = %rules.handler_policy(),
            "evaluation skipped for handler request"
        );
        return Some(Evaluation::skipped(format!(
            "request targets a handler ignored by policy '{}'",
            rules.handler_policy()
        )));
    }

    None
}

/// File rule first, then the deepest directory rule, then `Insecure`.
fn resolve(file_path: &str, directory_path: &str, rules: &RuleSet) -> Evaluation {
    if let Some(rule) = rules.find_file_rule(file_path) {
        trace!(rule = ?rule, "request matched file rule");
        return Evaluation::from_rule(rule);
    }

    if let Some(rule) = rules.find_best_directory_rule(directory_path) {
        trace!(rule = ?rule, "request matched directory rule");
        return Evaluation::from_rule(rule);
    }

    trace!(file_path, directory_path, "request matched no rule");
    Evaluation::unmatched()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
