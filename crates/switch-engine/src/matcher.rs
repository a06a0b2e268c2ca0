use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::path::final_segment;
use crate::ruleset::HandlerIgnorePolicy;

/// Framework-internal handler names skipped under
/// [`HandlerIgnorePolicy::BuiltIn`].
pub const BUILT_IN_HANDLERS: &[&str] = &["trace.axd", "webresource.axd"];

/// Handler-style suffixes skipped under
/// [`HandlerIgnorePolicy::StandardExtensions`].
pub const STANDARD_HANDLER_PATTERNS: &[&str] = &["*.axd", "*.ashx", "*.asmx/js", "*.asmx/jsdebug"];

/// Decides whether a raw request path targets a handler that should never be
/// switched.
///
/// Suffix patterns are compiled once when the rule set is built.
#[derive(Debug, Clone)]
pub struct HandlerFilter {
    policy: HandlerIgnorePolicy,
    suffixes: Option<GlobSet>,
}

impl HandlerFilter {
    pub fn new(policy: HandlerIgnorePolicy) -> Result<Self, globset::Error> {
        let suffixes = match policy {
            HandlerIgnorePolicy::StandardExtensions => {
                let mut builder = GlobSetBuilder::new();
                for pattern in STANDARD_HANDLER_PATTERNS {
                    // `*` crosses `/` so "*.asmx/js" anchors on the suffix only.
                    builder.add(GlobBuilder::new(pattern).case_insensitive(true).build()?);
                }
                Some(builder.build()?)
            }
            HandlerIgnorePolicy::BuiltIn | HandlerIgnorePolicy::None => None,
        };
        Ok(Self { policy, suffixes })
    }

    pub fn policy(&self) -> HandlerIgnorePolicy {
        self.policy
    }

    /// Returns `true` if `raw_path` should be left alone.
    pub fn is_ignored(&self, raw_path: &str) -> bool {
        match self.policy {
            HandlerIgnorePolicy::BuiltIn => {
                let name = final_segment(raw_path);
                BUILT_IN_HANDLERS
                    .iter()
                    .any(|handler| name.eq_ignore_ascii_case(handler))
            }
            HandlerIgnorePolicy::StandardExtensions => self
                .suffixes
                .as_ref()
                .is_some_and(|set| set.is_match(raw_path)),
            HandlerIgnorePolicy::None => false,
        }
    }
}
