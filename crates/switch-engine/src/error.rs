use thiserror::Error;

use crate::rule::RuleKind;

/// Errors raised while building a [`RuleSet`](crate::RuleSet).
///
/// Every variant is fatal for the configuration generation that produced it:
/// evaluation cannot proceed until the operator corrects the rules file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An enumerated attribute carried a value outside its allowed set.
    #[error("invalid value '{value}' for the '{attribute}' attribute")]
    InvalidValue {
        attribute: &'static str,
        value: String,
    },

    /// Only one of the two redirect URIs was configured.
    #[error("you must specify both 'encrypted_uri' and 'unencrypted_uri', or neither")]
    PartialRedirectUris,

    /// A redirect URI could not be parsed as an absolute URL.
    #[error("invalid '{attribute}' value '{value}': {reason}")]
    InvalidUri {
        attribute: &'static str,
        value: String,
        reason: url::ParseError,
    },

    /// A rule entry has no usable `path` attribute.
    #[error("'path' attribute not found on {kind} rule")]
    MissingPath { kind: RuleKind },

    /// Two rules of the same kind normalize to the same path.
    #[error("duplicate {kind} rule for path '{path}'")]
    DuplicateRule { kind: RuleKind, path: String },

    /// The rules document itself is malformed (syntax, unknown element or
    /// attribute, wrong value type).
    #[error("failed to parse rules: {0}")]
    Parse(String),

    /// The built-in handler suffix patterns failed to compile.
    #[error("failed to compile handler patterns: {0}")]
    HandlerPatterns(#[from] globset::Error),
}
