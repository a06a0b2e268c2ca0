use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::ConfigError;
use crate::rule::{PathRule, RuleKind};

/// The transport a request should be served over.
///
/// This is both the outcome of evaluation and the `secure` value carried by
/// every rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityVerdict {
    /// Serve over an encrypted transport.
    #[default]
    Secure,
    /// Serve over an unencrypted transport.
    Insecure,
    /// Leave the transport of this request untouched.
    Ignore,
}

impl fmt::Display for SecurityVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Secure => "secure",
            Self::Insecure => "insecure",
            Self::Ignore => "ignore",
        };
        f.write_str(s)
    }
}

impl FromStr for SecurityVerdict {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match crate::ruleset::enum_key(s).as_str() {
            "secure" => Ok(Self::Secure),
            "insecure" => Ok(Self::Insecure),
            "ignore" => Ok(Self::Ignore),
            _ => Err(ConfigError::InvalidValue {
                attribute: "secure",
                value: s.to_string(),
            }),
        }
    }
}

/// The rule that decided an [`Evaluation`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchedRule {
    pub kind: RuleKind,
    pub path: String,
}

/// The outcome of evaluating a request against a [`RuleSet`](crate::RuleSet).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Evaluation {
    /// The resolved transport requirement.
    pub verdict: SecurityVerdict,
    /// The rule that produced the verdict, if any.
    pub matched_rule: Option<MatchedRule>,
    /// Human-readable reason explaining the verdict.
    pub reason: String,
}

impl Evaluation {
    /// Evaluation did not run (mode gate or handler exclusion).
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            verdict: SecurityVerdict::Ignore,
            matched_rule: None,
            reason: reason.into(),
        }
    }

    /// No file or directory rule applied; the request resolves to insecure.
    pub fn unmatched() -> Self {
        Self {
            verdict: SecurityVerdict::Insecure,
            matched_rule: None,
            reason: "no rule matched the request".to_string(),
        }
    }

    /// Verdict taken from `rule`.
    pub fn from_rule<R: PathRule>(rule: &R) -> Self {
        Self {
            verdict: rule.security(),
            matched_rule: Some(MatchedRule {
                kind: R::KIND,
                path: rule.path().to_string(),
            }),
            reason: format!("matched {} rule '{}'", R::KIND, rule.path()),
        }
    }
}
