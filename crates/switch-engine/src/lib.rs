//! # switch-engine
//!
//! Decides whether a web request must travel over an encrypted connection,
//! an unencrypted one, or whether its transport does not matter.  This crate
//! loads YAML rule files, normalizes file and directory rule paths, and
//! evaluates request paths against them.  It never issues redirects itself;
//! see the `switch-redirect` crate for that.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use switch_engine::{evaluate, loader, RequestInfo};
//!
//! let rules = loader::load_rules("rules.yaml").unwrap();
//! let request = RequestInfo::new("/admin/users.aspx");
//! let evaluation = evaluate(&request, &rules, false);
//! println!("{} ({})", evaluation.verdict, evaluation.reason);
//! ```

mod error;
mod evaluator;
pub mod loader;
mod matcher;
pub mod path;
mod rule;
mod ruleset;
pub mod schema;
mod shared;
mod verdict;

// Re-export primary public API at crate root.
pub use error::ConfigError;
pub use evaluator::{evaluate, evaluate_paths, is_local_client, RequestInfo};
pub use matcher::{HandlerFilter, BUILT_IN_HANDLERS, STANDARD_HANDLER_PATTERNS};
pub use rule::{DirectoryRule, FileRule, PathRule, RuleCollection, RuleKind};
pub use ruleset::{
    HandlerIgnorePolicy, Mode, RedirectSettings, RedirectTargets, RuleSet, RuleSetBuilder,
    WarningBypassMode, DEFAULT_BYPASS_QUERY_PARAM,
};
pub use shared::SharedRuleSet;
pub use verdict::{Evaluation, MatchedRule, SecurityVerdict};
