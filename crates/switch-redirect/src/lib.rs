//! Redirect planning for secure-switch.
//!
//! This crate sits between an HTTP front end and the `switch-engine`
//! evaluator. A [`Switch`] runs a chain of [`EvaluationHook`]s, evaluates the
//! request against the current rule set, and plans the redirect (if any) that
//! moves the client to the transport its path requires.
//!
//! ```text
//! request ──> [hooks] ──> evaluate ──> plan_redirect ──> SwitchAction
//!                │                                          │
//!              Cancel ─────────────────────────────────> None
//! ```
//!
//! Redirect targets either swap the scheme on the same host or point at the
//! configured `encrypted_uri` / `unencrypted_uri`, optionally carrying the
//! application-relative path and query along.

pub mod hook;
pub mod request;
mod switch;
pub mod target;

pub use hook::{EvaluationHook, ExemptHosts, HookDecision};
pub use request::{RedirectError, SwitchRequest};
pub use switch::{Decision, Switch};
pub use target::{plan_redirect, Redirect, SwitchAction};
