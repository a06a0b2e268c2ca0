use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use switch_engine::{evaluate, Evaluation, SharedRuleSet};

use crate::hook::{EvaluationHook, HookDecision};
use crate::request::{RedirectError, SwitchRequest};
use crate::target::{plan_redirect, SwitchAction};

/// The evaluation behind a decision and the action it leads to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub evaluation: Evaluation,
    pub action: SwitchAction,
}

/// Request switching front end: hooks, evaluation and redirect planning
/// against one [`SharedRuleSet`].
pub struct Switch {
    rules: Arc<SharedRuleSet>,
    hooks: Vec<Box<dyn EvaluationHook>>,
}

impl Switch {
    pub fn new(rules: Arc<SharedRuleSet>) -> Self {
        Self {
            rules,
            hooks: Vec::new(),
        }
    }

    /// Register a hook; hooks run in registration order.
    pub fn with_hook(mut self, hook: impl EvaluationHook + 'static) -> Self {
        self.hooks.push(Box::new(hook));
        self
    }

    pub fn rules(&self) -> &Arc<SharedRuleSet> {
        &self.rules
    }

    /// Decide what to do with `request`.
    ///
    /// A cancelling hook short-circuits to an `Ignore` evaluation with no
    /// action. Otherwise the verdict and redirect settings come from the same
    /// rule set generation.
    pub fn decide(&self, request: &SwitchRequest) -> Result<Decision, RedirectError> {
        for hook in &self.hooks {
            if let HookDecision::Cancel(reason) = hook.before_evaluate(request) {
                debug!(url = %request.url, reason = %reason, "evaluation cancelled by hook");
                return Ok(Decision {
                    evaluation: Evaluation::skipped(format!("cancelled: {reason}")),
                    action: SwitchAction::None,
                });
            }
        }

        let rules = self.rules.load();
        let evaluation = evaluate(&request.request_info(), &rules, request.force_evaluation);
        let action = plan_redirect(request, evaluation.verdict, rules.redirect())?;

        if let SwitchAction::Redirect(redirect) = &action {
            info!(
                url = %request.url,
                location = %redirect.location,
                verdict = %redirect.verdict,
                bypass_warning = redirect.bypass_warning,
                "request switched"
            );
        }

        Ok(Decision { evaluation, action })
    }
}

impl fmt::Debug for Switch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Switch")
            .field("rules", &self.rules)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}
