use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::ruleset::RuleSet;

/// A [`RuleSet`] that can be replaced while requests are being evaluated.
///
/// Each evaluation runs against the generation that was current when it
/// started; a reload never exposes a partially built rule set.
pub struct SharedRuleSet {
    current: ArcSwap<RuleSet>,
}

impl SharedRuleSet {
    pub fn new(rules: RuleSet) -> Self {
        Self {
            current: ArcSwap::from_pointee(rules),
        }
    }

    /// Snapshot of the current generation.
    pub fn load(&self) -> Arc<RuleSet> {
        self.current.load_full()
    }

    /// Install `rules` as the current generation, returning the previous one.
    pub fn replace(&self, rules: RuleSet) -> Arc<RuleSet> {
        self.current.swap(Arc::new(rules))
    }
}

impl fmt::Debug for SharedRuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rules = self.current.load();
        f.debug_struct("SharedRuleSet")
            .field("mode", &rules.mode())
            .field("file_rules", &rules.files().len())
            .field("directory_rules", &rules.directories().len())
            .finish()
    }
}
