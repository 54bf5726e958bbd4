//! Ordered, index-stable rule set

use std::fmt;
use std::sync::Arc;

use super::{Rule, RuleIndex, SharedRule};

/// Rules of one object type, in registration order.
///
/// Cloning shares the rules themselves.
#[derive(Clone, Default)]
pub struct RuleManager {
    rules: Vec<SharedRule>,
}

impl RuleManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule; indices are never reused
    pub fn add_rule(&mut self, rule: impl Rule + 'static) -> RuleIndex {
        self.add_shared(Arc::new(rule))
    }

    pub fn add_shared(&mut self, rule: SharedRule) -> RuleIndex {
        let index = RuleIndex(self.rules.len() as u32);
        self.rules.push(rule);
        index
    }

    /// Builder form of [`add_rule`](Self::add_rule)
    pub fn with_rule(mut self, rule: impl Rule + 'static) -> Self {
        self.add_rule(rule);
        self
    }

    pub fn get(&self, index: RuleIndex) -> Option<&SharedRule> {
        self.rules.get(index.0 as usize)
    }

    /// Every rule with its index
    pub fn rules(&self) -> impl Iterator<Item = (RuleIndex, &SharedRule)> {
        self.rules
            .iter()
            .enumerate()
            .map(|(i, rule)| (RuleIndex(i as u32), rule))
    }

    /// Rules triggered by a change of `property`
    pub fn rules_for<'a>(&'a self, property: &'a str) -> impl Iterator<Item = (RuleIndex, &'a SharedRule)> + 'a {
        self.rules()
            .filter(move |(_, rule)| rule.trigger_properties().iter().any(|p| p == property))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl fmt::Debug for RuleManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.rules.iter().map(|rule| rule.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{RequiredRule, StringLengthRule};

    #[test]
    fn test_indices_follow_registration() {
        let mut rules = RuleManager::new();
        let first = rules.add_rule(RequiredRule::new("Name"));
        let second = rules.add_rule(StringLengthRule::new("Name", 0, 10));
        let third = rules.add_rule(RequiredRule::new("Email"));

        assert_eq!((first, second, third), (RuleIndex(0), RuleIndex(1), RuleIndex(2)));
        assert_eq!(rules.len(), 3);
        assert_eq!(rules.get(second).map(|r| r.name().to_string()), Some("StringLength(Name)".to_string()));
    }

    #[test]
    fn test_rules_for_property() {
        let rules = RuleManager::new()
            .with_rule(RequiredRule::new("Name"))
            .with_rule(RequiredRule::new("Email"))
            .with_rule(StringLengthRule::new("Name", 1, 5));

        let indices: Vec<RuleIndex> = rules.rules_for("Name").map(|(i, _)| i).collect();
        assert_eq!(indices, vec![RuleIndex(0), RuleIndex(2)]);
        assert_eq!(rules.rules_for("Phone").count(), 0);
    }

    #[test]
    fn test_clone_shares_rules() {
        let rules = RuleManager::new().with_rule(RequiredRule::new("Name"));
        let copy = rules.clone();
        let a = rules.get(RuleIndex(0)).unwrap();
        let b = copy.get(RuleIndex(0)).unwrap();
        assert!(Arc::ptr_eq(a, b));
    }
}
