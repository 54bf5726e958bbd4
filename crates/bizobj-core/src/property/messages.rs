//! Rule messages and the per-rule replacement list

use serde::{Deserialize, Serialize};

use crate::rules::RuleIndex;

/// A broken-rule message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleMessage {
    /// Owning property; empty for object-level messages
    pub property_name: String,
    pub text: String,
    pub rule_index: RuleIndex,
}

impl RuleMessage {
    pub fn new(property_name: impl Into<String>, text: impl Into<String>, rule_index: RuleIndex) -> Self {
        Self {
            property_name: property_name.into(),
            text: text.into(),
            rule_index,
        }
    }

    /// A message not tied to any property
    pub fn object_level(text: impl Into<String>, rule_index: RuleIndex) -> Self {
        Self::new(String::new(), text, rule_index)
    }

    pub fn is_object_level(&self) -> bool {
        self.property_name.is_empty()
    }
}

/// Ordered messages where each rule owns the entries tagged with its index
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageList(Vec<RuleMessage>);

impl MessageList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the messages of `index`; returns whether anything changed
    pub fn replace_for_rule(&mut self, index: RuleIndex, messages: Vec<RuleMessage>) -> bool {
        let existing: Vec<&RuleMessage> = self.0.iter().filter(|m| m.rule_index == index).collect();
        if existing.len() == messages.len() && existing.iter().zip(&messages).all(|(a, b)| *a == b) {
            return false;
        }
        self.0.retain(|m| m.rule_index != index);
        self.0.extend(messages);
        true
    }

    pub fn clear(&mut self) -> bool {
        let had = !self.0.is_empty();
        self.0.clear();
        had
    }

    pub fn iter(&self) -> impl Iterator<Item = &RuleMessage> {
        self.0.iter()
    }

    pub fn for_rule(&self, index: RuleIndex) -> impl Iterator<Item = &RuleMessage> {
        self.0.iter().filter(move |m| m.rule_index == index)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_vec(&self) -> Vec<RuleMessage> {
        self.0.clone()
    }
}

impl From<Vec<RuleMessage>> for MessageList {
    fn from(messages: Vec<RuleMessage>) -> Self {
        Self(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_only_touches_own_index() {
        let mut list = MessageList::new();
        let first = RuleIndex(0);
        let second = RuleIndex(1);

        assert!(list.replace_for_rule(first, vec![RuleMessage::new("Name", "required", first)]));
        assert!(list.replace_for_rule(second, vec![RuleMessage::new("Name", "too long", second)]));
        assert_eq!(list.len(), 2);

        assert!(list.replace_for_rule(first, Vec::new()));
        let texts: Vec<_> = list.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["too long"]);
    }

    #[test]
    fn test_identical_replacement_reports_no_change() {
        let mut list = MessageList::new();
        let index = RuleIndex(3);
        let messages = vec![RuleMessage::new("A", "bad", index)];
        assert!(list.replace_for_rule(index, messages.clone()));
        assert!(!list.replace_for_rule(index, messages));
        assert!(!list.replace_for_rule(RuleIndex(4), Vec::new()));
    }

    #[test]
    fn test_object_level() {
        let message = RuleMessage::object_level("dates overlap", RuleIndex(0));
        assert!(message.is_object_level());
        assert_eq!(message.property_name, "");
    }
}
