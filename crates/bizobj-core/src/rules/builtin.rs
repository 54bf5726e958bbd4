//! Stock rules
//!
//! Property rules report violations against their own property; closures
//! cover anything else, including object-level rules and rules that await.

use std::future::Future;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use regex::Regex;

use super::{Rule, RuleContext, Violation};

/// Property must hold a non-blank value
pub struct RequiredRule {
    name: String,
    triggers: Vec<String>,
    message: String,
}

impl RequiredRule {
    pub fn new(property: impl Into<String>) -> Self {
        let property = property.into();
        Self {
            name: format!("Required({property})"),
            message: format!("{property} is required"),
            triggers: vec![property],
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

#[async_trait]
impl Rule for RequiredRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn trigger_properties(&self) -> &[String] {
        &self.triggers
    }

    async fn execute(&self, context: &RuleContext) -> Vec<Violation> {
        let property = &self.triggers[0];
        if context.value(property).is_blank() {
            vec![Violation::property(property, &self.message)]
        } else {
            Vec::new()
        }
    }
}

/// Text length (in characters) must lie within `min..=max`. Null passes.
pub struct StringLengthRule {
    name: String,
    triggers: Vec<String>,
    min: usize,
    max: usize,
}

impl StringLengthRule {
    pub fn new(property: impl Into<String>, min: usize, max: usize) -> Self {
        let property = property.into();
        Self {
            name: format!("StringLength({property})"),
            triggers: vec![property],
            min,
            max,
        }
    }
}

#[async_trait]
impl Rule for StringLengthRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn trigger_properties(&self) -> &[String] {
        &self.triggers
    }

    async fn execute(&self, context: &RuleContext) -> Vec<Violation> {
        let property = &self.triggers[0];
        let Some(text) = context.value(property).as_str() else {
            return Vec::new();
        };
        let len = text.chars().count();
        if len < self.min {
            vec![Violation::property(
                property,
                format!("{property} must be at least {} characters", self.min),
            )]
        } else if len > self.max {
            vec![Violation::property(
                property,
                format!("{property} must be at most {} characters", self.max),
            )]
        } else {
            Vec::new()
        }
    }
}

/// Numeric value must lie within `min..=max`. Null and non-numbers pass.
pub struct RangeRule {
    name: String,
    triggers: Vec<String>,
    min: f64,
    max: f64,
}

impl RangeRule {
    pub fn new(property: impl Into<String>, min: f64, max: f64) -> Self {
        let property = property.into();
        Self {
            name: format!("Range({property})"),
            triggers: vec![property],
            min,
            max,
        }
    }
}

#[async_trait]
impl Rule for RangeRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn trigger_properties(&self) -> &[String] {
        &self.triggers
    }

    async fn execute(&self, context: &RuleContext) -> Vec<Violation> {
        let property = &self.triggers[0];
        match context.value(property).as_f64() {
            Some(n) if n < self.min || n > self.max => vec![Violation::property(
                property,
                format!("{property} must be between {} and {}", self.min, self.max),
            )],
            _ => Vec::new(),
        }
    }
}

/// Text must match a regular expression. Null and empty text pass.
pub struct PatternRule {
    name: String,
    triggers: Vec<String>,
    pattern: Regex,
    message: String,
}

impl PatternRule {
    pub fn new(property: impl Into<String>, pattern: &str) -> Result<Self, regex::Error> {
        let property = property.into();
        Ok(Self {
            name: format!("Pattern({property})"),
            message: format!("{property} has an invalid format"),
            pattern: Regex::new(pattern)?,
            triggers: vec![property],
        })
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

#[async_trait]
impl Rule for PatternRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn trigger_properties(&self) -> &[String] {
        &self.triggers
    }

    async fn execute(&self, context: &RuleContext) -> Vec<Violation> {
        let property = &self.triggers[0];
        match context.value(property).as_str() {
            Some(text) if !text.is_empty() && !self.pattern.is_match(text) => {
                vec![Violation::property(property, &self.message)]
            }
            _ => Vec::new(),
        }
    }
}

type SyncCheck = Box<dyn Fn(&RuleContext) -> Vec<Violation> + Send + Sync>;

/// Rule from a synchronous closure
pub struct FnRule {
    name: String,
    triggers: Vec<String>,
    check: SyncCheck,
}

impl FnRule {
    pub fn new<F>(name: impl Into<String>, triggers: &[&str], check: F) -> Self
    where
        F: Fn(&RuleContext) -> Vec<Violation> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            triggers: triggers.iter().map(|t| t.to_string()).collect(),
            check: Box::new(check),
        }
    }
}

#[async_trait]
impl Rule for FnRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn trigger_properties(&self) -> &[String] {
        &self.triggers
    }

    async fn execute(&self, context: &RuleContext) -> Vec<Violation> {
        (self.check)(context)
    }
}

type AsyncCheck = Box<dyn Fn(RuleContext) -> BoxFuture<'static, Vec<Violation>> + Send + Sync>;

/// Rule from an async closure, for checks that perform I/O
pub struct AsyncFnRule {
    name: String,
    triggers: Vec<String>,
    check: AsyncCheck,
}

impl AsyncFnRule {
    pub fn new<F, Fut>(name: impl Into<String>, triggers: &[&str], check: F) -> Self
    where
        F: Fn(RuleContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Vec<Violation>> + Send + 'static,
    {
        Self {
            name: name.into(),
            triggers: triggers.iter().map(|t| t.to_string()).collect(),
            check: Box::new(move |context| check(context).boxed()),
        }
    }
}

#[async_trait]
impl Rule for AsyncFnRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn trigger_properties(&self) -> &[String] {
        &self.triggers
    }

    async fn execute(&self, context: &RuleContext) -> Vec<Violation> {
        (self.check)(context.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::ObjectId;
    use crate::value::Value;
    use indexmap::IndexMap;

    fn context(pairs: &[(&str, Value)]) -> RuleContext {
        let values: IndexMap<String, Value> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        RuleContext::new(ObjectId::new(), values)
    }

    #[tokio::test]
    async fn test_required() {
        let rule = RequiredRule::new("Name");
        assert_eq!(rule.execute(&context(&[("Name", "  ".into())])).await.len(), 1);
        assert_eq!(rule.execute(&context(&[])).await.len(), 1);
        assert!(rule.execute(&context(&[("Name", "Ada".into())])).await.is_empty());

        let custom = RequiredRule::new("Name").with_message("Who are you?");
        let violations = custom.execute(&context(&[])).await;
        assert_eq!(violations[0], Violation::property("Name", "Who are you?"));
    }

    #[tokio::test]
    async fn test_string_length() {
        let rule = StringLengthRule::new("Code", 2, 4);
        assert_eq!(rule.execute(&context(&[("Code", "a".into())])).await.len(), 1);
        assert_eq!(rule.execute(&context(&[("Code", "abcde".into())])).await.len(), 1);
        assert!(rule.execute(&context(&[("Code", "äöü".into())])).await.is_empty());
        assert!(rule.execute(&context(&[("Code", Value::Null)])).await.is_empty());
    }

    #[tokio::test]
    async fn test_range() {
        let rule = RangeRule::new("Age", 0.0, 150.0);
        assert!(rule.execute(&context(&[("Age", 36.into())])).await.is_empty());
        assert_eq!(rule.execute(&context(&[("Age", (-1).into())])).await.len(), 1);
        assert_eq!(rule.execute(&context(&[("Age", 150.5.into())])).await.len(), 1);
    }

    #[tokio::test]
    async fn test_pattern() {
        assert!(PatternRule::new("Email", "(").is_err());
        let rule = PatternRule::new("Email", r"^[^@\s]+@[^@\s]+$").unwrap();
        assert!(rule.execute(&context(&[("Email", "a@b.c".into())])).await.is_empty());
        assert!(rule.execute(&context(&[("Email", "".into())])).await.is_empty());
        assert_eq!(rule.execute(&context(&[("Email", "nope".into())])).await.len(), 1);
    }

    #[tokio::test]
    async fn test_closures() {
        let sync_rule = FnRule::new("StartBeforeEnd", &["Start", "End"], |ctx| {
            match (ctx.get::<i64>("Start"), ctx.get::<i64>("End")) {
                (Some(start), Some(end)) if start > end => vec![Violation::object("Start after end")],
                _ => Vec::new(),
            }
        });
        assert_eq!(sync_rule.trigger_properties(), ["Start".to_string(), "End".to_string()]);
        let found = sync_rule
            .execute(&context(&[("Start", 5.into()), ("End", 1.into())]))
            .await;
        assert_eq!(found, vec![Violation::object("Start after end")]);

        let async_rule = AsyncFnRule::new("Unique", &["Name"], |ctx: RuleContext| async move {
            tokio::task::yield_now().await;
            if ctx.text("Name") == "taken" {
                vec![Violation::property("Name", "Name is taken")]
            } else {
                Vec::new()
            }
        });
        assert_eq!(async_rule.execute(&context(&[("Name", "taken".into())])).await.len(), 1);
        assert!(async_rule.execute(&context(&[("Name", "free".into())])).await.is_empty());
    }
}
