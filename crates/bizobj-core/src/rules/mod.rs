//! Business rules
//!
//! A [`Rule`] looks at a snapshot of an object's property values and reports
//! zero or more [`Violation`]s. Rules are registered in a [`RuleManager`]
//! that assigns each a stable [`RuleIndex`]; the index tags every message the
//! rule produces so a later run replaces exactly its own messages.
//!
//! Rule sets are shared between instances of a type. The per-instance run
//! state (fences, busy counters, messages) lives on the object.

pub mod builtin;
pub mod manager;

pub use builtin::{AsyncFnRule, FnRule, PatternRule, RangeRule, RequiredRule, StringLengthRule};
pub use manager::RuleManager;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::id::ObjectId;
use crate::schema::ObjectSchema;
use crate::value::{FromValue, Value};

/// Stable position of a rule within its manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleIndex(pub u32);

impl fmt::Display for RuleIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One broken-rule finding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Property the message belongs to; `None` for object-level findings
    pub property: Option<String>,
    pub message: String,
}

impl Violation {
    pub fn property(property: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            property: Some(property.into()),
            message: message.into(),
        }
    }

    pub fn object(message: impl Into<String>) -> Self {
        Self {
            property: None,
            message: message.into(),
        }
    }
}

/// Property values captured when a rule run starts
#[derive(Debug, Clone)]
pub struct RuleContext {
    pub target: ObjectId,
    pub values: IndexMap<String, Value>,
}

impl RuleContext {
    pub fn new(target: ObjectId, values: IndexMap<String, Value>) -> Self {
        Self { target, values }
    }

    /// Value of a property; `Null` when the property does not exist
    pub fn value(&self, name: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.values.get(name).unwrap_or(&NULL)
    }

    /// Typed value; `None` when absent or of another kind
    pub fn get<T: FromValue>(&self, name: &str) -> Option<T> {
        self.values.get(name).and_then(T::from_value)
    }

    /// Text value, empty when absent or not text
    pub fn text(&self, name: &str) -> &str {
        self.value(name).as_str().unwrap_or("")
    }
}

/// A business rule
#[async_trait]
pub trait Rule: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Properties whose change should re-run this rule. An empty slice
    /// makes the rule object-level: it only runs on full rule runs.
    fn trigger_properties(&self) -> &[String];

    /// Evaluate against a value snapshot
    async fn execute(&self, context: &RuleContext) -> Vec<Violation>;
}

/// Builds the rule set for a schema
pub trait RuleSupplier: Send + Sync {
    fn create_rule_manager(&self, schema: &ObjectSchema) -> RuleManager;
}

/// In-memory [`RuleSupplier`] keyed by type name
#[derive(Default)]
pub struct RuleRegistry {
    managers: RwLock<HashMap<String, RuleManager>>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the rule set shared by every instance of `type_name`
    pub fn register(&self, type_name: impl Into<String>, rules: RuleManager) {
        self.managers.write().insert(type_name.into(), rules);
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.managers.read().contains_key(type_name)
    }
}

impl RuleSupplier for RuleRegistry {
    /// Unknown types get an empty rule set
    fn create_rule_manager(&self, schema: &ObjectSchema) -> RuleManager {
        self.managers
            .read()
            .get(&schema.type_name)
            .cloned()
            .unwrap_or_default()
    }
}

/// Shared handle to a rule
pub type SharedRule = Arc<dyn Rule>;
