//! Dynamically typed property values
//!
//! A schema entry declares a [`ValueKind`]; the property then only accepts
//! values of that kind (or `Null`). Child graph nodes travel as
//! [`Value::Object`] and compare by identity.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::ObjectId;
use crate::node::GraphNode;

/// Declared type of a property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ValueKind {
    /// Accepts anything
    #[default]
    Any,
    Bool,
    Int,
    /// Accepts integers too
    Float,
    Text,
    Timestamp,
    Json,
    /// A child entity, validate object or list
    Object,
}

impl ValueKind {
    /// Whether a value may be stored in a property of this kind
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) | (ValueKind::Any, _) => true,
            (ValueKind::Bool, Value::Bool(_)) => true,
            (ValueKind::Int, Value::Int(_)) => true,
            (ValueKind::Float, Value::Float(_) | Value::Int(_)) => true,
            (ValueKind::Text, Value::Text(_)) => true,
            (ValueKind::Timestamp, Value::Timestamp(_)) => true,
            (ValueKind::Json, Value::Json(_)) => true,
            (ValueKind::Object, Value::Object(_)) => true,
            _ => false,
        }
    }

    /// Stored form of an accepted value; integers widen into `Float`
    pub fn coerce(&self, value: Value) -> Value {
        match (self, value) {
            (ValueKind::Float, Value::Int(n)) => Value::Float(n as f64),
            (_, value) => value,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Shared handle to a child graph node
#[derive(Clone)]
pub struct ObjectRef(Arc<dyn GraphNode>);

impl ObjectRef {
    /// Wrap a concrete node
    pub fn new<T: GraphNode>(node: Arc<T>) -> Self {
        Self(node)
    }

    /// Wrap an already type-erased node
    pub fn from_node(node: Arc<dyn GraphNode>) -> Self {
        Self(node)
    }

    /// The node behind the handle
    pub fn node(&self) -> &Arc<dyn GraphNode> {
        &self.0
    }

    /// Identity of the node
    pub fn id(&self) -> ObjectId {
        self.0.id()
    }

    /// Identity comparison
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        self.id() == other.id()
    }

    /// Recover the concrete node type
    pub fn downcast<T: GraphNode>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.0).as_any_arc().downcast::<T>().ok()
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ObjectRef").field(&self.id()).finish()
    }
}

/// A property value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Json(serde_json::Value),
    /// Child nodes are marshaled through their own snapshots
    #[serde(skip)]
    Object(ObjectRef),
}

impl Value {
    /// Name of the variant, for error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Float(_) => "Float",
            Value::Text(_) => "Text",
            Value::Timestamp(_) => "Timestamp",
            Value::Json(_) => "Json",
            Value::Object(_) => "Object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Null, or text that is empty after trimming
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(text) => text.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Integers widen to floats
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    /// The child node held by this value, if any
    pub fn as_node(&self) -> Option<&Arc<dyn GraphNode>> {
        self.as_object().map(ObjectRef::node)
    }

    /// Copy suitable for the wire: child nodes become `Null`
    pub fn detached(&self) -> Value {
        match self {
            Value::Object(_) => Value::Null,
            other => other.clone(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            (Value::Json(a), Value::Json(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value as i64)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Int(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Timestamp(value)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        Value::Json(value)
    }
}

impl From<ObjectRef> for Value {
    fn from(value: ObjectRef) -> Self {
        Value::Object(value)
    }
}

impl<T: GraphNode> From<Arc<T>> for Value {
    fn from(value: Arc<T>) -> Self {
        Value::Object(ObjectRef::new(value))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Typed extraction from a [`Value`]
pub trait FromValue: Sized {
    /// Kind reported in type mismatch errors
    const KIND: ValueKind;

    /// `None` when the value has another kind
    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for Value {
    const KIND: ValueKind = ValueKind::Any;

    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

impl FromValue for bool {
    const KIND: ValueKind = ValueKind::Bool;

    fn from_value(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

impl FromValue for i64 {
    const KIND: ValueKind = ValueKind::Int;

    fn from_value(value: &Value) -> Option<Self> {
        value.as_i64()
    }
}

impl FromValue for i32 {
    const KIND: ValueKind = ValueKind::Int;

    fn from_value(value: &Value) -> Option<Self> {
        value.as_i64().and_then(|i| i32::try_from(i).ok())
    }
}

impl FromValue for f64 {
    const KIND: ValueKind = ValueKind::Float;

    fn from_value(value: &Value) -> Option<Self> {
        value.as_f64()
    }
}

impl FromValue for String {
    const KIND: ValueKind = ValueKind::Text;

    fn from_value(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl FromValue for DateTime<Utc> {
    const KIND: ValueKind = ValueKind::Timestamp;

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }
}

impl FromValue for serde_json::Value {
    const KIND: ValueKind = ValueKind::Json;

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Json(json) => Some(json.clone()),
            _ => None,
        }
    }
}

impl FromValue for ObjectRef {
    const KIND: ValueKind = ValueKind::Object;

    fn from_value(value: &Value) -> Option<Self> {
        value.as_object().cloned()
    }
}

impl<T: FromValue> FromValue for Option<T> {
    const KIND: ValueKind = T::KIND;

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            other => T::from_value(other).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_is_structural_for_scalars() {
        assert_eq!(Value::from("a"), Value::Text("a".to_string()));
        assert_ne!(Value::from(1), Value::from(1.0));
        assert_eq!(Value::Float(f64::NAN), Value::Float(f64::NAN));
        assert_eq!(Value::Null, Value::from(None::<String>));
    }

    #[test]
    fn test_kind_accepts() {
        assert!(ValueKind::Text.accepts(&Value::Null));
        assert!(ValueKind::Text.accepts(&"x".into()));
        assert!(!ValueKind::Text.accepts(&1.into()));
        assert!(ValueKind::Float.accepts(&1.into()));
        assert!(ValueKind::Any.accepts(&true.into()));
    }

    #[test]
    fn test_from_value() {
        assert_eq!(String::from_value(&"x".into()), Some("x".to_string()));
        assert_eq!(i64::from_value(&"x".into()), None);
        assert_eq!(f64::from_value(&2.into()), Some(2.0));
        assert_eq!(Option::<String>::from_value(&Value::Null), Some(None));
        assert_eq!(i32::from_value(&Value::Int(i64::MAX)), None);
    }

    #[test]
    fn test_blank() {
        assert!(Value::Null.is_blank());
        assert!(Value::from("  ").is_blank());
        assert!(!Value::from("x").is_blank());
        assert!(!Value::from(0).is_blank());
    }

    #[test]
    fn test_serde_shape() {
        let json = serde_json::to_value(Value::from("Ada")).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "Text", "value": "Ada"}));
        let back: Value = serde_json::from_value(json).unwrap();
        assert_eq!(back, Value::from("Ada"));
    }
}
