//! Declarative object schemas
//!
//! A schema is the finished list of property descriptors an object is built
//! from. Schemas are shared read-only between every instance of a type and
//! can be declared in JSON or TOML.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::errors::{CoreError, CoreResult};
use crate::value::{Value, ValueKind};

/// One property slot of a schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub kind: ValueKind,
    #[serde(default)]
    pub default: Value,
}

impl PropertyDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            read_only: false,
            kind: ValueKind::Any,
            default: Value::Null,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn with_kind(mut self, kind: ValueKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = default.into();
        self
    }

    /// Display name, falling back to the property name
    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }
}

/// Ordered property descriptors of one object type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSchema {
    pub type_name: String,
    #[serde(default)]
    pub properties: Vec<PropertyDescriptor>,
}

impl ObjectSchema {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            properties: Vec::new(),
        }
    }

    /// Append a descriptor
    pub fn property(mut self, descriptor: PropertyDescriptor) -> Self {
        self.properties.push(descriptor);
        self
    }

    /// Look up a descriptor by name
    pub fn get(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn from_json(json: &str) -> CoreResult<Self> {
        serde_json::from_str(json).map_err(|e| CoreError::schema(e.to_string()))
    }

    pub fn from_toml(text: &str) -> CoreResult<Self> {
        toml::from_str(text).map_err(|e| CoreError::schema(e.to_string()))
    }

    pub fn into_shared(self) -> Arc<ObjectSchema> {
        Arc::new(self)
    }
}

/// Source of schemas by type name
pub trait SchemaSupplier: Send + Sync {
    fn schema(&self, type_name: &str) -> Option<Arc<ObjectSchema>>;
}

/// In-memory [`SchemaSupplier`]
#[derive(Default)]
pub struct SchemaRegistry {
    schemas: RwLock<HashMap<String, Arc<ObjectSchema>>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema, replacing any earlier one of the same type
    pub fn register(&self, schema: ObjectSchema) -> Arc<ObjectSchema> {
        let schema = Arc::new(schema);
        self.schemas
            .write()
            .insert(schema.type_name.clone(), Arc::clone(&schema));
        schema
    }

    pub fn len(&self) -> usize {
        self.schemas.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SchemaSupplier for SchemaRegistry {
    fn schema(&self, type_name: &str) -> Option<Arc<ObjectSchema>> {
        self.schemas.read().get(type_name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let schema = ObjectSchema::new("Customer")
            .property(PropertyDescriptor::new("Id").read_only().with_kind(ValueKind::Int))
            .property(PropertyDescriptor::new("Name").with_display_name("Full name"));

        assert_eq!(schema.properties.len(), 2);
        assert!(schema.get("Id").unwrap().read_only);
        assert_eq!(schema.get("Name").unwrap().display_name(), "Full name");
        assert_eq!(schema.get("Id").unwrap().display_name(), "Id");
        assert!(schema.get("Missing").is_none());
    }

    #[test]
    fn test_from_toml() {
        let schema = ObjectSchema::from_toml(
            r#"
            type_name = "Order"

            [[properties]]
            name = "Number"
            kind = "Text"
            read_only = true

            [[properties]]
            name = "Quantity"
            kind = "Int"
            default = { kind = "Int", value = 1 }
            "#,
        )
        .unwrap();

        assert_eq!(schema.type_name, "Order");
        assert_eq!(schema.get("Number").unwrap().kind, ValueKind::Text);
        assert_eq!(schema.get("Quantity").unwrap().default, Value::Int(1));
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(matches!(ObjectSchema::from_json("{"), Err(CoreError::Schema { .. })));
        assert!(matches!(
            ObjectSchema::from_toml("type_name = 3"),
            Err(CoreError::Schema { .. })
        ));
        let schema = ObjectSchema::from_json(r#"{"type_name":"X","properties":[{"name":"A"}]}"#)
            .unwrap();
        assert_eq!(schema.get("A").unwrap().kind, ValueKind::Any);
    }

    #[test]
    fn test_registry() {
        let registry = SchemaRegistry::new();
        assert!(registry.is_empty());
        registry.register(ObjectSchema::new("A"));
        assert!(registry.schema("A").is_some());
        assert!(registry.schema("B").is_none());
    }
}
