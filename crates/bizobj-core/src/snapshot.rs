//! Wire shapes for marshaling objects
//!
//! A property travels as a [`PropertySnapshot`]; an object as the list of
//! its property snapshots plus lifecycle flags. Child nodes are not part of
//! a property value on the wire, they follow as [`ChildSnapshot`]s.

use std::sync::Arc;

use bizobj_common::RuntimeConfig;
use serde::{Deserialize, Serialize};

use crate::errors::{CoreError, CoreResult};
use crate::list::EntityList;
use crate::object::{EntityBase, ValidateBase};
use crate::property::RuleMessage;
use crate::rules::{RuleManager, RuleSupplier};
use crate::schema::{ObjectSchema, SchemaSupplier};
use crate::value::{ObjectRef, Value};

/// One property on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySnapshot {
    pub name: String,
    pub value: Value,
    pub is_self_modified: bool,
    pub is_read_only: bool,
    pub display_name: String,
    #[serde(default)]
    pub rule_messages: Vec<RuleMessage>,
}

/// An entity or validate object on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub type_name: String,
    pub properties: Vec<PropertySnapshot>,
    #[serde(default)]
    pub object_messages: Vec<RuleMessage>,
    #[serde(default)]
    pub is_new: bool,
    #[serde(default)]
    pub is_child: bool,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub is_marked_modified: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ChildSnapshot>,
}

impl EntitySnapshot {
    pub fn to_json(&self) -> CoreResult<String> {
        serde_json::to_string(self).map_err(|e| CoreError::snapshot(e.to_string()))
    }

    pub fn from_json(json: &str) -> CoreResult<Self> {
        serde_json::from_str(json).map_err(|e| CoreError::snapshot(e.to_string()))
    }

    pub fn property(&self, name: &str) -> Option<&PropertySnapshot> {
        self.properties.iter().find(|p| p.name == name)
    }
}

/// Items of a list on the wire
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ListSnapshot {
    pub items: Vec<EntitySnapshot>,
}

/// A child node held by a property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildSnapshot {
    pub property: String,
    pub node: NodeSnapshot,
}

/// Any graph node on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum NodeSnapshot {
    Entity(EntitySnapshot),
    Validate(EntitySnapshot),
    List(ListSnapshot),
}

/// Collaborators needed to rebuild objects from snapshots
#[derive(Clone, Copy)]
pub struct SnapshotContext<'a> {
    pub schemas: &'a dyn SchemaSupplier,
    pub rules: Option<&'a dyn RuleSupplier>,
    pub config: &'a RuntimeConfig,
}

impl<'a> SnapshotContext<'a> {
    pub fn new(schemas: &'a dyn SchemaSupplier, config: &'a RuntimeConfig) -> Self {
        Self {
            schemas,
            rules: None,
            config,
        }
    }

    pub fn with_rules(mut self, rules: &'a dyn RuleSupplier) -> Self {
        self.rules = Some(rules);
        self
    }

    pub(crate) fn schema(&self, type_name: &str) -> CoreResult<Arc<ObjectSchema>> {
        self.schemas
            .schema(type_name)
            .ok_or_else(|| CoreError::snapshot(format!("unknown type '{type_name}'")))
    }

    pub(crate) fn rule_manager(&self, schema: &ObjectSchema) -> RuleManager {
        self.rules
            .map(|supplier| supplier.create_rule_manager(schema))
            .unwrap_or_default()
    }
}

/// Rebuild any node
pub fn restore_node(snapshot: NodeSnapshot, context: &SnapshotContext<'_>) -> CoreResult<ObjectRef> {
    Ok(match snapshot {
        NodeSnapshot::Entity(entity) => ObjectRef::new(EntityBase::from_snapshot(entity, context)?),
        NodeSnapshot::Validate(object) => ObjectRef::new(ValidateBase::from_snapshot(object, context)?),
        NodeSnapshot::List(list) => ObjectRef::new(EntityList::<EntityBase>::from_snapshot(list, context)?),
    })
}
