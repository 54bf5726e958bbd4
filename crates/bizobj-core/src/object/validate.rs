//! Validation-only business objects

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use bizobj_common::RuntimeConfig;

use super::runtime::{CoreOwner, CoreParts, ObjectCore};
use super::{AggregateState, ObjectBuilder, ValidateObject};
use crate::errors::CoreResult;
use crate::events::SubscriptionId;
use crate::id::ObjectId;
use crate::node::{GraphNode, Observer};
use crate::property::MessageList;
use crate::property_manager::PropertyManager;
use crate::rules::RuleManager;
use crate::schema::ObjectSchema;
use crate::snapshot::{EntitySnapshot, NodeSnapshot, SnapshotContext};

/// A business object with properties and rules but no lifecycle.
///
/// Properties are not tracked, so a validate object is never modified.
pub struct ValidateBase {
    core: ObjectCore,
}

impl ValidateBase {
    /// Object with no rules and the default configuration
    pub fn new(schema: impl Into<Arc<ObjectSchema>>) -> Arc<Self> {
        ObjectBuilder::new(schema).build_validate()
    }

    pub fn builder(schema: impl Into<Arc<ObjectSchema>>) -> ObjectBuilder {
        ObjectBuilder::new(schema)
    }

    pub(crate) fn assemble(schema: Arc<ObjectSchema>, rules: RuleManager, config: RuntimeConfig) -> Arc<Self> {
        let properties = PropertyManager::from_schema(&schema, false);
        Self::from_parts(CoreParts {
            schema,
            rules,
            config,
            properties,
            object_messages: MessageList::new(),
        })
    }

    fn from_parts(parts: CoreParts) -> Arc<Self> {
        let object = Arc::new_cyclic(|weak: &Weak<ValidateBase>| {
            let owner: Weak<dyn CoreOwner> = weak.clone();
            let node: Weak<dyn GraphNode> = weak.clone();
            ValidateBase {
                core: ObjectCore::new(parts, owner, node),
            }
        });
        object.core.attach(object.aggregate_state());
        object
    }

    /// Wire form; lifecycle flags are always false
    pub fn snapshot(&self) -> EntitySnapshot {
        let state = self.core.state();
        let properties = state.properties.snapshots();
        let object_messages = state.object_messages.to_vec();
        drop(state);
        EntitySnapshot {
            type_name: self.type_name().to_string(),
            properties,
            object_messages,
            is_new: false,
            is_child: false,
            is_deleted: false,
            is_marked_modified: false,
            children: self.core.child_snapshots(),
        }
    }

    /// Rebuild from a snapshot, including child nodes
    pub fn from_snapshot(snapshot: EntitySnapshot, context: &SnapshotContext<'_>) -> CoreResult<Arc<Self>> {
        let schema = context.schema(&snapshot.type_name)?;
        let properties = PropertyManager::from_snapshots(&schema, snapshot.properties, false)?;
        let object = Self::from_parts(CoreParts {
            rules: context.rule_manager(&schema),
            schema,
            config: context.config.clone(),
            properties,
            object_messages: MessageList::from(snapshot.object_messages),
        });
        object.core.restore_children(snapshot.children, context)?;
        Ok(object)
    }
}

impl CoreOwner for ValidateBase {
    fn owned_core(&self) -> &ObjectCore {
        &self.core
    }

    fn current_state(&self) -> AggregateState {
        self.aggregate_state()
    }
}

#[async_trait]
impl GraphNode for ValidateBase {
    fn id(&self) -> ObjectId {
        self.core.id()
    }

    fn is_valid(&self) -> bool {
        self.aggregate_state().is_valid
    }

    fn is_self_valid(&self) -> bool {
        self.aggregate_state().is_self_valid
    }

    fn is_busy(&self) -> bool {
        self.aggregate_state().is_busy
    }

    fn parent(&self) -> Option<Arc<dyn GraphNode>> {
        self.core.parent()
    }

    fn set_parent(&self, parent: Option<Weak<dyn GraphNode>>) {
        self.core.set_parent(parent);
    }

    fn subscribe(&self, observer: Observer) -> SubscriptionId {
        self.core.subscribe(observer)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.core.unsubscribe(id)
    }

    async fn run_rules(&self) {
        self.core.run_all_rules().await;
        self.core.run_child_rules().await;
    }

    async fn wait_for_tasks(&self) {
        self.core.wait_idle().await;
    }

    fn snapshot_node(&self) -> Option<NodeSnapshot> {
        Some(NodeSnapshot::Validate(self.snapshot()))
    }

    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl ValidateObject for ValidateBase {
    fn core(&self) -> &ObjectCore {
        &self.core
    }

    fn aggregate_state(&self) -> AggregateState {
        AggregateState {
            is_modified: false,
            is_self_modified: false,
            ..self.core.base_state()
        }
    }
}

impl fmt::Debug for ValidateBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidateBase")
            .field("id", &self.core.id())
            .field("type_name", &self.type_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{RequiredRule, RuleManager};
    use crate::schema::PropertyDescriptor;
    use crate::value::ValueKind;

    fn criteria() -> Arc<ValidateBase> {
        let schema = ObjectSchema::new("SearchCriteria")
            .property(PropertyDescriptor::new("Term").with_kind(ValueKind::Text))
            .property(PropertyDescriptor::new("Limit").with_kind(ValueKind::Int).with_default(10));
        ValidateBase::builder(schema)
            .rules(RuleManager::new().with_rule(RequiredRule::new("Term")))
            .build_validate()
    }

    #[test]
    fn test_defaults_and_no_tracking() {
        let object = criteria();
        assert_eq!(object.get_as::<i64>("Limit").unwrap(), 10);
        object.set("Term", "rust").unwrap();
        assert!(!object.is_modified());
        assert!(!object.is_property_self_modified("Term").unwrap());
    }

    #[tokio::test]
    async fn test_rules_drive_validity() {
        let object = criteria();
        object.run_rules().await;
        assert!(!object.is_valid());
        assert_eq!(object.first_invalid_property().as_deref(), Some("Term"));

        object.set_and_check("Term", "rust".into()).await.unwrap();
        assert!(object.is_valid());
        assert!(object.broken_rules().is_empty());
    }

    #[test]
    fn test_snapshot_carries_messages() {
        let object = criteria();
        object.set("Term", "x").unwrap();
        let snapshot = object.snapshot();
        assert_eq!(snapshot.type_name, "SearchCriteria");
        assert!(!snapshot.is_new);
        assert_eq!(snapshot.property("Term").unwrap().value.as_str(), Some("x"));
    }
}
