//! Entities: business objects with a lifecycle
//!
//! On top of the shared object machinery an entity tracks whether it is
//! new, a child of another object, deleted or explicitly marked modified.
//! Those flags decide what [`EntityBase::save`] asks the bound
//! [`SaveCapability`] to do.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use bizobj_common::{format_error, RuntimeConfig};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::runtime::{CoreOwner, CoreParts, ObjectCore};
use super::{AggregateState, ObjectBuilder, ValidateObject};
use crate::errors::{CoreError, CoreResult, SaveFailureReason};
use crate::events::SubscriptionId;
use crate::factory::{FactoryOperation, SaveCapability};
use crate::id::ObjectId;
use crate::list::EntityList;
use crate::node::{GraphNode, Observer};
use crate::property::MessageList;
use crate::property_manager::PropertyManager;
use crate::rules::RuleManager;
use crate::schema::ObjectSchema;
use crate::snapshot::{EntitySnapshot, NodeSnapshot, SnapshotContext};

/// Lifecycle flags of an entity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lifecycle {
    pub is_new: bool,
    /// Monotonic: never cleared once set
    pub is_child: bool,
    pub is_deleted: bool,
    /// Modified regardless of property state
    pub is_marked_modified: bool,
}

/// A business object with lifecycle and modification tracking
pub struct EntityBase {
    core: ObjectCore,
    lifecycle: RwLock<Lifecycle>,
    save: RwLock<Option<Arc<dyn SaveCapability>>>,
}

impl EntityBase {
    /// Entity with no rules, no save capability and the default
    /// configuration
    pub fn new(schema: impl Into<Arc<ObjectSchema>>) -> Arc<Self> {
        ObjectBuilder::new(schema).build_entity()
    }

    pub fn builder(schema: impl Into<Arc<ObjectSchema>>) -> ObjectBuilder {
        ObjectBuilder::new(schema)
    }

    pub(crate) fn assemble(
        schema: Arc<ObjectSchema>,
        rules: RuleManager,
        config: RuntimeConfig,
        save: Option<Arc<dyn SaveCapability>>,
    ) -> Arc<Self> {
        let properties = PropertyManager::from_schema(&schema, true);
        Self::from_parts(
            CoreParts {
                schema,
                rules,
                config,
                properties,
                object_messages: MessageList::new(),
            },
            Lifecycle::default(),
            save,
        )
    }

    fn from_parts(parts: CoreParts, lifecycle: Lifecycle, save: Option<Arc<dyn SaveCapability>>) -> Arc<Self> {
        let entity = Arc::new_cyclic(|weak: &Weak<EntityBase>| {
            let owner: Weak<dyn CoreOwner> = weak.clone();
            let node: Weak<dyn GraphNode> = weak.clone();
            EntityBase {
                core: ObjectCore::new(parts, owner, node),
                lifecycle: RwLock::new(lifecycle),
                save: RwLock::new(save),
            }
        });
        entity.core.attach(entity.aggregate_state());
        entity
    }

    pub fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.read()
    }

    pub fn is_new(&self) -> bool {
        self.lifecycle.read().is_new
    }

    pub fn is_child(&self) -> bool {
        self.lifecycle.read().is_child
    }

    pub fn is_deleted(&self) -> bool {
        self.lifecycle.read().is_deleted
    }

    pub fn is_marked_modified(&self) -> bool {
        self.lifecycle.read().is_marked_modified
    }

    fn update_lifecycle(&self, change: impl FnOnce(&mut Lifecycle)) {
        let (before, after) = {
            let mut lifecycle = self.lifecycle.write();
            let before = *lifecycle;
            change(&mut lifecycle);
            (before, *lifecycle)
        };
        if before != after {
            debug!(object_id = %self.core.id(), ?before, ?after, "lifecycle changed");
            self.core.publish_state();
        }
    }

    /// Not yet persisted
    pub fn mark_new(&self) {
        self.update_lifecycle(|l| l.is_new = true);
    }

    /// Persisted
    pub fn mark_old(&self) {
        self.update_lifecycle(|l| l.is_new = false);
    }

    /// Flag for deletion on the next save
    pub fn delete(&self) {
        self.update_lifecycle(|l| l.is_deleted = true);
    }

    /// Same as [`delete`](Self::delete)
    pub fn mark_deleted(&self) {
        self.delete();
    }

    /// Cancel a pending deletion; no-op when not deleted
    pub fn undelete(&self) {
        self.update_lifecycle(|l| l.is_deleted = false);
    }

    pub fn mark_modified(&self) {
        self.update_lifecycle(|l| l.is_marked_modified = true);
    }

    pub fn mark_unmodified(&self) {
        self.update_lifecycle(|l| l.is_marked_modified = false);
    }

    /// Apply the lifecycle effect of a completed factory operation
    pub fn factory_complete(&self, operation: FactoryOperation) {
        match operation {
            FactoryOperation::Create => self.mark_new(),
            FactoryOperation::Insert => {
                self.core.mark_properties_unmodified();
                self.update_lifecycle(|l| {
                    l.is_new = false;
                    l.is_marked_modified = false;
                });
            }
            FactoryOperation::Update => {
                self.core.mark_properties_unmodified();
                self.update_lifecycle(|l| l.is_marked_modified = false);
            }
            FactoryOperation::Fetch | FactoryOperation::Delete => {}
        }
        self.core.publish_state();
        debug!(object_id = %self.core.id(), %operation, "factory operation complete");
    }

    /// Bind (or replace) the capability that persists this entity
    pub fn bind_save_capability(&self, save: Arc<dyn SaveCapability>) {
        *self.save.write() = Some(save);
    }

    pub fn has_save_capability(&self) -> bool {
        self.save.read().is_some()
    }

    /// First reason [`save`](Self::save) would refuse, if any
    pub fn save_precondition(&self) -> Option<SaveFailureReason> {
        let state = self.aggregate_state();
        if state.is_child {
            Some(SaveFailureReason::IsChildObject)
        } else if !state.is_modified {
            Some(SaveFailureReason::NotModified)
        } else if !state.is_valid {
            Some(SaveFailureReason::IsInvalid)
        } else if state.is_busy {
            Some(SaveFailureReason::IsBusy)
        } else if !self.has_save_capability() {
            Some(SaveFailureReason::NoFactoryMethod)
        } else {
            None
        }
    }

    /// Persist through the bound capability.
    ///
    /// Preconditions are checked before anything is handed over. On success
    /// the lifecycle is updated for this entity and its child entities, and
    /// the operation performed is returned.
    pub async fn save(&self) -> CoreResult<FactoryOperation> {
        if let Some(reason) = self.save_precondition() {
            debug!(object_id = %self.core.id(), %reason, "save refused");
            return Err(CoreError::SavePrecondition(reason));
        }
        let Some(capability) = self.save.read().clone() else {
            return Err(CoreError::SavePrecondition(SaveFailureReason::NoFactoryMethod));
        };

        let lifecycle = self.lifecycle();
        let operation = if lifecycle.is_deleted {
            FactoryOperation::Delete
        } else if lifecycle.is_new {
            FactoryOperation::Insert
        } else {
            FactoryOperation::Update
        };

        capability.save(self, operation).await.map_err(|e| {
            let reason = format_error(&e);
            warn!(object_id = %self.core.id(), %operation, error = %reason, "save failed");
            CoreError::SaveFailed { reason }
        })?;

        self.factory_complete(operation);
        self.complete_children();
        Ok(operation)
    }

    fn complete_as_child(&self) {
        let lifecycle = self.lifecycle();
        if !lifecycle.is_deleted {
            self.factory_complete(if lifecycle.is_new {
                FactoryOperation::Insert
            } else {
                FactoryOperation::Update
            });
        }
        self.complete_children();
    }

    fn complete_children(&self) {
        for (_, child) in self.core.child_nodes() {
            if let Some(entity) = child.downcast::<EntityBase>() {
                entity.complete_as_child();
            } else if let Some(list) = child.downcast::<EntityList<EntityBase>>() {
                for item in list.items() {
                    item.complete_as_child();
                }
            }
        }
    }

    /// Wire form, including child nodes
    pub fn snapshot(&self) -> EntitySnapshot {
        let (properties, object_messages) = {
            let state = self.core.state();
            (state.properties.snapshots(), state.object_messages.to_vec())
        };
        let lifecycle = self.lifecycle();
        EntitySnapshot {
            type_name: self.type_name().to_string(),
            properties,
            object_messages,
            is_new: lifecycle.is_new,
            is_child: lifecycle.is_child,
            is_deleted: lifecycle.is_deleted,
            is_marked_modified: lifecycle.is_marked_modified,
            children: self.core.child_snapshots(),
        }
    }

    /// Rebuild from a snapshot without any modification side effects.
    ///
    /// The result has no save capability bound.
    pub fn from_snapshot(snapshot: EntitySnapshot, context: &SnapshotContext<'_>) -> CoreResult<Arc<Self>> {
        let schema = context.schema(&snapshot.type_name)?;
        let properties = PropertyManager::from_snapshots(&schema, snapshot.properties, true)?;
        let lifecycle = Lifecycle {
            is_new: snapshot.is_new,
            is_child: snapshot.is_child,
            is_deleted: snapshot.is_deleted,
            is_marked_modified: snapshot.is_marked_modified,
        };
        let entity = Self::from_parts(
            CoreParts {
                rules: context.rule_manager(&schema),
                schema,
                config: context.config.clone(),
                properties,
                object_messages: MessageList::from(snapshot.object_messages),
            },
            lifecycle,
            None,
        );
        entity.core.restore_children(snapshot.children, context)?;
        Ok(entity)
    }
}

impl CoreOwner for EntityBase {
    fn owned_core(&self) -> &ObjectCore {
        &self.core
    }

    fn current_state(&self) -> AggregateState {
        self.aggregate_state()
    }
}

#[async_trait]
impl GraphNode for EntityBase {
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

    fn is_modified(&self) -> bool {
        self.aggregate_state().is_modified
    }

    fn is_self_modified(&self) -> bool {
        self.aggregate_state().is_self_modified
    }

    fn parent(&self) -> Option<Arc<dyn GraphNode>> {
        self.core.parent()
    }

    fn set_parent(&self, parent: Option<Weak<dyn GraphNode>>) {
        self.core.set_parent(parent);
    }

    fn mark_as_child(&self) {
        self.update_lifecycle(|l| l.is_child = true);
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
        Some(NodeSnapshot::Entity(self.snapshot()))
    }

    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl ValidateObject for EntityBase {
    fn core(&self) -> &ObjectCore {
        &self.core
    }

    fn aggregate_state(&self) -> AggregateState {
        let base = self.core.base_state();
        let lifecycle = self.lifecycle();
        let is_self_modified = base.is_self_modified || lifecycle.is_marked_modified;
        let is_modified = is_self_modified || base.is_modified || lifecycle.is_new || lifecycle.is_deleted;
        AggregateState {
            is_self_modified,
            is_modified,
            is_savable: is_modified && base.is_valid && !base.is_busy && !lifecycle.is_child,
            is_new: lifecycle.is_new,
            is_deleted: lifecycle.is_deleted,
            is_child: lifecycle.is_child,
            ..base
        }
    }
}

impl fmt::Debug for EntityBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityBase")
            .field("id", &self.core.id())
            .field("type_name", &self.type_name())
            .field("lifecycle", &self.lifecycle())
            .finish()
    }
}
