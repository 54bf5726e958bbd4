//! Business objects
//!
//! [`EntityBase`] and [`ValidateBase`] share an [`ObjectCore`] and expose it
//! through [`ValidateObject`]. Entities add the lifecycle state machine
//! (new/old/child/deleted) and modification tracking.

pub mod entity;
pub mod runtime;
pub mod validate;

pub use entity::{EntityBase, Lifecycle};
pub use runtime::ObjectCore;
pub use validate::ValidateBase;

use std::sync::Arc;

use async_trait::async_trait;
use bizobj_common::RuntimeConfig;
use tokio::sync::broadcast;

use crate::errors::{CoreError, CoreResult};
use crate::events::{GraphChange, NodeEvent, Observable, SubscriptionId};
use crate::factory::SaveCapability;
use crate::node::GraphNode;
use crate::property::RuleMessage;
use crate::rules::{RuleManager, RuleSupplier};
use crate::schema::ObjectSchema;
use crate::snapshot::PropertySnapshot;
use crate::value::{FromValue, Value};

/// Aggregate flags of an object, as last computed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateState {
    pub is_modified: bool,
    pub is_self_modified: bool,
    pub is_valid: bool,
    pub is_self_valid: bool,
    pub is_busy: bool,
    pub is_savable: bool,
    pub is_new: bool,
    pub is_deleted: bool,
    pub is_child: bool,
    pub is_paused: bool,
}

impl AggregateState {
    /// Flags that differ between `self` and `other`
    pub fn diff(&self, other: &AggregateState) -> Vec<Observable> {
        [
            (self.is_modified != other.is_modified, Observable::IsModified),
            (self.is_self_modified != other.is_self_modified, Observable::IsSelfModified),
            (self.is_valid != other.is_valid, Observable::IsValid),
            (self.is_self_valid != other.is_self_valid, Observable::IsSelfValid),
            (self.is_busy != other.is_busy, Observable::IsBusy),
            (self.is_savable != other.is_savable, Observable::IsSavable),
            (self.is_new != other.is_new, Observable::IsNew),
            (self.is_deleted != other.is_deleted, Observable::IsDeleted),
            (self.is_child != other.is_child, Observable::IsChild),
            (self.is_paused != other.is_paused, Observable::IsPaused),
        ]
        .into_iter()
        .filter_map(|(changed, state)| changed.then_some(state))
        .collect()
    }
}

/// Property access, validation and notification shared by every business
/// object
#[async_trait]
pub trait ValidateObject: GraphNode {
    fn core(&self) -> &ObjectCore;

    /// Current aggregate flags
    fn aggregate_state(&self) -> AggregateState;

    fn type_name(&self) -> &str {
        &self.core().schema().type_name
    }

    fn is_savable(&self) -> bool {
        self.aggregate_state().is_savable
    }

    /// Current value of a property
    fn get(&self, name: &str) -> CoreResult<Value> {
        self.core().value(name)
    }

    /// Typed value of a property
    fn get_as<T: FromValue>(&self, name: &str) -> CoreResult<T>
    where
        Self: Sized,
    {
        let value = self.get(name)?;
        T::from_value(&value).ok_or_else(|| CoreError::TypeMismatch {
            property: name.to_string(),
            expected: T::KIND.to_string(),
            actual: value.kind_name().to_string(),
        })
    }

    /// The child node held by a property, if it is a `T`
    fn child<T: GraphNode>(&self, name: &str) -> CoreResult<Option<Arc<T>>>
    where
        Self: Sized,
    {
        Ok(self.get(name)?.as_object().and_then(|o| o.downcast::<T>()))
    }

    /// User edit: tracked unless paused
    fn set(&self, name: &str, value: impl Into<Value>) -> CoreResult<()>
    where
        Self: Sized,
    {
        let value = value.into();
        self.core().mutate(name, move |p| p.set_value(value))
    }

    /// Hydration from storage: never tracked
    fn load(&self, name: &str, value: impl Into<Value>) -> CoreResult<()>
    where
        Self: Sized,
    {
        let value = value.into();
        self.core().mutate(name, move |p| p.load_value(value))
    }

    /// Bookkeeping write with no value-changed notification
    fn set_quietly(&self, name: &str, value: impl Into<Value>) -> CoreResult<()>
    where
        Self: Sized,
    {
        let value = value.into();
        self.core().mutate(name, move |p| p.set_value_quietly(value))
    }

    fn property_snapshot(&self, name: &str) -> CoreResult<PropertySnapshot> {
        self.core().with_property(name, |p| p.snapshot())
    }

    fn property_messages(&self, name: &str) -> CoreResult<Vec<RuleMessage>> {
        self.core().with_property(name, |p| p.messages().to_vec())
    }

    /// Messages not tied to a property
    fn object_messages(&self) -> Vec<RuleMessage> {
        self.core().state().object_messages.to_vec()
    }

    /// Every outstanding message, property messages first in schema order
    fn broken_rules(&self) -> Vec<RuleMessage> {
        let state = self.core().state();
        let messages = state
            .properties
            .iter()
            .flat_map(|p| p.messages().iter().cloned())
            .chain(state.object_messages.iter().cloned())
            .collect();
        messages
    }

    fn is_property_valid(&self, name: &str) -> CoreResult<bool> {
        self.core().with_property(name, |p| p.is_valid())
    }

    fn is_property_self_valid(&self, name: &str) -> CoreResult<bool> {
        self.core().with_property(name, |p| p.is_self_valid())
    }

    fn is_property_busy(&self, name: &str) -> CoreResult<bool> {
        self.core().with_property(name, |p| p.is_busy())
    }

    fn is_property_read_only(&self, name: &str) -> CoreResult<bool> {
        self.core().with_property(name, |p| p.is_read_only())
    }

    fn is_property_self_modified(&self, name: &str) -> CoreResult<bool> {
        self.core().with_property(name, |p| p.is_self_modified())
    }

    fn is_property_modified(&self, name: &str) -> CoreResult<bool> {
        self.core().with_property(name, |p| p.is_modified())
    }

    fn display_name(&self, name: &str) -> CoreResult<String> {
        self.core().with_property(name, |p| p.display_name().to_string())
    }

    fn first_invalid_property(&self) -> Option<String> {
        self.core()
            .state()
            .properties
            .first_invalid()
            .map(|p| p.name().to_string())
    }

    fn modified_property_names(&self) -> Vec<String> {
        self.core().state().properties.modified_property_names()
    }

    fn property_names(&self) -> Vec<String> {
        self.core().state().properties.names()
    }

    fn has_property(&self, name: &str) -> bool {
        self.core().state().properties.has(name)
    }

    fn is_paused(&self) -> bool {
        self.core().is_paused()
    }

    /// Pause the object and every property at once
    fn pause_all(&self) {
        self.core().set_paused(true);
    }

    /// Resume and publish whatever aggregate state changed while paused
    fn resume_all(&self) {
        self.core().set_paused(false);
    }

    /// Pause until the guard drops; the previous pause state is restored
    fn paused(&self) -> PauseGuard<'_, Self>
    where
        Self: Sized,
    {
        let was_paused = self.is_paused();
        self.pause_all();
        PauseGuard {
            object: self,
            was_paused,
        }
    }

    /// Async stream of value changes at or beneath this object
    fn events(&self) -> broadcast::Receiver<GraphChange> {
        self.core().events()
    }

    /// Register a closure observer
    fn observe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&NodeEvent) + Send + Sync + 'static,
        Self: Sized,
    {
        self.subscribe(Arc::new(callback))
    }

    /// Run the rules triggered by one property
    async fn run_rules_for(&self, name: &str) -> CoreResult<()> {
        self.core().run_rules_for(name).await
    }

    /// Set a value, then run the rules it triggers
    async fn set_and_check(&self, name: &str, value: Value) -> CoreResult<()> {
        self.core().mutate(name, move |p| p.set_value(value))?;
        self.core().run_rules_for(name).await
    }

    /// Drop every rule message
    fn clear_messages(&self) {
        self.core().clear_messages();
    }
}

/// Scoped pause; see [`ValidateObject::paused`]
pub struct PauseGuard<'a, O: ValidateObject + ?Sized> {
    object: &'a O,
    was_paused: bool,
}

impl<O: ValidateObject + ?Sized> Drop for PauseGuard<'_, O> {
    fn drop(&mut self) {
        if !self.was_paused {
            self.object.resume_all();
        }
    }
}

/// Assembles entities and validate objects
pub struct ObjectBuilder {
    schema: Arc<ObjectSchema>,
    rules: RuleManager,
    config: RuntimeConfig,
    save: Option<Arc<dyn SaveCapability>>,
}

impl ObjectBuilder {
    pub fn new(schema: impl Into<Arc<ObjectSchema>>) -> Self {
        Self {
            schema: schema.into(),
            rules: RuleManager::new(),
            config: RuntimeConfig::default(),
            save: None,
        }
    }

    pub fn rules(mut self, rules: RuleManager) -> Self {
        self.rules = rules;
        self
    }

    /// Take the rule set from a supplier
    pub fn rules_from(mut self, supplier: &dyn RuleSupplier) -> Self {
        self.rules = supplier.create_rule_manager(&self.schema);
        self
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn save_capability(mut self, save: Arc<dyn SaveCapability>) -> Self {
        self.save = Some(save);
        self
    }

    /// # Panics
    ///
    /// On duplicate or empty property names in the schema.
    pub fn build_entity(self) -> Arc<EntityBase> {
        EntityBase::assemble(self.schema, self.rules, self.config, self.save)
    }

    /// # Panics
    ///
    /// On duplicate or empty property names in the schema.
    pub fn build_validate(self) -> Arc<ValidateBase> {
        ValidateBase::assemble(self.schema, self.rules, self.config)
    }
}
