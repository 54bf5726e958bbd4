//! Shared machinery of entities and validate objects
//!
//! [`ObjectCore`] owns the property manager, the rule set and everything a
//! rule run needs per instance. Locking discipline:
//!
//! - `state` is the per-object lock; every write goes through it.
//! - `fences` is taken before `state` when a rule result is applied.
//! - `published` is taken before `state` when aggregate state is published.
//! - No lock is held across an `.await` or while observers run.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use bizobj_common::{RuntimeConfig, Timer};
use futures::future::{join_all, BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use tokio::sync::{broadcast, Notify};
use tracing::{debug, trace, warn};

use super::AggregateState;
use crate::errors::{CoreError, CoreResult};
use crate::events::{EventBus, GraphChange, NodeEvent, Observable, Observers, SubscriptionId};
use crate::id::ObjectId;
use crate::node::{self, GraphNode, Observer};
use crate::property::{MessageList, Property, PropertyChanges, RuleMessage};
use crate::property_manager::PropertyManager;
use crate::rules::{RuleContext, RuleIndex, RuleManager, SharedRule, Violation};
use crate::schema::ObjectSchema;
use crate::snapshot::{self, ChildSnapshot, SnapshotContext};
use crate::value::{ObjectRef, Value};

/// The object that owns an [`ObjectCore`]
pub(crate) trait CoreOwner: Send + Sync {
    fn owned_core(&self) -> &ObjectCore;
    fn current_state(&self) -> AggregateState;
}

/// Everything an object is assembled from
pub(crate) struct CoreParts {
    pub schema: Arc<ObjectSchema>,
    pub rules: RuleManager,
    pub config: RuntimeConfig,
    pub properties: PropertyManager,
    pub object_messages: MessageList,
}

pub(crate) struct CoreState {
    pub properties: PropertyManager,
    pub object_messages: MessageList,
    pub paused: bool,
}

/// Per-instance state shared by [`EntityBase`](super::EntityBase) and
/// [`ValidateBase`](super::ValidateBase)
pub struct ObjectCore {
    id: ObjectId,
    schema: Arc<ObjectSchema>,
    rules: RuleManager,
    config: RuntimeConfig,
    state: RwLock<CoreState>,
    running: AtomicUsize,
    idle: Notify,
    run_seq: AtomicU64,
    fences: Mutex<HashMap<RuleIndex, u64>>,
    observers: Observers<NodeEvent>,
    bus: EventBus,
    parent: RwLock<Option<Weak<dyn GraphNode>>>,
    self_node: Weak<dyn GraphNode>,
    owner: Weak<dyn CoreOwner>,
    children: Mutex<HashMap<String, (ObjectRef, SubscriptionId)>>,
    published: Mutex<AggregateState>,
}

impl ObjectCore {
    pub(crate) fn new(parts: CoreParts, owner: Weak<dyn CoreOwner>, self_node: Weak<dyn GraphNode>) -> Self {
        let bus = EventBus::with_capacity(parts.config.event_bus_capacity);
        Self {
            id: ObjectId::new(),
            schema: parts.schema,
            rules: parts.rules,
            config: parts.config,
            state: RwLock::new(CoreState {
                properties: parts.properties,
                object_messages: parts.object_messages,
                paused: false,
            }),
            running: AtomicUsize::new(0),
            idle: Notify::new(),
            run_seq: AtomicU64::new(0),
            fences: Mutex::new(HashMap::new()),
            observers: Observers::new(),
            bus,
            parent: RwLock::new(None),
            self_node,
            owner,
            children: Mutex::new(HashMap::new()),
            published: Mutex::new(AggregateState::default()),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn schema(&self) -> &Arc<ObjectSchema> {
        &self.schema
    }

    pub fn rules(&self) -> &RuleManager {
        &self.rules
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub(crate) fn state(&self) -> RwLockReadGuard<'_, CoreState> {
        self.state.read()
    }

    /// Adopt child nodes already present after construction and record the
    /// initial aggregate state
    pub(crate) fn attach(&self, initial: AggregateState) {
        for (property, child) in self.child_nodes() {
            self.adopt(&property, child);
        }
        *self.published.lock() = initial;
    }

    pub(crate) fn with_property<R>(&self, name: &str, read: impl FnOnce(&Property) -> R) -> CoreResult<R> {
        let state = self.state.read();
        state.properties.get(name).map(read)
    }

    pub(crate) fn value(&self, name: &str) -> CoreResult<Value> {
        self.with_property(name, |p| p.value().clone())
    }

    /// Child nodes held by properties, in schema order
    pub(crate) fn child_nodes(&self) -> Vec<(String, ObjectRef)> {
        self.state
            .read()
            .properties
            .iter()
            .filter_map(|p| p.value().as_object().map(|o| (p.name().to_string(), o.clone())))
            .collect()
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.state.read().paused
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) > 0
    }

    /// Validity, busy and modification as far as properties and object-level
    /// messages determine them
    pub(crate) fn base_state(&self) -> AggregateState {
        let state = self.state.read();
        let no_object_messages = state.object_messages.is_empty();
        let self_modified = state.properties.any_self_modified();
        AggregateState {
            is_self_modified: self_modified,
            is_modified: self_modified || state.properties.any_child_modified(),
            is_self_valid: no_object_messages && state.properties.all_self_valid(),
            is_valid: no_object_messages && state.properties.all_valid(),
            is_busy: self.is_running() || state.properties.any_busy(),
            is_paused: state.paused,
            ..AggregateState::default()
        }
    }

    /// Write one property through `write`, then rewire children and notify
    pub(crate) fn mutate<F>(&self, name: &str, write: F) -> CoreResult<()>
    where
        F: FnOnce(&mut Property) -> CoreResult<PropertyChanges>,
    {
        let (changes, previous, current, paused) = {
            let mut state = self.state.write();
            let paused = state.paused;
            let property = state.properties.get_mut(name)?;
            let previous = property.value().as_object().cloned();
            let changes = write(property)?;
            let current = property.value().as_object().cloned();
            (changes, previous, current, paused)
        };

        self.rewire_child(name, previous, current);
        if !paused {
            self.announce(name, changes);
        }
        self.publish_state();
        Ok(())
    }

    fn rewire_child(&self, property: &str, previous: Option<ObjectRef>, current: Option<ObjectRef>) {
        if let (Some(old), Some(new)) = (&previous, &current) {
            if old.ptr_eq(new) {
                return;
            }
        }
        if previous.is_some() {
            let removed = self.children.lock().remove(property);
            if let Some((child, subscription)) = removed {
                child.node().unsubscribe(subscription);
                if node::has_parent(&**child.node(), self.id) {
                    child.node().set_parent(None);
                }
                trace!(object_id = %self.id, property, child = %child.id(), "child detached");
            }
        }
        if let Some(child) = current {
            self.adopt(property, child);
        }
    }

    fn adopt(&self, property: &str, child: ObjectRef) {
        let node = child.node();
        node.set_parent(Some(self.self_node.clone()));
        node.mark_as_child();

        let owner = self.owner.clone();
        let name = property.to_string();
        let observer: Observer = Arc::new(move |event: &NodeEvent| {
            if let Some(owner) = owner.upgrade() {
                owner.owned_core().child_changed(&name, event);
            }
        });
        let subscription = node.subscribe(observer);
        trace!(object_id = %self.id, property, child = %child.id(), "child attached");

        let replaced = self
            .children
            .lock()
            .insert(property.to_string(), (child, subscription));
        if let Some((old, old_subscription)) = replaced {
            old.node().unsubscribe(old_subscription);
        }
    }

    fn announce(&self, property: &str, changes: PropertyChanges) {
        if changes.value {
            self.observers.emit(&NodeEvent::ValueChanged {
                source: self.id,
                property: property.to_string(),
            });
            self.bus.publish(GraphChange::new(self.id, property));
        }
        if changes.self_modified {
            self.emit_property_state(property, Observable::IsSelfModified);
            self.emit_property_state(property, Observable::IsModified);
        }
        if changes.self_valid {
            self.emit_property_state(property, Observable::IsSelfValid);
            self.emit_property_state(property, Observable::IsValid);
        }
        if changes.busy {
            self.emit_property_state(property, Observable::IsBusy);
        }
    }

    fn emit_property_state(&self, property: &str, state: Observable) {
        self.observers.emit(&NodeEvent::PropertyStateChanged {
            source: self.id,
            property: property.to_string(),
            state,
        });
    }

    /// Republish an event raised by the child node held in `property`
    pub(crate) fn child_changed(&self, property: &str, event: &NodeEvent) {
        if !self.is_paused() {
            let wrapped = NodeEvent::ChildChanged {
                source: self.id,
                property: property.to_string(),
                event: Box::new(event.clone()),
            };
            self.observers.emit(&wrapped);
            if let Some(path) = wrapped.value_path() {
                self.bus.publish(GraphChange::new(wrapped.origin().source(), path));
            }
        }
        self.publish_state();
    }

    /// Emit `StateChanged` for every aggregate flag that flipped since the
    /// last publication. While paused only the pause itself is announced;
    /// the rest is caught up on resume.
    pub(crate) fn publish_state(&self) {
        let Some(owner) = self.owner.upgrade() else {
            return;
        };
        let flips = {
            let mut published = self.published.lock();
            let current = owner.current_state();
            if current.is_paused {
                if published.is_paused {
                    Vec::new()
                } else {
                    published.is_paused = true;
                    vec![Observable::IsPaused]
                }
            } else {
                let flips = published.diff(&current);
                *published = current;
                flips
            }
        };
        for state in flips {
            self.observers.emit(&NodeEvent::StateChanged {
                source: self.id,
                state,
            });
        }
    }

    pub(crate) fn set_paused(&self, paused: bool) {
        {
            let mut state = self.state.write();
            if state.paused == paused {
                return;
            }
            state.paused = paused;
            state.properties.set_paused_all(paused);
        }
        debug!(object_id = %self.id, paused, "pause state changed");
        self.publish_state();
    }

    /// Clear self-modification of every property
    pub(crate) fn mark_properties_unmodified(&self) {
        let (flipped, paused) = {
            let mut state = self.state.write();
            (state.properties.mark_self_unmodified_all(), state.paused)
        };
        if !paused {
            for property in &flipped {
                self.emit_property_state(property, Observable::IsSelfModified);
                self.emit_property_state(property, Observable::IsModified);
            }
        }
    }

    pub(crate) fn clear_messages(&self) {
        let (flipped, paused) = {
            let mut state = self.state.write();
            state.object_messages.clear();
            let flipped: Vec<String> = state
                .properties
                .iter_mut()
                .filter_map(|p| p.clear_messages().self_valid.then(|| p.name().to_string()))
                .collect();
            (flipped, state.paused)
        };
        if !paused {
            for property in &flipped {
                self.emit_property_state(property, Observable::IsSelfValid);
                self.emit_property_state(property, Observable::IsValid);
            }
        }
        self.publish_state();
    }

    pub(crate) fn subscribe(&self, observer: Observer) -> SubscriptionId {
        self.observers.subscribe(observer)
    }

    pub(crate) fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    pub(crate) fn events(&self) -> broadcast::Receiver<GraphChange> {
        self.bus.subscribe()
    }

    pub(crate) fn parent(&self) -> Option<Arc<dyn GraphNode>> {
        self.parent.read().as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn set_parent(&self, parent: Option<Weak<dyn GraphNode>>) {
        *self.parent.write() = parent;
    }

    /// Run every rule of the object
    pub(crate) async fn run_all_rules(&self) {
        let selection: Vec<(RuleIndex, SharedRule)> = self
            .rules
            .rules()
            .map(|(index, rule)| (index, Arc::clone(rule)))
            .collect();
        self.execute_rules(selection).await;
    }

    /// Run the rules triggered by `property`
    pub(crate) async fn run_rules_for(&self, property: &str) -> CoreResult<()> {
        if !self.state.read().properties.has(property) {
            return Err(CoreError::not_found(property));
        }
        let selection: Vec<(RuleIndex, SharedRule)> = self
            .rules
            .rules_for(property)
            .map(|(index, rule)| (index, Arc::clone(rule)))
            .collect();
        self.execute_rules(selection).await;
        Ok(())
    }

    async fn execute_rules(&self, selection: Vec<(RuleIndex, SharedRule)>) {
        if selection.is_empty() {
            return;
        }

        let run = self.run_seq.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut fences = self.fences.lock();
            for (index, _) in &selection {
                fences.insert(*index, run);
            }
        }

        let context = RuleContext::new(self.id, self.values());
        let running = RunGuard::enter(self);
        self.publish_state();

        debug!(object_id = %self.id, run, rules = selection.len(), "running rules");
        let timer = Timer::start(format!("rule run {run} on {}", self.id));

        let context = &context;
        let pending: Vec<BoxFuture<'_, (RuleIndex, SharedRule, Vec<Violation>)>> = selection
            .into_iter()
            .map(|(index, rule)| self.run_one(index, rule, context).boxed())
            .collect();
        let mut results = stream::iter(pending).buffer_unordered(self.config.max_concurrent_rules.max(1));

        while let Some((index, rule, violations)) = results.next().await {
            self.apply_result(run, index, rule.name(), violations);
        }
        drop(results);
        timer.stop();

        drop(running);
        self.publish_state();
    }

    async fn run_one(
        &self,
        index: RuleIndex,
        rule: SharedRule,
        context: &RuleContext,
    ) -> (RuleIndex, SharedRule, Vec<Violation>) {
        let _busy = TriggerBusy::enter(self, rule.trigger_properties());
        let violations = rule.execute(context).await;
        (index, rule, violations)
    }

    fn values(&self) -> IndexMap<String, Value> {
        self.state
            .read()
            .properties
            .iter()
            .map(|p| (p.name().to_string(), p.value().clone()))
            .collect()
    }

    /// Write one rule's findings, unless a newer run claimed the index
    fn apply_result(&self, run: u64, index: RuleIndex, rule: &str, violations: Vec<Violation>) {
        let (flipped, paused) = {
            let fences = self.fences.lock();
            if fences.get(&index) != Some(&run) {
                debug!(object_id = %self.id, rule, run, "rule result superseded by a newer run");
                return;
            }

            let mut state = self.state.write();
            let mut by_property: HashMap<String, Vec<RuleMessage>> = HashMap::new();
            let mut object_level = Vec::new();
            for violation in violations {
                match violation.property {
                    Some(property) if state.properties.has(&property) => by_property
                        .entry(property.clone())
                        .or_default()
                        .push(RuleMessage::new(property, violation.message, index)),
                    Some(property) => {
                        warn!(object_id = %self.id, rule, property = %property, "violation for unknown property kept at object level");
                        object_level.push(RuleMessage::object_level(violation.message, index));
                    }
                    None => object_level.push(RuleMessage::object_level(violation.message, index)),
                }
            }

            let mut flipped = Vec::new();
            for property in state.properties.iter_mut() {
                let messages = by_property.remove(property.name()).unwrap_or_default();
                if property.set_messages_for_rule(index, messages).self_valid {
                    flipped.push(property.name().to_string());
                }
            }
            state.object_messages.replace_for_rule(index, object_level);
            (flipped, state.paused)
        };

        trace!(object_id = %self.id, rule, run, "rule result applied");
        if !paused {
            for property in &flipped {
                self.emit_property_state(property, Observable::IsSelfValid);
                self.emit_property_state(property, Observable::IsValid);
            }
        }
        self.publish_state();
    }

    /// Wait until no rule run is in flight here or on any child node
    pub(crate) async fn wait_idle(&self) {
        loop {
            let mut notified = std::pin::pin!(self.idle.notified());
            notified.as_mut().enable();
            if !self.is_running() {
                break;
            }
            notified.await;
        }
        let children = self.child_nodes();
        join_all(children.iter().map(|(_, child)| child.node().wait_for_tasks())).await;
    }

    /// Wire form of every child node that has one
    pub(crate) fn child_snapshots(&self) -> Vec<ChildSnapshot> {
        self.child_nodes()
            .into_iter()
            .filter_map(|(property, child)| {
                child
                    .node()
                    .snapshot_node()
                    .map(|node| ChildSnapshot { property, node })
            })
            .collect()
    }

    /// Rebuild child nodes and load them into their properties
    pub(crate) fn restore_children(&self, children: Vec<ChildSnapshot>, context: &SnapshotContext<'_>) -> CoreResult<()> {
        for ChildSnapshot { property, node } in children {
            let child = snapshot::restore_node(node, context)?;
            self.mutate(&property, move |p| p.restore_value(child))?;
        }
        Ok(())
    }

    /// Run the rules of every child node
    pub(crate) async fn run_child_rules(&self) {
        let children = self.child_nodes();
        join_all(children.iter().map(|(_, child)| child.node().run_rules())).await;
    }
}

impl Drop for ObjectCore {
    fn drop(&mut self) {
        for (_, (child, subscription)) in self.children.get_mut().drain() {
            child.node().unsubscribe(subscription);
        }
    }
}

/// Counts a rule run in flight
struct RunGuard<'a> {
    core: &'a ObjectCore,
}

impl<'a> RunGuard<'a> {
    fn enter(core: &'a ObjectCore) -> Self {
        core.running.fetch_add(1, Ordering::SeqCst);
        Self { core }
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if self.core.running.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.core.idle.notify_waiters();
        }
    }
}

/// Marks a rule's trigger properties busy while it runs
struct TriggerBusy<'a> {
    core: &'a ObjectCore,
    properties: Vec<String>,
}

impl<'a> TriggerBusy<'a> {
    fn enter(core: &'a ObjectCore, triggers: &[String]) -> Self {
        let (properties, flipped, paused) = {
            let mut state = core.state.write();
            let mut entered = Vec::new();
            let mut flipped = Vec::new();
            for name in triggers {
                if let Ok(property) = state.properties.get_mut(name) {
                    if property.begin_busy().busy {
                        flipped.push(name.clone());
                    }
                    entered.push(name.clone());
                }
            }
            (entered, flipped, state.paused)
        };
        if !paused {
            for property in &flipped {
                core.emit_property_state(property, Observable::IsBusy);
            }
        }
        Self { core, properties }
    }
}

impl Drop for TriggerBusy<'_> {
    fn drop(&mut self) {
        let (flipped, paused) = {
            let mut state = self.core.state.write();
            let mut flipped = Vec::new();
            for name in &self.properties {
                if let Ok(property) = state.properties.get_mut(name) {
                    if property.end_busy().busy {
                        flipped.push(name.clone());
                    }
                }
            }
            (flipped, state.paused)
        };
        if !paused {
            for property in &flipped {
                self.core.emit_property_state(property, Observable::IsBusy);
            }
        }
    }
}
