//! Ordered lists of child objects
//!
//! An [`EntityList`] subscribes to every item it holds and republishes the
//! item's notifications as [`NodeEvent::ItemChanged`]. Structural changes
//! are raised as [`NodeEvent::CollectionChanged`] followed by the `Count`
//! change and any aggregate flag that flipped.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use bizobj_common::RuntimeConfig;
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::trace;

use crate::errors::{CoreError, CoreResult};
use crate::events::{CollectionChange, EventBus, GraphChange, NodeEvent, Observable, Observers, SubscriptionId};
use crate::id::ObjectId;
use crate::node::{self, GraphNode, Observer};
use crate::object::EntityBase;
use crate::snapshot::{ListSnapshot, NodeSnapshot, SnapshotContext};

struct ListEntry<T> {
    item: Arc<T>,
    subscription: SubscriptionId,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ListState {
    is_valid: bool,
    is_busy: bool,
    is_modified: bool,
}

/// Ordered list of shared graph nodes. Duplicates are allowed; membership
/// is by identity.
pub struct EntityList<T: GraphNode = EntityBase> {
    id: ObjectId,
    items: RwLock<Vec<ListEntry<T>>>,
    observers: Observers<NodeEvent>,
    bus: EventBus,
    parent: RwLock<Option<Weak<dyn GraphNode>>>,
    self_ref: Weak<EntityList<T>>,
    published: Mutex<ListState>,
}

impl<T: GraphNode> EntityList<T> {
    pub fn new() -> Arc<Self> {
        Self::with_config(&RuntimeConfig::default())
    }

    pub fn with_config(config: &RuntimeConfig) -> Arc<Self> {
        Arc::new_cyclic(|weak| EntityList {
            id: ObjectId::new(),
            items: RwLock::new(Vec::new()),
            observers: Observers::new(),
            bus: EventBus::with_capacity(config.event_bus_capacity),
            parent: RwLock::new(None),
            self_ref: weak.clone(),
            published: Mutex::new(ListState {
                is_valid: true,
                ..ListState::default()
            }),
        })
    }

    /// Append an item
    pub fn add(&self, item: Arc<T>) {
        let index = self.len();
        self.insert_entry(index, item);
    }

    /// Insert at `index`; `index == len` appends
    pub fn insert(&self, index: usize, item: Arc<T>) -> CoreResult<()> {
        let len = self.len();
        if index > len {
            return Err(CoreError::IndexOutOfRange { index, len });
        }
        self.insert_entry(index, item);
        Ok(())
    }

    fn insert_entry(&self, index: usize, item: Arc<T>) {
        let item_id = item.id();
        let subscription = self.adopt(&item);
        let index = {
            let mut items = self.items.write();
            let index = index.min(items.len());
            items.insert(index, ListEntry { item, subscription });
            index
        };
        trace!(list_id = %self.id, item = %item_id, index, "item added");

        self.emit(NodeEvent::CollectionChanged {
            source: self.id,
            change: CollectionChange::Add { index, item: item_id },
        });
        self.emit_count();
        self.refresh();
    }

    /// Parent, child flag and subscription for a new member
    fn adopt(&self, item: &Arc<T>) -> SubscriptionId {
        item.set_parent(self.parent.read().clone());
        item.mark_as_child();

        let list = self.self_ref.clone();
        let item_id = item.id();
        let observer: Observer = Arc::new(move |event: &NodeEvent| {
            if let Some(list) = list.upgrade() {
                list.item_changed(item_id, event);
            }
        });
        item.subscribe(observer)
    }

    fn release(&self, entry: ListEntry<T>) -> Arc<T> {
        entry.item.unsubscribe(entry.subscription);
        if self.contains(&entry.item) {
            return entry.item;
        }
        if let Some(parent) = self.parent() {
            if node::has_parent(&*entry.item, parent.id()) {
                entry.item.set_parent(None);
            }
        }
        entry.item
    }

    /// Remove the first occurrence of `item`; false if it is not a member
    pub fn remove(&self, item: &Arc<T>) -> bool {
        match self.index_of(item) {
            Some(index) => self.remove_at(index).is_ok(),
            None => false,
        }
    }

    /// Remove and return the item at `index`
    pub fn remove_at(&self, index: usize) -> CoreResult<Arc<T>> {
        let entry = {
            let mut items = self.items.write();
            if index >= items.len() {
                return Err(CoreError::IndexOutOfRange {
                    index,
                    len: items.len(),
                });
            }
            items.remove(index)
        };
        let item = self.release(entry);
        trace!(list_id = %self.id, item = %item.id(), index, "item removed");

        self.emit(NodeEvent::CollectionChanged {
            source: self.id,
            change: CollectionChange::Remove { index, item: item.id() },
        });
        self.emit_count();
        self.refresh();
        Ok(item)
    }

    /// Replace the item at `index`, returning the old one
    pub fn replace(&self, index: usize, item: Arc<T>) -> CoreResult<Arc<T>> {
        let len = self.len();
        if index >= len {
            return Err(CoreError::IndexOutOfRange { index, len });
        }
        let new_id = item.id();
        let subscription = self.adopt(&item);
        let swapped = {
            let mut items = self.items.write();
            match items.get_mut(index) {
                Some(slot) => Ok(std::mem::replace(slot, ListEntry { item, subscription })),
                None => Err((item, subscription, items.len())),
            }
        };
        let old_entry = match swapped {
            Ok(entry) => entry,
            Err((item, subscription, len)) => {
                // shrunk concurrently
                item.unsubscribe(subscription);
                return Err(CoreError::IndexOutOfRange { index, len });
            }
        };
        let old = self.release(old_entry);

        self.emit(NodeEvent::CollectionChanged {
            source: self.id,
            change: CollectionChange::Replace {
                index,
                old: old.id(),
                new: new_id,
            },
        });
        self.refresh();
        Ok(old)
    }

    /// Remove every item with a single `Reset`
    pub fn clear(&self) {
        let entries: Vec<ListEntry<T>> = std::mem::take(&mut *self.items.write());
        let had_items = !entries.is_empty();
        for entry in entries {
            self.release(entry);
        }

        self.emit(NodeEvent::CollectionChanged {
            source: self.id,
            change: CollectionChange::Reset,
        });
        if had_items {
            self.emit_count();
        }
        self.refresh();
    }

    pub fn get(&self, index: usize) -> Option<Arc<T>> {
        self.items.read().get(index).map(|e| Arc::clone(&e.item))
    }

    pub fn contains(&self, item: &Arc<T>) -> bool {
        self.index_of(item).is_some()
    }

    pub fn index_of(&self, item: &Arc<T>) -> Option<usize> {
        self.items
            .read()
            .iter()
            .position(|e| Arc::ptr_eq(&e.item, item))
    }

    /// Snapshot of the current items
    pub fn items(&self) -> Vec<Arc<T>> {
        self.items.read().iter().map(|e| Arc::clone(&e.item)).collect()
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Async stream of value changes beneath this list
    pub fn events(&self) -> broadcast::Receiver<GraphChange> {
        self.bus.subscribe()
    }

    /// Register a closure observer
    pub fn observe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&NodeEvent) + Send + Sync + 'static,
    {
        self.observers.subscribe(Arc::new(callback))
    }

    /// Wait until no item is running rules
    pub async fn wait_for_all_items(&self) {
        let items = self.items();
        join_all(items.iter().map(|item| item.wait_for_tasks())).await;
    }

    fn item_changed(&self, item: ObjectId, event: &NodeEvent) {
        let is_member = self.items.read().iter().any(|e| e.item.id() == item);
        if !is_member {
            return;
        }
        let wrapped = NodeEvent::ItemChanged {
            source: self.id,
            item,
            event: Box::new(event.clone()),
        };
        self.emit(wrapped.clone());
        if let Some(path) = wrapped.value_path() {
            self.bus.publish(GraphChange::new(wrapped.origin().source(), path));
        }
        self.refresh();
    }

    fn emit(&self, event: NodeEvent) {
        self.observers.emit(&event);
    }

    fn emit_count(&self) {
        self.emit(NodeEvent::StateChanged {
            source: self.id,
            state: Observable::Count,
        });
    }

    fn current_state(&self) -> ListState {
        let items = self.items();
        ListState {
            is_valid: items.iter().all(|i| i.is_valid()),
            is_busy: items.iter().any(|i| i.is_busy()),
            is_modified: items.iter().any(|i| i.is_modified()),
        }
    }

    /// Emit `StateChanged` for aggregate flags that flipped
    fn refresh(&self) {
        let flips = {
            let mut published = self.published.lock();
            let current = self.current_state();
            let flips: Vec<Observable> = [
                (published.is_valid != current.is_valid, Observable::IsValid),
                (published.is_busy != current.is_busy, Observable::IsBusy),
                (published.is_modified != current.is_modified, Observable::IsModified),
            ]
            .into_iter()
            .filter_map(|(changed, state)| changed.then_some(state))
            .collect();
            *published = current;
            flips
        };
        for state in flips {
            self.emit(NodeEvent::StateChanged {
                source: self.id,
                state,
            });
        }
    }
}

impl EntityList<EntityBase> {
    /// Rebuild a list of entities from its wire form
    pub fn from_snapshot(snapshot: ListSnapshot, context: &SnapshotContext<'_>) -> CoreResult<Arc<Self>> {
        let list = Self::with_config(context.config);
        for item in snapshot.items {
            list.add(EntityBase::from_snapshot(item, context)?);
        }
        Ok(list)
    }
}

#[async_trait]
impl<T: GraphNode> GraphNode for EntityList<T> {
    fn id(&self) -> ObjectId {
        self.id
    }

    fn is_valid(&self) -> bool {
        self.items().iter().all(|i| i.is_valid())
    }

    /// A list carries no messages of its own
    fn is_self_valid(&self) -> bool {
        true
    }

    fn is_busy(&self) -> bool {
        self.items().iter().any(|i| i.is_busy())
    }

    fn is_modified(&self) -> bool {
        self.items().iter().any(|i| i.is_modified())
    }

    fn parent(&self) -> Option<Arc<dyn GraphNode>> {
        self.parent.read().as_ref().and_then(Weak::upgrade)
    }

    /// Items share the list's parent
    fn set_parent(&self, parent: Option<Weak<dyn GraphNode>>) {
        *self.parent.write() = parent.clone();
        for item in self.items() {
            item.set_parent(parent.clone());
        }
    }

    fn subscribe(&self, observer: Observer) -> SubscriptionId {
        self.observers.subscribe(observer)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    async fn run_rules(&self) {
        let items = self.items();
        join_all(items.iter().map(|item| item.run_rules())).await;
    }

    async fn wait_for_tasks(&self) {
        self.wait_for_all_items().await;
    }

    fn snapshot_node(&self) -> Option<NodeSnapshot> {
        let items = self
            .items()
            .iter()
            .filter_map(|item| match item.snapshot_node() {
                Some(NodeSnapshot::Entity(entity)) => Some(entity),
                _ => None,
            })
            .collect();
        Some(NodeSnapshot::List(ListSnapshot { items }))
    }

    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl<T: GraphNode> Drop for EntityList<T> {
    fn drop(&mut self) {
        for entry in self.items.get_mut().drain(..) {
            entry.item.unsubscribe(entry.subscription);
        }
    }
}

impl<T: GraphNode> fmt::Debug for EntityList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityList")
            .field("id", &self.id)
            .field("len", &self.len())
            .finish()
    }
}
