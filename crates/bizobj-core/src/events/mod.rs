//! Change notification for business objects and lists
//!
//! Two channels exist:
//!
//! - [`Observers`]: an ordered registry of synchronous callbacks. Every
//!   object and list owns one; callbacks run in registration order on the
//!   thread that made the change, after internal locks are released.
//! - [`EventBus`]: a tokio broadcast channel carrying a [`GraphChange`] for
//!   every value change at or beneath an object, for async listeners.

pub mod bus;

pub use bus::{EventBus, GraphChange};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::id::ObjectId;

/// Handle returned by [`Observers::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Aggregate or per-property state that can flip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Observable {
    IsModified,
    IsSelfModified,
    IsValid,
    IsSelfValid,
    IsBusy,
    IsSavable,
    IsNew,
    IsDeleted,
    IsChild,
    IsPaused,
    /// Number of items in a list
    Count,
}

impl fmt::Display for Observable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Structural change of a list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionChange {
    Add { index: usize, item: ObjectId },
    Remove { index: usize, item: ObjectId },
    Replace {
        index: usize,
        old: ObjectId,
        new: ObjectId,
    },
    /// The list was cleared
    Reset,
}

/// Notification raised by an object or list
#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    /// A property value changed
    ValueChanged { source: ObjectId, property: String },
    /// A per-property flag flipped
    PropertyStateChanged {
        source: ObjectId,
        property: String,
        state: Observable,
    },
    /// An object- or list-level aggregate flipped
    StateChanged { source: ObjectId, state: Observable },
    /// Add/remove/replace/reset on a list
    CollectionChanged {
        source: ObjectId,
        change: CollectionChange,
    },
    /// Republished from the child node held in `property`
    ChildChanged {
        source: ObjectId,
        property: String,
        event: Box<NodeEvent>,
    },
    /// Republished from a list item
    ItemChanged {
        source: ObjectId,
        item: ObjectId,
        event: Box<NodeEvent>,
    },
}

impl NodeEvent {
    /// The node that raised this event
    pub fn source(&self) -> ObjectId {
        match self {
            NodeEvent::ValueChanged { source, .. }
            | NodeEvent::PropertyStateChanged { source, .. }
            | NodeEvent::StateChanged { source, .. }
            | NodeEvent::CollectionChanged { source, .. }
            | NodeEvent::ChildChanged { source, .. }
            | NodeEvent::ItemChanged { source, .. } => *source,
        }
    }

    /// The innermost event of a republished chain
    pub fn origin(&self) -> &NodeEvent {
        match self {
            NodeEvent::ChildChanged { event, .. } | NodeEvent::ItemChanged { event, .. } => {
                event.origin()
            }
            other => other,
        }
    }

    /// Dotted breadcrumb of the changed value, e.g. `Address.City`.
    ///
    /// `None` unless the innermost event is a value change.
    pub fn value_path(&self) -> Option<String> {
        match self {
            NodeEvent::ValueChanged { property, .. } => Some(property.clone()),
            NodeEvent::ChildChanged {
                property, event, ..
            } => event.value_path().map(|inner| format!("{property}.{inner}")),
            NodeEvent::ItemChanged { event, .. } => event.value_path(),
            _ => None,
        }
    }
}

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Ordered registry of synchronous subscribers
pub struct Observers<E> {
    next_id: AtomicU64,
    entries: Mutex<Vec<(SubscriptionId, Callback<E>)>>,
}

impl<E> Observers<E> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Register a callback; it runs after every callback registered earlier
    pub fn subscribe(&self, callback: Arc<dyn Fn(&E) + Send + Sync>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.lock().push((id, callback));
        id
    }

    /// Returns false if the id was not registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    /// Invoke every callback in registration order.
    ///
    /// The registry lock is not held while callbacks run, so a callback may
    /// subscribe or unsubscribe without deadlocking.
    pub fn emit(&self, event: &E) {
        let callbacks: Vec<Callback<E>> = self
            .entries
            .lock()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in callbacks {
            callback(event);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E> Default for Observers<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for Observers<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("subscribers", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callbacks_run_in_registration_order() {
        let observers: Observers<u32> = Observers::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let log = Arc::clone(&log);
            observers.subscribe(Arc::new(move |value: &u32| {
                log.lock().push(format!("{tag}:{value}"));
            }));
        }

        observers.emit(&7);
        assert_eq!(*log.lock(), vec!["first:7", "second:7", "third:7"]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let observers: Observers<u32> = Observers::new();
        let hits = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&hits);
        let id = observers.subscribe(Arc::new(move |_: &u32| *counter.lock() += 1));

        observers.emit(&1);
        assert!(observers.unsubscribe(id));
        assert!(!observers.unsubscribe(id));
        observers.emit(&2);

        assert_eq!(*hits.lock(), 1);
        assert!(observers.is_empty());
    }

    #[test]
    fn test_callback_may_unsubscribe_itself() {
        let observers: Arc<Observers<u32>> = Arc::new(Observers::new());
        let slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));

        let registry = Arc::clone(&observers);
        let own_id = Arc::clone(&slot);
        let id = observers.subscribe(Arc::new(move |_: &u32| {
            if let Some(id) = *own_id.lock() {
                registry.unsubscribe(id);
            }
        }));
        *slot.lock() = Some(id);

        observers.emit(&1);
        assert!(observers.is_empty());
    }

    #[test]
    fn test_value_path_breadcrumbs() {
        let child = ObjectId::new();
        let parent = ObjectId::new();
        let event = NodeEvent::ChildChanged {
            source: parent,
            property: "Address".to_string(),
            event: Box::new(NodeEvent::ValueChanged {
                source: child,
                property: "City".to_string(),
            }),
        };

        assert_eq!(event.value_path().as_deref(), Some("Address.City"));
        assert_eq!(event.source(), parent);
        assert_eq!(event.origin().source(), child);

        let state = NodeEvent::StateChanged {
            source: parent,
            state: Observable::IsModified,
        };
        assert_eq!(state.value_path(), None);
    }
}
