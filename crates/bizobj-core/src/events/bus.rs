//! Broadcast bus for "something beneath this object changed"
//!
//! Each object and list owns an [`EventBus`]. A value change anywhere in
//! the subtree is published with its dotted breadcrumb path, so async
//! listeners can react without registering synchronous callbacks.
//!
//! # Example
//!
//! ```rust
//! use bizobj_core::events::{EventBus, GraphChange};
//! use bizobj_core::ObjectId;
//!
//! let bus = EventBus::new();
//! let mut subscriber = bus.subscribe();
//!
//! bus.publish(GraphChange::new(ObjectId::new(), "Address.City"));
//!
//! let change = subscriber.try_recv().unwrap();
//! assert_eq!(change.path, "Address.City");
//! assert_eq!(change.property(), "City");
//! ```

use tokio::sync::broadcast;

use crate::id::ObjectId;

/// Channel capacity for broadcast events
pub const DEFAULT_CAPACITY: usize = 1024;

/// A value changed somewhere in an object graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphChange {
    /// The object whose property value changed
    pub source: ObjectId,
    /// Dotted path from the publishing object, e.g. `Lines.Quantity`
    pub path: String,
}

impl GraphChange {
    pub fn new(source: ObjectId, path: impl Into<String>) -> Self {
        Self {
            source,
            path: path.into(),
        }
    }

    /// Name of the property that changed (last path segment)
    pub fn property(&self) -> &str {
        self.path.rsplit('.').next().unwrap_or(&self.path)
    }
}

/// Broadcast channel of [`GraphChange`]s
///
/// Cloning shares the underlying channel.
#[derive(Clone, Debug)]
pub struct EventBus {
    sender: broadcast::Sender<GraphChange>,
}

impl EventBus {
    /// Create a new event bus with default capacity (1024 events)
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a new event bus with custom capacity (at least 1)
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish to all subscribers.
    ///
    /// Non-blocking; slow receivers lose the oldest events.
    pub fn publish(&self, change: GraphChange) {
        // Ignore errors - it's ok if there are no subscribers
        let _ = self.sender.send(change);
    }

    /// Receive every change published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<GraphChange> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
