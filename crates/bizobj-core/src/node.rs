//! The capability every member of an object graph shares
//!
//! Entities, validate objects and lists all implement [`GraphNode`]. A
//! property whose value is a node delegates validity, modification and busy
//! state to it; parents observe their children through
//! [`GraphNode::subscribe`] and are referenced back only weakly.

use std::any::Any;
use std::sync::{Arc, Weak};

use async_trait::async_trait;

use crate::events::{NodeEvent, SubscriptionId};
use crate::id::ObjectId;
use crate::snapshot::NodeSnapshot;

/// Synchronous subscriber callback
pub type Observer = Arc<dyn Fn(&NodeEvent) + Send + Sync>;

/// A node in a business object graph
#[async_trait]
pub trait GraphNode: Send + Sync + 'static {
    /// Identity of this node
    fn id(&self) -> ObjectId;

    /// Valid, including every child node
    fn is_valid(&self) -> bool;

    /// Valid, ignoring child nodes
    fn is_self_valid(&self) -> bool;

    /// Rules are running on this node or a child node
    fn is_busy(&self) -> bool;

    /// Modified, including child nodes. Nodes without tracking report false.
    fn is_modified(&self) -> bool {
        false
    }

    /// Own modification only
    fn is_self_modified(&self) -> bool {
        false
    }

    /// The owning node, if it is still alive
    fn parent(&self) -> Option<Arc<dyn GraphNode>>;

    /// Set or clear the non-owning back reference
    fn set_parent(&self, parent: Option<Weak<dyn GraphNode>>);

    /// Flag the node as owned by another object. Irreversible.
    fn mark_as_child(&self) {}

    /// Register a synchronous observer
    fn subscribe(&self, observer: Observer) -> SubscriptionId;

    /// Remove an observer; false if unknown
    fn unsubscribe(&self, id: SubscriptionId) -> bool;

    /// Run every rule of this node (and, for lists, of every item)
    async fn run_rules(&self);

    /// Wait until no rule is running on this node or beneath it
    async fn wait_for_tasks(&self);

    /// Wire form of this node, when it has one
    fn snapshot_node(&self) -> Option<NodeSnapshot> {
        None
    }

    /// Upcast used by [`ObjectRef::downcast`](crate::ObjectRef::downcast)
    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Subscribe a closure without boxing it by hand
pub fn observe<N, F>(node: &N, callback: F) -> SubscriptionId
where
    N: GraphNode + ?Sized,
    F: Fn(&NodeEvent) + Send + Sync + 'static,
{
    node.subscribe(Arc::new(callback))
}

/// Whether `node`'s parent is the node with id `parent`
pub(crate) fn has_parent(node: &dyn GraphNode, parent: ObjectId) -> bool {
    node.parent().map(|p| p.id() == parent).unwrap_or(false)
}
