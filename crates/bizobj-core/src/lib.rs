//! # bizobj core
//!
//! State and validation core for hierarchical business objects.
//!
//! ## Features
//!
//! - **Property containers**: typed values with per-property modification,
//!   validity and busy tracking
//! - **Rules**: sync and async validation rules, run concurrently with
//!   stale results discarded
//! - **Entity lifecycle**: new/old/child/deleted state machine driven by
//!   save completion
//! - **Object graphs**: child objects and lists whose notifications bubble
//!   to their parents
//! - **Snapshots**: serde wire form for whole graphs
//!
//! ## Example
//!
//! ```rust
//! use bizobj_core::prelude::*;
//! use bizobj_core::rules::{RequiredRule, RuleManager};
//! use bizobj_core::schema::{ObjectSchema, PropertyDescriptor};
//! use bizobj_core::EntityBase;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let schema = ObjectSchema::new("Customer").property(PropertyDescriptor::new("Name"));
//! let customer = EntityBase::builder(schema)
//!     .rules(RuleManager::new().with_rule(RequiredRule::new("Name")))
//!     .build_entity();
//!
//! customer.run_rules().await;
//! assert!(!customer.is_valid());
//!
//! customer.set_and_check("Name", "Ada".into()).await.unwrap();
//! assert!(customer.is_valid());
//! assert!(customer.is_modified());
//! # }
//! ```

pub mod errors;
pub mod events;
pub mod factory;
pub mod id;
pub mod list;
pub mod node;
pub mod object;
pub mod property;
pub mod property_manager;
pub mod rules;
pub mod schema;
pub mod snapshot;
pub mod value;

pub use errors::{CoreError, CoreResult, SaveFailureReason};
pub use events::{CollectionChange, EventBus, GraphChange, NodeEvent, Observable, SubscriptionId};
pub use factory::{FactoryOperation, SaveCapability, SaveError};
pub use id::ObjectId;
pub use list::EntityList;
pub use node::GraphNode;
pub use object::{AggregateState, EntityBase, Lifecycle, ObjectBuilder, PauseGuard, ValidateBase, ValidateObject};
pub use property::{MessageList, RuleMessage};
pub use rules::{Rule, RuleIndex, RuleManager, RuleRegistry, RuleSupplier, Violation};
pub use schema::{ObjectSchema, PropertyDescriptor, SchemaRegistry, SchemaSupplier};
pub use snapshot::{restore_node, EntitySnapshot, ListSnapshot, NodeSnapshot, SnapshotContext};
pub use value::{FromValue, ObjectRef, Value, ValueKind};

/// Traits needed to work with objects and lists
pub mod prelude {
    pub use crate::node::GraphNode;
    pub use crate::object::ValidateObject;
}
