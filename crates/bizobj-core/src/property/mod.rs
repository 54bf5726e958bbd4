//! Property slots
//!
//! A [`Property`] layers three kinds of state over one value:
//!
//! - the value itself, with read-only and declared-kind checks,
//! - rule messages, which make up self validity,
//! - self-modification tracking, for properties of entities.
//!
//! When the value is a child graph node, validity, modification and busy
//! state are delegated to it. Every mutation reports a [`PropertyChanges`]
//! so the owning object can republish what flipped.

pub mod messages;

pub use messages::{MessageList, RuleMessage};

use crate::errors::{CoreError, CoreResult};
use crate::rules::RuleIndex;
use crate::schema::PropertyDescriptor;
use crate::snapshot::PropertySnapshot;
use crate::value::{Value, ValueKind};

/// What a single property mutation changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PropertyChanges {
    /// The stored value changed and observers should hear about it
    pub value: bool,
    /// `is_self_modified` flipped
    pub self_modified: bool,
    /// `is_self_valid` flipped
    pub self_valid: bool,
    /// The property's own busy state flipped
    pub busy: bool,
}

impl PropertyChanges {
    pub fn is_empty(&self) -> bool {
        !(self.value || self.self_modified || self.self_valid || self.busy)
    }

    /// Union of two change sets
    pub fn merge(self, other: PropertyChanges) -> PropertyChanges {
        PropertyChanges {
            value: self.value || other.value,
            self_modified: self.self_modified || other.self_modified,
            self_valid: self.self_valid || other.self_valid,
            busy: self.busy || other.busy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    Set,
    Load,
    Quiet,
    Restore,
}

/// One named value slot of a business object
#[derive(Debug, Clone)]
pub struct Property {
    descriptor: PropertyDescriptor,
    value: Value,
    messages: MessageList,
    tracking: bool,
    self_modified: bool,
    paused: bool,
    busy: usize,
}

impl Property {
    /// Build a property holding the descriptor's default value.
    ///
    /// `tracking` enables self-modification tracking; validate-only objects
    /// pass false.
    ///
    /// # Panics
    ///
    /// If the descriptor has an empty name or a default of the wrong kind.
    pub fn new(descriptor: PropertyDescriptor, tracking: bool) -> Self {
        assert!(
            !descriptor.name.trim().is_empty(),
            "property descriptor must have a non-empty name"
        );
        assert!(
            descriptor.kind.accepts(&descriptor.default),
            "default of property '{}' is {}, declared {}",
            descriptor.name,
            descriptor.default.kind_name(),
            descriptor.kind
        );
        Self {
            value: descriptor.default.clone(),
            descriptor,
            messages: MessageList::new(),
            tracking,
            self_modified: false,
            paused: false,
            busy: 0,
        }
    }

    /// Rebuild a property from its wire record.
    ///
    /// `is_self_modified` is taken verbatim (when tracking) and nothing else
    /// is recomputed.
    pub fn from_snapshot(snapshot: PropertySnapshot, kind: ValueKind, tracking: bool) -> CoreResult<Self> {
        if snapshot.name.trim().is_empty() {
            return Err(CoreError::snapshot("property snapshot has an empty name"));
        }
        if !kind.accepts(&snapshot.value) {
            return Err(CoreError::TypeMismatch {
                property: snapshot.name,
                expected: kind.to_string(),
                actual: snapshot.value.kind_name().to_string(),
            });
        }
        let display_name = (!snapshot.display_name.is_empty() && snapshot.display_name != snapshot.name)
            .then(|| snapshot.display_name.clone());
        let descriptor = PropertyDescriptor {
            name: snapshot.name,
            display_name,
            read_only: snapshot.is_read_only,
            kind,
            default: Value::Null,
        };
        Ok(Self {
            descriptor,
            value: snapshot.value,
            messages: MessageList::from(snapshot.rule_messages),
            tracking,
            self_modified: tracking && snapshot.is_self_modified,
            paused: false,
            busy: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn display_name(&self) -> &str {
        self.descriptor.display_name()
    }

    pub fn descriptor(&self) -> &PropertyDescriptor {
        &self.descriptor
    }

    pub fn kind(&self) -> ValueKind {
        self.descriptor.kind
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn is_read_only(&self) -> bool {
        self.descriptor.read_only
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Rules triggered by this property are running
    pub fn is_self_busy(&self) -> bool {
        self.busy > 0
    }

    /// Own busy state or that of the child node held as the value
    pub fn is_busy(&self) -> bool {
        self.is_self_busy() || self.value.as_node().map(|n| n.is_busy()).unwrap_or(false)
    }

    pub fn is_self_valid(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn is_valid(&self) -> bool {
        self.is_self_valid() && self.value.as_node().map(|n| n.is_valid()).unwrap_or(true)
    }

    pub fn is_self_modified(&self) -> bool {
        self.self_modified
    }

    /// Self-modified, or holding a modified child node
    pub fn is_modified(&self) -> bool {
        self.self_modified || self.is_child_modified()
    }

    /// Whether the child node held as the value is modified
    pub fn is_child_modified(&self) -> bool {
        self.value.as_node().map(|n| n.is_modified()).unwrap_or(false)
    }

    pub fn messages(&self) -> &MessageList {
        &self.messages
    }

    /// Set a new value, tracking modification unless paused
    pub fn set_value(&mut self, value: impl Into<Value>) -> CoreResult<PropertyChanges> {
        self.write(value.into(), WriteMode::Set)
    }

    /// Hydrate a value without marking the property modified
    pub fn load_value(&mut self, value: impl Into<Value>) -> CoreResult<PropertyChanges> {
        self.write(value.into(), WriteMode::Load)
    }

    /// Bookkeeping write: no value change is reported and nothing is tracked
    pub fn set_value_quietly(&mut self, value: impl Into<Value>) -> CoreResult<PropertyChanges> {
        self.write(value.into(), WriteMode::Quiet)
    }

    /// Load that also fills read-only properties; used when a graph is
    /// rebuilt from snapshots
    pub(crate) fn restore_value(&mut self, value: impl Into<Value>) -> CoreResult<PropertyChanges> {
        self.write(value.into(), WriteMode::Restore)
    }

    fn write(&mut self, value: Value, mode: WriteMode) -> CoreResult<PropertyChanges> {
        if self.is_read_only() && mode != WriteMode::Restore {
            return Err(CoreError::read_only(self.name()));
        }
        if !self.kind().accepts(&value) {
            return Err(CoreError::TypeMismatch {
                property: self.name().to_string(),
                expected: self.kind().to_string(),
                actual: value.kind_name().to_string(),
            });
        }

        let value = self.kind().coerce(value);
        let differs = self.value != value;
        self.value = value;

        let mut changes = PropertyChanges {
            value: differs && mode != WriteMode::Quiet,
            ..PropertyChanges::default()
        };
        if mode == WriteMode::Set && self.tracking && !self.paused && differs && !self.self_modified {
            self.self_modified = true;
            changes.self_modified = true;
        }
        Ok(changes)
    }

    /// Clear own modification; a child node's state is left alone
    pub fn mark_self_unmodified(&mut self) -> PropertyChanges {
        let was = std::mem::replace(&mut self.self_modified, false);
        PropertyChanges {
            self_modified: was,
            ..PropertyChanges::default()
        }
    }

    /// Returns whether the pause state changed
    pub fn set_paused(&mut self, paused: bool) -> bool {
        std::mem::replace(&mut self.paused, paused) != paused
    }

    /// Enter a rule run that this property triggers
    pub fn begin_busy(&mut self) -> PropertyChanges {
        self.busy += 1;
        PropertyChanges {
            busy: self.busy == 1,
            ..PropertyChanges::default()
        }
    }

    pub fn end_busy(&mut self) -> PropertyChanges {
        let was_busy = self.busy > 0;
        self.busy = self.busy.saturating_sub(1);
        PropertyChanges {
            busy: was_busy && self.busy == 0,
            ..PropertyChanges::default()
        }
    }

    /// Replace exactly the messages of rule `index`
    pub fn set_messages_for_rule(&mut self, index: RuleIndex, messages: Vec<RuleMessage>) -> PropertyChanges {
        let before = self.is_self_valid();
        self.messages.replace_for_rule(index, messages);
        PropertyChanges {
            self_valid: before != self.is_self_valid(),
            ..PropertyChanges::default()
        }
    }

    pub fn clear_messages(&mut self) -> PropertyChanges {
        let before = self.is_self_valid();
        self.messages.clear();
        PropertyChanges {
            self_valid: before != self.is_self_valid(),
            ..PropertyChanges::default()
        }
    }

    /// Wire record; child node values are sent as `Null`
    pub fn snapshot(&self) -> PropertySnapshot {
        PropertySnapshot {
            name: self.name().to_string(),
            value: self.value.detached(),
            is_self_modified: self.self_modified,
            is_read_only: self.is_read_only(),
            display_name: self.display_name().to_string(),
            rule_messages: self.messages.to_vec(),
        }
    }
}
