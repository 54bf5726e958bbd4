//! Errors raised by the state & validation core

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why [`EntityBase::save`](crate::EntityBase::save) refused to run.
///
/// Checked in declaration order; only the first applicable reason is
/// reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SaveFailureReason {
    /// Child objects are saved through their root
    IsChildObject,
    /// Nothing to persist
    NotModified,
    /// Rule messages are outstanding
    IsInvalid,
    /// Rules are still running
    IsBusy,
    /// No save capability bound to the object
    NoFactoryMethod,
}

impl fmt::Display for SaveFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::IsChildObject => "object is a child, save its root instead",
            Self::NotModified => "object is not modified",
            Self::IsInvalid => "object is invalid",
            Self::IsBusy => "object is busy running rules",
            Self::NoFactoryMethod => "no save capability bound to the object",
        };
        f.write_str(text)
    }
}

/// Core errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Property '{property}' is read only")]
    ReadOnly { property: String },

    #[error("Property '{property}' not found")]
    PropertyNotFound { property: String },

    #[error("Save refused: {0}")]
    SavePrecondition(SaveFailureReason),

    #[error("Type mismatch on '{property}': expected {expected}, got {actual}")]
    TypeMismatch {
        property: String,
        expected: String,
        actual: String,
    },

    #[error("Index {index} out of range for list of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Save failed: {reason}")]
    SaveFailed { reason: String },

    #[error("Snapshot error: {reason}")]
    Snapshot { reason: String },

    #[error("Invalid schema: {reason}")]
    Schema { reason: String },
}

impl CoreError {
    /// Create a PropertyNotFound error
    pub fn not_found(property: impl Into<String>) -> Self {
        Self::PropertyNotFound {
            property: property.into(),
        }
    }

    /// Create a ReadOnly error
    pub fn read_only(property: impl Into<String>) -> Self {
        Self::ReadOnly {
            property: property.into(),
        }
    }

    /// Create a Snapshot error
    pub fn snapshot(reason: impl Into<String>) -> Self {
        Self::Snapshot {
            reason: reason.into(),
        }
    }

    /// Create a Schema error
    pub fn schema(reason: impl Into<String>) -> Self {
        Self::Schema {
            reason: reason.into(),
        }
    }

    /// The save precondition that failed, if this is one
    pub fn save_failure_reason(&self) -> Option<SaveFailureReason> {
        match self {
            Self::SavePrecondition(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// Result type alias for core operations
pub type CoreResult<T> = Result<T, CoreError>;
