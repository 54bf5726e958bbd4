//! Persistence boundary
//!
//! The core never talks to storage itself. An entity is bound to a
//! [`SaveCapability`] and hands itself over together with the
//! [`FactoryOperation`] its lifecycle state calls for.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::object::EntityBase;

/// What a data portal did (or is asked to do) with an object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FactoryOperation {
    Create,
    Fetch,
    Update,
    Insert,
    Delete,
}

impl fmt::Display for FactoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Failure reported by a [`SaveCapability`]
#[derive(Error, Debug, Clone)]
pub enum SaveError {
    #[error("Persistence rejected the object: {0}")]
    Rejected(String),

    #[error("Persistence unavailable: {0}")]
    Unavailable(String),

    #[error("Persistence failed")]
    Storage(#[source] Arc<dyn std::error::Error + Send + Sync>),
}

impl SaveError {
    /// Wrap a lower-level store error, keeping it as the source
    pub fn storage(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Storage(Arc::new(error))
    }
}

/// Persists an entity
#[async_trait]
pub trait SaveCapability: Send + Sync {
    /// Carry out `operation` for `target`. Lifecycle bookkeeping happens in
    /// the entity after this returns `Ok`.
    async fn save(&self, target: &EntityBase, operation: FactoryOperation) -> Result<(), SaveError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_serde() {
        let json = serde_json::to_string(&FactoryOperation::Insert).unwrap();
        assert_eq!(json, "\"Insert\"");
        assert_eq!(FactoryOperation::Delete.to_string(), "Delete");
    }

    #[test]
    fn test_save_error_display() {
        assert_eq!(
            SaveError::Rejected("duplicate key".into()).to_string(),
            "Persistence rejected the object: duplicate key"
        );
    }

    #[test]
    fn test_storage_error_keeps_source() {
        let err = SaveError::storage(std::io::Error::other("disk full"));
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("disk full"));
    }
}
