//! Identity of graph nodes

use std::fmt;

use serde::{Deserialize, Serialize};

/// Object identifier - a UUID-based identifier, unique per instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectId(uuid::Uuid);

impl ObjectId {
    /// Generate a new random object ID
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Create from string representation
    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(uuid::Uuid::parse_str(s)?))
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> uuid::Uuid {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(ObjectId::new(), ObjectId::new());
    }

    #[test]
    fn test_from_string() {
        let id = ObjectId::new();
        let parsed = ObjectId::from_string(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
        assert!(ObjectId::from_string("not-a-uuid").is_err());
    }
}
