//! Ordered collection of an object's properties
//!
//! Built from a finished schema; the manager never discovers properties on
//! its own. Enumeration follows schema order.

use indexmap::IndexMap;

use crate::errors::{CoreError, CoreResult};
use crate::property::{Property, PropertyChanges};
use crate::schema::{ObjectSchema, PropertyDescriptor};
use crate::snapshot::PropertySnapshot;
use crate::value::ValueKind;

/// Name to property map in declaration order
#[derive(Debug, Clone, Default)]
pub struct PropertyManager {
    properties: IndexMap<String, Property>,
}

impl PropertyManager {
    /// Build one property per schema entry.
    ///
    /// # Panics
    ///
    /// On duplicate or empty property names.
    pub fn from_schema(schema: &ObjectSchema, tracking: bool) -> Self {
        Self::from_factories(
            schema
                .properties
                .iter()
                .map(|descriptor| (descriptor.name.clone(), descriptor.clone())),
            |descriptor| Property::new(descriptor, tracking),
        )
    }

    /// Build from `(name, entry)` pairs and a factory wrapping each entry
    ///
    /// # Panics
    ///
    /// On duplicate names, or if the factory returns a property whose name
    /// differs from its entry.
    pub fn from_factories<E, F>(entries: impl IntoIterator<Item = (String, E)>, mut factory: F) -> Self
    where
        F: FnMut(E) -> Property,
    {
        let mut properties = IndexMap::new();
        for (name, entry) in entries {
            let property = factory(entry);
            assert_eq!(property.name(), name, "factory built a property under another name");
            assert!(
                properties.insert(name.clone(), property).is_none(),
                "duplicate property '{name}' in schema"
            );
        }
        Self { properties }
    }

    /// Rebuild from wire records, checking each against the schema
    pub fn from_snapshots(
        schema: &ObjectSchema,
        snapshots: Vec<PropertySnapshot>,
        tracking: bool,
    ) -> CoreResult<Self> {
        let mut manager = Self::from_schema(schema, tracking);
        for snapshot in snapshots {
            let descriptor: &PropertyDescriptor = schema
                .get(&snapshot.name)
                .ok_or_else(|| CoreError::not_found(&snapshot.name))?;
            let kind: ValueKind = descriptor.kind;
            let name = snapshot.name.clone();
            let property = Property::from_snapshot(snapshot, kind, tracking)?;
            manager.properties.insert(name, property);
        }
        Ok(manager)
    }

    pub fn has(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    pub fn get(&self, name: &str) -> CoreResult<&Property> {
        self.properties.get(name).ok_or_else(|| CoreError::not_found(name))
    }

    pub fn get_mut(&mut self, name: &str) -> CoreResult<&mut Property> {
        self.properties
            .get_mut(name)
            .ok_or_else(|| CoreError::not_found(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Property> {
        self.properties.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Property> {
        self.properties.values_mut()
    }

    pub fn names(&self) -> Vec<String> {
        self.properties.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn all_valid(&self) -> bool {
        self.iter().all(Property::is_valid)
    }

    pub fn all_self_valid(&self) -> bool {
        self.iter().all(Property::is_self_valid)
    }

    pub fn any_busy(&self) -> bool {
        self.iter().any(Property::is_busy)
    }

    pub fn any_self_modified(&self) -> bool {
        self.iter().any(Property::is_self_modified)
    }

    /// Whether any property holds a modified child node
    pub fn any_child_modified(&self) -> bool {
        self.iter().any(Property::is_child_modified)
    }

    /// Names of modified properties (own or delegated), in schema order
    pub fn modified_property_names(&self) -> Vec<String> {
        self.iter()
            .filter(|p| p.is_modified())
            .map(|p| p.name().to_string())
            .collect()
    }

    pub fn first_invalid(&self) -> Option<&Property> {
        self.iter().find(|p| !p.is_valid())
    }

    /// Pause or resume every property
    pub fn set_paused_all(&mut self, paused: bool) {
        for property in self.iter_mut() {
            property.set_paused(paused);
        }
    }

    /// Clear self-modification everywhere; returns names whose flag flipped
    pub fn mark_self_unmodified_all(&mut self) -> Vec<String> {
        self.iter_mut()
            .filter_map(|p| {
                let changes: PropertyChanges = p.mark_self_unmodified();
                changes.self_modified.then(|| p.name().to_string())
            })
            .collect()
    }

    pub fn snapshots(&self) -> Vec<PropertySnapshot> {
        self.iter().map(Property::snapshot).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> ObjectSchema {
        ObjectSchema::new("Customer")
            .property(PropertyDescriptor::new("Id").read_only().with_kind(ValueKind::Int))
            .property(PropertyDescriptor::new("Name").with_kind(ValueKind::Text))
            .property(PropertyDescriptor::new("Email").with_kind(ValueKind::Text))
    }

    #[test]
    fn test_schema_order_preserved() {
        let manager = PropertyManager::from_schema(&schema(), true);
        assert_eq!(manager.names(), vec!["Id", "Name", "Email"]);
        assert!(manager.has("Email"));
        assert!(!manager.has("Phone"));
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let mut manager = PropertyManager::from_schema(&schema(), true);
        assert_eq!(manager.get("Phone").unwrap_err(), CoreError::not_found("Phone"));
        assert!(manager.get_mut("Phone").is_err());
    }

    #[test]
    #[should_panic(expected = "duplicate property 'Name'")]
    fn test_duplicate_names_panic() {
        let schema = ObjectSchema::new("Bad")
            .property(PropertyDescriptor::new("Name"))
            .property(PropertyDescriptor::new("Name"));
        PropertyManager::from_schema(&schema, true);
    }

    #[test]
    fn test_aggregates() {
        let mut manager = PropertyManager::from_schema(&schema(), true);
        assert!(manager.all_valid());
        assert!(!manager.any_self_modified());

        manager.get_mut("Email").unwrap().set_value("a@b.c").unwrap();
        manager.get_mut("Name").unwrap().set_value("Ada").unwrap();
        assert_eq!(manager.modified_property_names(), vec!["Name", "Email"]);

        assert_eq!(manager.mark_self_unmodified_all(), vec!["Name", "Email"]);
        assert!(manager.mark_self_unmodified_all().is_empty());
        assert!(!manager.any_self_modified());
    }

    #[test]
    fn test_first_invalid() {
        use crate::property::RuleMessage;
        use crate::rules::RuleIndex;

        let mut manager = PropertyManager::from_schema(&schema(), true);
        let index = RuleIndex(0);
        manager
            .get_mut("Email")
            .unwrap()
            .set_messages_for_rule(index, vec![RuleMessage::new("Email", "required", index)]);
        assert_eq!(manager.first_invalid().map(|p| p.name()), Some("Email"));
        assert!(!manager.all_self_valid());
    }

    #[test]
    fn test_pause_all() {
        let mut manager = PropertyManager::from_schema(&schema(), true);
        manager.set_paused_all(true);
        assert!(manager.iter().all(Property::is_paused));
        manager.get_mut("Name").unwrap().set_value("x").unwrap();
        assert!(!manager.any_self_modified());
    }

    #[test]
    fn test_from_snapshots_rejects_unknown() {
        let manager = PropertyManager::from_schema(&schema(), true);
        let mut snapshots = manager.snapshots();
        snapshots[1].value = "Ada".into();
        snapshots[1].is_self_modified = true;

        let rebuilt = PropertyManager::from_snapshots(&schema(), snapshots.clone(), true).unwrap();
        assert_eq!(rebuilt.get("Name").unwrap().value().as_str(), Some("Ada"));
        assert!(rebuilt.get("Name").unwrap().is_self_modified());

        snapshots[0].name = "Phone".to_string();
        assert!(PropertyManager::from_snapshots(&schema(), snapshots, true).is_err());
    }
}
