//! Marshaling whole graphs through snapshots

use std::sync::Arc;

use bizobj_common::RuntimeConfig;
use bizobj_core::prelude::*;
use bizobj_core::rules::{RequiredRule, RuleManager, RuleRegistry};
use bizobj_core::{
    CoreError, EntityBase, EntityList, EntitySnapshot, ObjectSchema, PropertyDescriptor, SchemaRegistry,
    SchemaSupplier, SnapshotContext, ValidateBase, ValueKind,
};

struct Fixture {
    schemas: SchemaRegistry,
    rules: RuleRegistry,
    config: RuntimeConfig,
}

impl Fixture {
    fn new() -> Self {
        let schemas = SchemaRegistry::new();
        schemas.register(
            ObjectSchema::new("Order")
                .property(PropertyDescriptor::new("Id").read_only().with_kind(ValueKind::Int))
                .property(PropertyDescriptor::new("Number").with_kind(ValueKind::Text))
                .property(PropertyDescriptor::new("Customer").with_kind(ValueKind::Object))
                .property(PropertyDescriptor::new("Lines").with_kind(ValueKind::Object)),
        );
        schemas.register(
            ObjectSchema::new("Customer")
                .property(PropertyDescriptor::new("Name").with_kind(ValueKind::Text).with_display_name("Full name")),
        );
        schemas.register(ObjectSchema::new("Line").property(PropertyDescriptor::new("Qty").with_kind(ValueKind::Int)));

        let rules = RuleRegistry::new();
        rules.register("Customer", RuleManager::new().with_rule(RequiredRule::new("Name")));

        Self {
            schemas,
            rules,
            config: RuntimeConfig::default(),
        }
    }

    fn context(&self) -> SnapshotContext<'_> {
        SnapshotContext::new(&self.schemas, &self.config).with_rules(&self.rules)
    }

    fn schema(&self, type_name: &str) -> Arc<ObjectSchema> {
        self.schemas.schema(type_name).unwrap()
    }

    fn build(&self, type_name: &str) -> Arc<EntityBase> {
        EntityBase::builder(self.schema(type_name))
            .rules_from(&self.rules)
            .build_entity()
    }
}

#[tokio::test]
async fn test_graph_survives_a_json_round_trip() {
    let fixture = Fixture::new();
    let order = fixture.build("Order");
    let customer = fixture.build("Customer");
    let lines: Arc<EntityList> = EntityList::new();
    order.load("Customer", customer.clone()).unwrap();
    order.load("Lines", lines.clone()).unwrap();
    let line = fixture.build("Line");
    lines.add(line.clone());

    order.mark_new();
    order.set("Number", "SO-1").unwrap();
    line.load("Qty", 4).unwrap();
    customer.run_rules().await;
    assert!(!customer.is_valid());

    let json = order.snapshot().to_json().unwrap();
    let snapshot = EntitySnapshot::from_json(&json).unwrap();
    let restored = EntityBase::from_snapshot(snapshot, &fixture.context()).unwrap();

    assert_ne!(restored.id(), order.id());
    assert!(restored.is_new());
    assert!(restored.is_property_self_modified("Number").unwrap());
    assert_eq!(restored.get_as::<String>("Number").unwrap(), "SO-1");
    assert!(!restored.is_valid());

    let restored_customer = restored.child::<EntityBase>("Customer").unwrap().unwrap();
    assert!(restored_customer.is_child());
    assert_eq!(restored_customer.parent().map(|p| p.id()), Some(restored.id()));
    assert_eq!(restored_customer.display_name("Name").unwrap(), "Full name");
    assert_eq!(restored_customer.property_messages("Name").unwrap().len(), 1);

    let restored_lines = restored.child::<EntityList>("Lines").unwrap().unwrap();
    assert_eq!(restored_lines.len(), 1);
    let restored_line = restored_lines.get(0).unwrap();
    assert_eq!(restored_line.get_as::<i64>("Qty").unwrap(), 4);
    assert!(!restored_line.is_modified());

    restored_customer.set_and_check("Name", "Ada".into()).await.unwrap();
    assert!(restored.is_valid());
    assert!(restored.is_savable());
}

#[test]
fn test_restore_fills_read_only_properties() {
    let fixture = Fixture::new();
    let order = fixture.build("Order");
    let mut snapshot = order.snapshot();
    for property in &mut snapshot.properties {
        if property.name == "Id" {
            property.value = 42.into();
        }
    }

    let restored = EntityBase::from_snapshot(snapshot, &fixture.context()).unwrap();

    assert_eq!(restored.get_as::<i64>("Id").unwrap(), 42);
    assert!(restored.is_property_read_only("Id").unwrap());
    assert!(!restored.is_modified());
    assert!(restored.set("Id", 7).is_err());
}

#[test]
fn test_unknown_type_or_property_fails() {
    let fixture = Fixture::new();
    let mut snapshot = fixture.build("Customer").snapshot();
    snapshot.type_name = "Supplier".to_string();
    assert!(matches!(
        EntityBase::from_snapshot(snapshot, &fixture.context()),
        Err(CoreError::Snapshot { .. })
    ));

    let mut snapshot = fixture.build("Customer").snapshot();
    snapshot.properties[0].name = "Nickname".to_string();
    assert!(matches!(
        EntityBase::from_snapshot(snapshot, &fixture.context()),
        Err(CoreError::PropertyNotFound { .. })
    ));
}

#[test]
fn test_validate_object_round_trip() {
    let fixture = Fixture::new();
    let criteria = ValidateBase::new(fixture.schema("Customer"));
    criteria.set("Name", "Ada").unwrap();

    let restored = ValidateBase::from_snapshot(criteria.snapshot(), &fixture.context()).unwrap();

    assert_eq!(restored.get_as::<String>("Name").unwrap(), "Ada");
    assert!(!restored.is_modified());
    assert_eq!(restored.core().rules().len(), 1);
}
