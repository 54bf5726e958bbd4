//! Shared fixtures for the bizobj scenario tests
//!
//! An order-entry domain: schemas declared in TOML, a rule registry and an
//! in-memory store standing in for persistence.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bizobj_common::RuntimeConfig;
use bizobj_core::prelude::*;
use bizobj_core::rules::{FnRule, PatternRule, RangeRule, RequiredRule, StringLengthRule, Violation};
use bizobj_core::{
    CoreResult, EntityBase, EntityList, EntitySnapshot, FactoryOperation, ObjectId, ObjectSchema, RuleManager,
    RuleRegistry, SaveCapability, SaveError, SchemaRegistry, SchemaSupplier, SnapshotContext,
};
use parking_lot::Mutex;
use tracing::debug;

pub const ORDER_SCHEMAS: &str = r#"
[[schemas]]
type_name = "Customer"

[[schemas.properties]]
name = "Id"
kind = "Int"
read_only = true

[[schemas.properties]]
name = "Name"
kind = "Text"
display_name = "Full name"

[[schemas.properties]]
name = "Email"
kind = "Text"

[[schemas]]
type_name = "OrderLine"

[[schemas.properties]]
name = "Sku"
kind = "Text"

[[schemas.properties]]
name = "Quantity"
kind = "Int"
default = { kind = "Int", value = 1 }

[[schemas]]
type_name = "Order"

[[schemas.properties]]
name = "Number"
kind = "Text"

[[schemas.properties]]
name = "Customer"
kind = "Object"

[[schemas.properties]]
name = "Lines"
kind = "Object"
"#;

#[derive(serde::Deserialize)]
struct SchemaFile {
    schemas: Vec<ObjectSchema>,
}

/// Every schema of the order-entry domain
pub fn schemas() -> CoreResult<SchemaRegistry> {
    let file: SchemaFile =
        toml::from_str(ORDER_SCHEMAS).map_err(|e| bizobj_core::CoreError::schema(e.to_string()))?;
    let registry = SchemaRegistry::new();
    for schema in file.schemas {
        registry.register(schema);
    }
    Ok(registry)
}

/// Rules of the order-entry domain
pub fn rules() -> RuleRegistry {
    let registry = RuleRegistry::new();

    let mut customer = RuleManager::new()
        .with_rule(RequiredRule::new("Name"))
        .with_rule(StringLengthRule::new("Name", 2, 40));
    if let Ok(email) = PatternRule::new("Email", r"^[^@\s]+@[^@\s]+$") {
        customer.add_rule(email.with_message("Email is not an address"));
    }
    registry.register("Customer", customer);

    registry.register(
        "OrderLine",
        RuleManager::new()
            .with_rule(RequiredRule::new("Sku"))
            .with_rule(RangeRule::new("Quantity", 1.0, 999.0)),
    );

    registry.register(
        "Order",
        RuleManager::new()
            .with_rule(RequiredRule::new("Number"))
            .with_rule(FnRule::new("HasCustomer", &[], |context| {
                if context.value("Customer").is_null() {
                    vec![Violation::object("an order needs a customer")]
                } else {
                    Vec::new()
                }
            })),
    );
    registry
}

/// Schemas, rules and configuration bundled for building objects
pub struct Domain {
    pub schemas: SchemaRegistry,
    pub rules: RuleRegistry,
    pub config: RuntimeConfig,
}

impl Domain {
    pub fn new(config: RuntimeConfig) -> CoreResult<Self> {
        Ok(Self {
            schemas: schemas()?,
            rules: rules(),
            config,
        })
    }

    /// A fresh entity of a registered type
    pub fn entity(&self, type_name: &str) -> CoreResult<Arc<EntityBase>> {
        let schema = self
            .schemas
            .schema(type_name)
            .ok_or_else(|| bizobj_core::CoreError::schema(format!("unknown type '{type_name}'")))?;
        Ok(EntityBase::builder(schema)
            .rules_from(&self.rules)
            .config(self.config.clone())
            .build_entity())
    }

    /// A new order with an empty customer and no lines
    pub fn new_order(&self, number: &str) -> CoreResult<Arc<EntityBase>> {
        let order = self.entity("Order")?;
        let customer = self.entity("Customer")?;
        let lines: Arc<EntityList> = EntityList::with_config(&self.config);
        {
            let _pause = order.paused();
            order.load("Customer", customer)?;
            order.load("Lines", lines)?;
            order.set("Number", number)?;
        }
        order.mark_new();
        Ok(order)
    }

    pub fn lines(&self, order: &EntityBase) -> CoreResult<Arc<EntityList>> {
        order
            .child::<EntityList>("Lines")?
            .ok_or_else(|| bizobj_core::CoreError::not_found("Lines"))
    }

    pub fn customer(&self, order: &EntityBase) -> CoreResult<Arc<EntityBase>> {
        order
            .child::<EntityBase>("Customer")?
            .ok_or_else(|| bizobj_core::CoreError::not_found("Customer"))
    }

    /// Append a line to an order
    pub fn add_line(&self, order: &EntityBase, sku: &str, quantity: i64) -> CoreResult<Arc<EntityBase>> {
        let line = self.entity("OrderLine")?;
        line.set("Sku", sku)?;
        line.set("Quantity", quantity)?;
        line.mark_new();
        self.lines(order)?.add(line.clone());
        Ok(line)
    }

    pub fn context(&self) -> SnapshotContext<'_> {
        SnapshotContext::new(&self.schemas, &self.config).with_rules(&self.rules)
    }
}

/// In-memory persistence keyed by object id
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<HashMap<ObjectId, EntitySnapshot>>,
    log: Mutex<Vec<FactoryOperation>>,
    reject: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every following save fail
    pub fn reject_saves(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    /// Operations performed so far
    pub fn operations(&self) -> Vec<FactoryOperation> {
        self.log.lock().clone()
    }

    pub fn row(&self, id: ObjectId) -> Option<EntitySnapshot> {
        self.rows.lock().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SaveCapability for MemoryStore {
    async fn save(&self, target: &EntityBase, operation: FactoryOperation) -> Result<(), SaveError> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(SaveError::Rejected(format!("{} refused", target.type_name())));
        }
        debug!(object_id = %target.id(), %operation, "storing");
        match operation {
            FactoryOperation::Delete => {
                self.rows.lock().remove(&target.id());
            }
            _ => {
                self.rows.lock().insert(target.id(), target.snapshot());
            }
        }
        self.log.lock().push(operation);
        Ok(())
    }
}
