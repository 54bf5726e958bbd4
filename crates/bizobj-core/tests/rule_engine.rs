//! Rule execution: concurrency limits, fencing, busy state and message
//! replacement

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bizobj_common::RuntimeConfig;
use bizobj_core::prelude::*;
use bizobj_core::rules::{AsyncFnRule, FnRule, RequiredRule, RuleManager, StringLengthRule, Violation};
use bizobj_core::{EntityBase, ObjectSchema, PropertyDescriptor, ValueKind};

fn schema() -> ObjectSchema {
    ObjectSchema::new("Customer")
        .property(PropertyDescriptor::new("Name").with_kind(ValueKind::Text))
        .property(PropertyDescriptor::new("Email").with_kind(ValueKind::Text))
}

#[tokio::test]
async fn test_concurrency_is_bounded() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let mut rules = RuleManager::new();
    for n in 0..5 {
        let in_flight = Arc::clone(&in_flight);
        let peak = Arc::clone(&peak);
        rules.add_rule(AsyncFnRule::new(format!("slow-{n}"), &["Name"], move |_| {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Vec::new()
            }
        }));
    }

    let config = RuntimeConfig {
        max_concurrent_rules: 2,
        ..RuntimeConfig::default()
    };
    let entity = EntityBase::builder(schema()).rules(rules).config(config).build_entity();

    entity.run_rules().await;

    assert_eq!(peak.load(Ordering::SeqCst), 2);
    assert_eq!(in_flight.load(Ordering::SeqCst), 0);
    assert!(!entity.is_busy());
}

#[tokio::test]
async fn test_stale_run_does_not_overwrite_newer_results() {
    let rules = RuleManager::new().with_rule(AsyncFnRule::new("NameCheck", &["Name"], |context| async move {
        if context.text("Name") == "slow" {
            tokio::time::sleep(Duration::from_millis(100)).await;
            vec![Violation::property("Name", "stale verdict")]
        } else {
            Vec::new()
        }
    }));
    let entity = EntityBase::builder(schema()).rules(rules).build_entity();

    entity.set("Name", "slow").unwrap();
    let first = {
        let entity = Arc::clone(&entity);
        tokio::spawn(async move { entity.run_rules_for("Name").await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    entity.set_and_check("Name", "fast".into()).await.unwrap();
    assert!(entity.is_valid());

    first.await.unwrap().unwrap();
    assert!(entity.is_valid());
    assert!(entity.broken_rules().is_empty());
    assert!(!entity.is_busy());
}

#[tokio::test]
async fn test_busy_while_rules_run() {
    let rules = RuleManager::new().with_rule(AsyncFnRule::new("Lookup", &["Email"], |_| async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Vec::new()
    }));
    let entity = EntityBase::builder(schema()).rules(rules).build_entity();

    let run = {
        let entity = Arc::clone(&entity);
        tokio::spawn(async move { entity.run_rules().await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(entity.is_busy());
    assert!(entity.is_property_busy("Email").unwrap());
    assert!(!entity.is_property_busy("Name").unwrap());
    assert!(!entity.is_savable());

    entity.wait_for_tasks().await;
    assert!(!entity.is_busy());
    assert!(!entity.is_property_busy("Email").unwrap());
    run.await.unwrap();
}

#[tokio::test]
async fn test_rule_replaces_only_its_own_messages() {
    let rules = RuleManager::new()
        .with_rule(RequiredRule::new("Name"))
        .with_rule(StringLengthRule::new("Name", 2, 5));
    let entity = EntityBase::builder(schema()).rules(rules).build_entity();

    entity.run_rules().await;
    let messages = entity.property_messages("Name").unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].text, "Name is required");

    entity.set_and_check("Name", "x".into()).await.unwrap();
    let messages = entity.property_messages("Name").unwrap();
    assert_eq!(messages.len(), 1);
    assert_ne!(messages[0].text, "Name is required");

    entity.set_and_check("Name", "Ada".into()).await.unwrap();
    assert!(entity.property_messages("Name").unwrap().is_empty());
    assert!(entity.is_valid());
}

#[tokio::test]
async fn test_object_level_messages() {
    let rules = RuleManager::new()
        .with_rule(FnRule::new("Contactable", &[], |context| {
            if context.text("Email").is_empty() {
                vec![Violation::object("a contact address is needed")]
            } else {
                Vec::new()
            }
        }))
        .with_rule(FnRule::new("Stray", &["Name"], |_| {
            vec![Violation::property("Nickname", "no such field")]
        }));
    let entity = EntityBase::builder(schema()).rules(rules).build_entity();

    entity.run_rules().await;

    assert!(!entity.is_valid());
    assert!(!entity.is_self_valid());
    assert!(entity.is_property_valid("Name").unwrap());
    assert!(entity.is_property_valid("Email").unwrap());
    assert_eq!(entity.object_messages().len(), 2);
    assert!(entity.object_messages().iter().all(|m| m.is_object_level()));
    assert_eq!(entity.broken_rules().len(), 2);

    entity.clear_messages();
    assert!(entity.is_valid());
}

#[tokio::test]
async fn test_run_rules_for_unknown_property() {
    let entity = EntityBase::new(schema());
    let err = entity.run_rules_for("Nickname").await.unwrap_err();
    assert_eq!(err, bizobj_core::CoreError::not_found("Nickname"));
}

#[tokio::test]
async fn test_panicking_rule_releases_busy() {
    let rules = RuleManager::new().with_rule(FnRule::new("Broken", &["Name"], |_| -> Vec<Violation> {
        panic!("rule bug")
    }));
    let entity = EntityBase::builder(schema()).rules(rules).build_entity();

    let run = {
        let entity = Arc::clone(&entity);
        tokio::spawn(async move { entity.run_rules().await })
    };
    assert!(run.await.is_err());

    assert!(!entity.is_busy());
    assert!(!entity.is_property_busy("Name").unwrap());
}

fn assert_send<T: Send>(_: &T) {}

#[tokio::test]
async fn test_rule_futures_can_be_spawned() {
    let rules = RuleManager::new()
        .with_rule(RequiredRule::new("Name"))
        .with_rule(AsyncFnRule::new("Lookup", &["Email"], |_| async { Vec::new() }));
    let entity = EntityBase::builder(schema()).rules(rules).build_entity();

    let run = entity.run_rules();
    assert_send(&run);
    run.await;

    let check = entity.set_and_check("Name", "Ada".into());
    assert_send(&check);
    check.await.unwrap();

    let validate = bizobj_core::ValidateBase::new(schema());
    let run = validate.run_rules_for("Name");
    assert_send(&run);
    run.await.unwrap();
    assert!(entity.is_valid());
}
