mod common;

use common::StaticCheck;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use voucher::{CheckRegistry, VoucherError};

#[test]
fn test_builtin_checks_are_registered() {
    let registry = CheckRegistry::with_builtin_checks();
    assert_eq!(
        registry.names(),
        vec!["approved", "diy", "nobody", "provenance", "sbom", "snakeoil"]
    );
}

#[test]
fn test_get_returns_requested_checks() {
    let registry = CheckRegistry::with_builtin_checks();
    let checks = registry.get(&["diy", "snakeoil"]).unwrap();

    let names: Vec<&str> = checks.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["diy", "snakeoil"]);
}

#[test]
fn test_get_fails_closed_on_unknown_name() {
    let registry = CheckRegistry::with_builtin_checks();

    let err = registry.get(&["diy", "nonexistent", "snakeoil"]).err().unwrap();
    assert!(matches!(err, VoucherError::UnknownCheck(ref name) if name == "nonexistent"));
    assert!(err.to_string().contains("nonexistent"));
}

#[test]
fn test_first_registration_wins() {
    let mut registry = CheckRegistry::new();
    assert!(registry.register("custom", StaticCheck::pass));
    assert!(!registry.register("custom", StaticCheck::fail));
    assert!(registry.is_registered("custom"));
    assert_eq!(registry.names(), vec!["custom"]);
}

#[tokio::test]
async fn test_first_registered_factory_is_used() {
    let mut registry = CheckRegistry::new();
    registry.register("custom", StaticCheck::pass);
    registry.register("custom", StaticCheck::fail);

    let mut checks = registry.get(&["custom"]).unwrap();
    let (_, check) = checks.pop().unwrap();
    assert!(check.check(&common::image()).await.unwrap());
}

#[test]
fn test_get_creates_fresh_instances() {
    let created = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&created);

    let mut registry = CheckRegistry::new();
    registry.register("counted", move || {
        counter.fetch_add(1, Ordering::SeqCst);
        StaticCheck::pass()
    });

    registry.get(&["counted"]).unwrap();
    registry.get(&["counted", "counted"]).unwrap();
    assert_eq!(created.load(Ordering::SeqCst), 3);
}
