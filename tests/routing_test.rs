//! Integration tests for data source resolution.

mod common;

use common::{MockConnection, MockDataSource, dyn_source};
use sql_director::db::{Coordinator, ResourceEntry, ResourceRouter, RoutingStrategy};
use sql_director::models::{ResourceKey, RoutingContext};
use std::collections::HashMap;
use std::sync::Arc;

fn tenant_strategy(tenant: i32, key: &'static str) -> Arc<dyn RoutingStrategy> {
    Arc::new(move |ctx: &RoutingContext<'_>| {
        (ctx.data::<i32>() == Some(&tenant)).then(|| ResourceKey::from_static(key))
    })
}

#[test]
fn test_fallback_only_resolves_to_default() {
    let r0 = MockDataSource::new("r0");
    let coordinator = Coordinator::builder()
        .fallback(dyn_source(&r0))
        .build()
        .unwrap();

    for entry in [
        coordinator.acquire_resource(&RoutingContext::new()).unwrap(),
        coordinator
            .acquire_resource(&RoutingContext::with_data(&"anything"))
            .unwrap(),
        coordinator
            .acquire_resource(&RoutingContext::new().with_sql("SELECT 1"))
            .unwrap(),
    ] {
        assert!(entry.key().is_default());
        assert!(entry.uses(&dyn_source(&r0)));
    }
}

#[test]
fn test_strategy_selects_registered_source() {
    let r0 = MockDataSource::new("r0");
    let r1 = MockDataSource::new("r1");
    let coordinator = Coordinator::builder()
        .fallback(dyn_source(&r0))
        .data_source("db1", dyn_source(&r1))
        .strategy_fn(|ctx| (ctx.data::<i32>() == Some(&1)).then(|| ResourceKey::new("db1")))
        .build()
        .unwrap();

    let mut conn = coordinator.acquire_for(&1_i32).unwrap();
    assert_eq!(conn.key().id(), "db1");
    assert!(conn.entry().uses(&dyn_source(&r1)));
    assert_eq!(conn.downcast_mut::<MockConnection>().unwrap().source, "r1");
    coordinator.release(&mut conn).unwrap();

    let mut conn = coordinator.acquire_for(&2_i32).unwrap();
    assert!(conn.key().is_default());
    assert!(conn.entry().uses(&dyn_source(&r0)));
    assert_eq!(conn.downcast_mut::<MockConnection>().unwrap().source, "r0");
    coordinator.release(&mut conn).unwrap();

    assert_eq!(r1.state().connects, 1);
    assert_eq!(r0.state().connects, 1);
}

#[test]
fn test_unknown_key_falls_back() {
    let r0 = MockDataSource::new("r0");
    let r1 = MockDataSource::new("r1");
    let coordinator = Coordinator::builder()
        .fallback(dyn_source(&r0))
        .data_source("db1", dyn_source(&r1))
        .strategy_fn(|_| Some(ResourceKey::new("archive")))
        .build()
        .unwrap();

    let entry = coordinator.acquire_resource(&RoutingContext::new()).unwrap();
    assert_eq!(entry.key().id(), "archive");
    assert!(entry.uses(&dyn_source(&r0)));
}

#[test]
fn test_first_non_abstaining_strategy_wins() {
    let r0 = MockDataSource::new("r0");
    let coordinator = Coordinator::builder()
        .fallback(dyn_source(&r0))
        .data_source("a", dyn_source(&MockDataSource::new("a")))
        .data_source("b", dyn_source(&MockDataSource::new("b")))
        .strategy_fn(|ctx| ctx.sql().map(|_| ResourceKey::new("a")))
        .strategy_fn(|_| Some(ResourceKey::new("b")))
        .build()
        .unwrap();

    let with_sql = RoutingContext::new().with_sql("SELECT 1");
    for _ in 0..10 {
        assert_eq!(coordinator.acquire_resource(&with_sql).unwrap().key().id(), "a");
    }
    assert_eq!(
        coordinator
            .acquire_resource(&RoutingContext::new())
            .unwrap()
            .key()
            .id(),
        "b"
    );
}

#[test]
fn test_default_strategy_consulted_last() {
    let r0 = MockDataSource::new("r0");
    let coordinator = Coordinator::builder()
        .fallback(dyn_source(&r0))
        .default_strategy_fn(|_| Some(ResourceKey::new("primary")))
        .strategy_fn(|ctx| ctx.param("tenant").map(|_| ResourceKey::new("tenant")))
        .build()
        .unwrap();

    let params: HashMap<String, serde_json::Value> =
        HashMap::from([("tenant".to_string(), serde_json::json!("acme"))]);
    let entry = coordinator
        .acquire_resource(&RoutingContext::new().with_params(&params))
        .unwrap();
    assert_eq!(entry.key().id(), "tenant");

    let entry = coordinator.acquire_resource(&RoutingContext::new()).unwrap();
    assert_eq!(entry.key().id(), "primary");
}

#[test]
fn test_null_registrations_leave_router_unchanged() {
    let r0 = MockDataSource::new("r0");
    let coordinator = Coordinator::builder()
        .fallback(dyn_source(&r0))
        .data_source("db1", dyn_source(&MockDataSource::new("r1")))
        .build()
        .unwrap();
    let router = coordinator.router();
    let keys_before = router.keys();

    router.register_entry(None);
    router.register_strategy(None);

    assert_eq!(router.keys(), keys_before);
    assert_eq!(router.strategy_count(), 0);
    assert!(
        coordinator
            .acquire_resource(&RoutingContext::new())
            .unwrap()
            .key()
            .is_default()
    );
}

#[test]
fn test_runtime_registration_is_visible() {
    let r0 = MockDataSource::new("r0");
    let r2 = MockDataSource::new("r2");
    let coordinator = Coordinator::builder()
        .fallback(dyn_source(&r0))
        .build()
        .unwrap();

    coordinator
        .router()
        .register_entry(ResourceEntry::new("db2", dyn_source(&r2)));
    coordinator.router().register_strategy(tenant_strategy(2, "db2"));

    let entry = coordinator
        .acquire_resource(&RoutingContext::with_data(&2_i32))
        .unwrap();
    assert!(entry.uses(&dyn_source(&r2)));
}

#[test]
fn test_router_without_fallback() {
    let router = ResourceRouter::new(None);
    router.register_entry(ResourceEntry::new(
        "db1",
        dyn_source(&MockDataSource::new("r1")),
    ));
    router.register_strategy(tenant_strategy(1, "db1"));

    assert!(router.resolve(&RoutingContext::with_data(&1_i32)).is_ok());

    let err = router
        .resolve(&RoutingContext::with_data(&2_i32))
        .unwrap_err();
    assert!(err.is_configuration());
    assert!(err.to_string().contains("no fallback"));
}

#[test]
fn test_concurrent_registration_and_resolution() {
    let r0 = MockDataSource::new("r0");
    let router = ResourceRouter::new(Some(dyn_source(&r0)));

    std::thread::scope(|scope| {
        for tenant in 0..4 {
            let router = &router;
            scope.spawn(move || {
                let key: &'static str = ["t0", "t1", "t2", "t3"][tenant as usize];
                router.register_entry(ResourceEntry::new(
                    key,
                    dyn_source(&MockDataSource::new(key)),
                ));
                router.register_strategy(tenant_strategy(tenant, key));
            });
        }
        for _ in 0..4 {
            let router = &router;
            scope.spawn(move || {
                for tenant in 0..4_i32 {
                    // Either not yet registered (fallback) or fully registered.
                    assert!(router.resolve(&RoutingContext::with_data(&tenant)).is_ok());
                }
            });
        }
    });

    assert_eq!(router.len(), 4);
    assert_eq!(router.strategy_count(), 4);
    for tenant in 0..4_i32 {
        let entry = router.resolve(&RoutingContext::with_data(&tenant)).unwrap();
        assert_eq!(entry.key().id(), format!("t{}", tenant));
        assert!(!entry.uses(&dyn_source(&r0)));
    }
}
