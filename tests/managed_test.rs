//! Integration tests for the lifecycle that defers to an external transaction manager.

mod common;

use common::{MockDataSource, MockSynchronization, dyn_source};
use sql_director::db::{Connection, ConnectionOrigin, Coordinator};
use sql_director::error::DbError;
use sql_director::models::{IsolationLevel, RoutingContext};
use std::sync::Arc;

fn managed_coordinator(
    source: &Arc<MockDataSource>,
    sync: &Arc<MockSynchronization>,
) -> Coordinator {
    Coordinator::builder()
        .fallback(dyn_source(source))
        .isolation_level(IsolationLevel::Serializable)
        .desired_autocommit(false)
        .synchronization(sync.clone())
        .build()
        .unwrap()
}

#[test]
fn test_managed_connection_left_to_manager() {
    let source = MockDataSource::new("r0");
    let sync = MockSynchronization::new();
    sync.bind(&source, true);
    let coordinator = managed_coordinator(&source, &sync);

    let mut conn = coordinator.acquire_default().unwrap();
    assert!(conn.is_externally_managed());
    // No policy applied and no connect through the data source.
    assert!(conn.connection().autocommit().unwrap());
    assert_eq!(source.state().connects, 0);
    assert!(source.state().isolation_changes.is_empty());

    coordinator.begin(&mut conn).unwrap();
    coordinator.commit(&mut conn).unwrap();
    coordinator.rollback(&mut conn).unwrap();
    coordinator.release(&mut conn).unwrap();

    let state = source.state();
    assert!(state.autocommit_changes.is_empty());
    assert_eq!(state.commits, 0);
    assert_eq!(state.rollbacks, 0);
    assert_eq!(state.closes, 0);
    assert_eq!(sync.state().releases, 1);
}

#[test]
fn test_unmanaged_bound_connection_gets_policy() {
    let source = MockDataSource::new("r0");
    let sync = MockSynchronization::new();
    sync.bind(&source, false);
    let coordinator = managed_coordinator(&source, &sync);

    let mut conn = coordinator.acquire_default().unwrap();
    assert!(!conn.is_externally_managed());
    assert_eq!(conn.origin(), ConnectionOrigin::Bound);
    assert!(!conn.connection().autocommit().unwrap());
    assert_eq!(
        conn.connection().isolation_level().unwrap(),
        IsolationLevel::Serializable
    );
    assert_eq!(source.state().connects, 0);

    coordinator.commit(&mut conn).unwrap();
    coordinator.release(&mut conn).unwrap();

    // Boundaries are ours, but the connection goes back to the manager.
    let state = source.state();
    assert_eq!(state.commits, 1);
    assert_eq!(state.closes, 0);
    assert_eq!(state.autocommit_changes, vec![false, true]);
    assert_eq!(sync.state().releases, 1);
}

#[test]
fn test_failed_rollback_hands_bound_connection_back_without_commit() {
    let source = MockDataSource::new("r0");
    let sync = MockSynchronization::new();
    sync.bind(&source, false);
    let coordinator = managed_coordinator(&source, &sync);
    source.state().fail_rollback = true;

    let result: Result<(), DbError> =
        coordinator.with_transaction(&RoutingContext::new(), |_| {
            Err(DbError::persistence("constraint violated", None))
        });

    assert!(result.unwrap_err().to_string().contains("constraint violated"));
    let state = source.state();
    assert_eq!(state.commits, 0);
    assert_eq!(state.closes, 0);
    assert_eq!(state.autocommit_changes, vec![false]);
    assert_eq!(sync.state().releases, 1);
}

#[test]
fn test_no_bound_connection_uses_standard_acquire() {
    let source = MockDataSource::new("r0");
    let other = MockDataSource::new("other");
    let sync = MockSynchronization::new();
    sync.bind(&other, true);
    let coordinator = managed_coordinator(&source, &sync);

    let mut conn = coordinator.acquire_default().unwrap();
    assert_eq!(conn.origin(), ConnectionOrigin::DataSource);
    assert_eq!(source.state().connects, 1);

    coordinator.begin(&mut conn).unwrap();
    coordinator.rollback(&mut conn).unwrap();
    coordinator.release(&mut conn).unwrap();

    let state = source.state();
    assert_eq!(state.rollbacks, 1);
    assert_eq!(state.closes, 1);
}

#[test]
fn test_manager_lookup_failure_is_persistence_error() {
    let source = MockDataSource::new("r0");
    let sync = MockSynchronization::new();
    sync.state().fail_lookup = true;
    let coordinator = managed_coordinator(&source, &sync);

    let err = coordinator.acquire_default().unwrap_err();
    assert!(err.is_persistence());
    assert!(err.to_string().contains("transaction manager unavailable"));
}
