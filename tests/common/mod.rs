//! In-memory data sources and connections that record every call.

#![allow(dead_code)]

use sql_director::db::{Connection, DataSource, ResourceEntry, TransactionSynchronization};
use sql_director::error::DriverResult;
use sql_director::models::IsolationLevel;
use std::any::Any;
use std::sync::{Arc, Mutex, MutexGuard};

/// Calls observed on a mock data source and its connections, plus failure switches.
#[derive(Debug, Default)]
pub struct MockState {
    pub connects: usize,
    pub autocommit_changes: Vec<bool>,
    pub isolation_changes: Vec<IsolationLevel>,
    pub commits: usize,
    pub rollbacks: usize,
    pub closes: usize,

    pub fail_connect: bool,
    pub hand_out_closed: bool,
    pub fail_set_isolation: bool,
    pub fail_set_autocommit: bool,
    pub fail_commit: bool,
    pub fail_rollback: bool,
    pub fail_close: bool,
}

#[derive(Debug)]
pub struct MockDataSource {
    pub name: &'static str,
    state: Arc<Mutex<MockState>>,
}

impl MockDataSource {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            state: Arc::new(Mutex::new(MockState::default())),
        })
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// A connection sharing this data source's call log, not counted as a connect.
    pub fn connection(&self) -> MockConnection {
        MockConnection {
            source: self.name,
            state: Arc::clone(&self.state),
            open: true,
            autocommit: true,
            isolation: IsolationLevel::ReadCommitted,
        }
    }
}

impl DataSource for MockDataSource {
    fn connect(&self) -> DriverResult<Box<dyn Connection>> {
        let mut state = self.state();
        if state.fail_connect {
            return Err("connection refused".into());
        }
        state.connects += 1;
        let open = !state.hand_out_closed;
        drop(state);

        let mut connection = self.connection();
        connection.open = open;
        Ok(Box::new(connection))
    }
}

/// Coerce a mock into the trait object the director stores.
pub fn dyn_source(source: &Arc<MockDataSource>) -> Arc<dyn DataSource> {
    source.clone()
}

#[derive(Debug)]
pub struct MockConnection {
    pub source: &'static str,
    state: Arc<Mutex<MockState>>,
    pub open: bool,
    pub autocommit: bool,
    pub isolation: IsolationLevel,
}

impl MockConnection {
    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }
}

impl Connection for MockConnection {
    fn is_open(&self) -> bool {
        self.open
    }

    fn autocommit(&self) -> DriverResult<bool> {
        Ok(self.autocommit)
    }

    fn set_autocommit(&mut self, autocommit: bool) -> DriverResult<()> {
        let mut state = self.state();
        if state.fail_set_autocommit {
            return Err("cannot change autocommit".into());
        }
        state.autocommit_changes.push(autocommit);
        drop(state);
        self.autocommit = autocommit;
        Ok(())
    }

    fn isolation_level(&self) -> DriverResult<IsolationLevel> {
        Ok(self.isolation)
    }

    fn set_isolation_level(&mut self, level: IsolationLevel) -> DriverResult<()> {
        let mut state = self.state();
        if state.fail_set_isolation {
            return Err("isolation level not supported".into());
        }
        state.isolation_changes.push(level);
        drop(state);
        self.isolation = level;
        Ok(())
    }

    fn commit(&mut self) -> DriverResult<()> {
        let mut state = self.state();
        if state.fail_commit {
            return Err("deadlock detected".into());
        }
        state.commits += 1;
        Ok(())
    }

    fn rollback(&mut self) -> DriverResult<()> {
        let mut state = self.state();
        if state.fail_rollback {
            return Err("connection reset".into());
        }
        state.rollbacks += 1;
        Ok(())
    }

    fn close(&mut self) -> DriverResult<()> {
        let mut state = self.state();
        if state.fail_close {
            return Err("socket error".into());
        }
        state.closes += 1;
        drop(state);
        self.open = false;
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Transaction manager with a bound connection for at most one data source.
#[derive(Debug, Default)]
pub struct MockSynchronization {
    state: Mutex<SyncState>,
}

#[derive(Debug, Default)]
pub struct SyncState {
    /// Data source that has a bound connection, if any.
    pub bound: Option<Arc<MockDataSource>>,
    /// Whether the bound connection is reported as managed.
    pub managed: bool,
    pub releases: usize,
    pub fail_lookup: bool,
}

impl MockSynchronization {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn bind(&self, source: &Arc<MockDataSource>, managed: bool) {
        let mut state = self.state();
        state.bound = Some(Arc::clone(source));
        state.managed = managed;
    }

    pub fn state(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap()
    }
}

impl TransactionSynchronization for MockSynchronization {
    fn managed_connection(
        &self,
        entry: &ResourceEntry,
    ) -> DriverResult<Option<Box<dyn Connection>>> {
        let state = self.state();
        if state.fail_lookup {
            return Err("transaction manager unavailable".into());
        }
        Ok(state
            .bound
            .as_ref()
            .filter(|source| entry.uses(&dyn_source(source)))
            .map(|source| Box::new(source.connection()) as Box<dyn Connection>))
    }

    fn release_managed_connection(
        &self,
        _connection: &mut dyn Connection,
        _entry: &ResourceEntry,
    ) -> DriverResult<()> {
        self.state().releases += 1;
        Ok(())
    }

    fn is_managed(&self, _connection: &dyn Connection, _entry: &ResourceEntry) -> bool {
        self.state().managed
    }
}
