//! Scripted in-memory driver for unit tests.

use sqlkeeper_core::{
    Driver, Error, PreparedStatement, Result, Row, TransactionErrorKind, Value,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub(crate) fn gone_away() -> Error {
    Error::Custom("SQLSTATE[HY000]: General error: 2006 MySQL server has gone away".to_string())
}

#[derive(Default)]
pub(crate) struct MockState {
    pub connected: bool,
    /// Connections actually established (not counting the initial one).
    pub connects: usize,
    pub closes: usize,
    pub probes: usize,
    pub nesting: u32,
    pub begins: usize,
    pub commits: usize,
    pub rollbacks: usize,
    pub prepares: usize,
    pub queries: Vec<String>,
    pub executed: Vec<(String, Vec<Value>)>,
    pub prepared_runs: Vec<(u64, Vec<Value>)>,
    /// Consumed one per data operation, in order.
    pub failures: VecDeque<Error>,
    /// Consumed one per probe query.
    pub probe_failures: VecDeque<Error>,
    pub connect_failures: VecDeque<Error>,
    pub always_fail: Option<fn() -> Error>,
}

impl MockState {
    fn next_failure(&mut self) -> Option<Error> {
        if let Some(make) = self.always_fail {
            return Some(make());
        }
        self.failures.pop_front()
    }
}

fn end_transaction(s: &mut MockState) -> Result<()> {
    if s.nesting == 0 {
        return Err(Error::transaction(
            TransactionErrorKind::NoActiveTransaction,
            "There is no active transaction",
        ));
    }
    s.nesting -= 1;
    Ok(())
}

#[derive(Clone)]
pub(crate) struct MockDriver {
    state: Arc<Mutex<MockState>>,
}

impl MockDriver {
    /// A driver that starts out connected.
    pub fn new() -> Self {
        let state = MockState {
            connected: true,
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn state(&self) -> Arc<Mutex<MockState>> {
        Arc::clone(&self.state)
    }

    fn op<T>(&self, f: impl FnOnce(&mut MockState) -> T) -> Result<T> {
        let mut s = self.state.lock().expect("lock poisoned");
        if let Some(err) = s.next_failure() {
            return Err(err);
        }
        if !s.connected {
            return Err(Error::disconnected("not connected"));
        }
        Ok(f(&mut s))
    }
}

impl Driver for MockDriver {
    fn connect(&mut self) -> Result<bool> {
        let mut s = self.state.lock().expect("lock poisoned");
        if s.connected {
            return Ok(false);
        }
        if let Some(err) = s.connect_failures.pop_front() {
            return Err(err);
        }
        s.connected = true;
        s.connects += 1;
        Ok(true)
    }

    fn close(&mut self) {
        let mut s = self.state.lock().expect("lock poisoned");
        s.connected = false;
        s.nesting = 0;
        s.closes += 1;
    }

    fn is_connected(&self) -> bool {
        self.state.lock().expect("lock poisoned").connected
    }

    fn query(&mut self, sql: &str, _params: &[Value]) -> Result<Vec<Row>> {
        if sql.contains("'ping_") {
            let mut s = self.state.lock().expect("lock poisoned");
            s.probes += 1;
            if let Some(err) = s.probe_failures.pop_front() {
                return Err(err);
            }
            return Ok(vec![Row::new(vec!["ping".into()], vec![Value::Int(1)])]);
        }
        self.op(|s| {
            s.queries.push(sql.to_string());
            Vec::new()
        })
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        self.op(|s| {
            s.executed.push((sql.to_string(), params.to_vec()));
            1
        })
    }

    fn prepare(&mut self, sql: &str) -> Result<PreparedStatement> {
        let mut s = self.state.lock().expect("lock poisoned");
        s.prepares += 1;
        let params = sql.matches('?').count();
        Ok(PreparedStatement::new(s.prepares as u64, sql.to_string(), params))
    }

    fn query_prepared(&mut self, stmt: &PreparedStatement, params: &[Value]) -> Result<Vec<Row>> {
        self.op(|s| {
            s.prepared_runs.push((stmt.id(), params.to_vec()));
            Vec::new()
        })
    }

    fn execute_prepared(&mut self, stmt: &PreparedStatement, params: &[Value]) -> Result<u64> {
        self.op(|s| {
            s.prepared_runs.push((stmt.id(), params.to_vec()));
            1
        })
    }

    fn begin(&mut self) -> Result<()> {
        self.op(|s| {
            s.begins += 1;
            s.nesting += 1;
        })
    }

    fn commit(&mut self) -> Result<()> {
        let mut s = self.state.lock().expect("lock poisoned");
        s.commits += 1;
        end_transaction(&mut s)
    }

    fn rollback(&mut self) -> Result<()> {
        let mut s = self.state.lock().expect("lock poisoned");
        s.rollbacks += 1;
        end_transaction(&mut s)
    }

    fn transaction_nesting_level(&self) -> u32 {
        self.state.lock().expect("lock poisoned").nesting
    }
}
