//! An in-memory "MySQL" server with fault injection.
//!
//! `FakeServer` holds one committed key/value table and at most one live
//! server-side session. `FakeMySql` is a driver talking to it. Faults queued
//! on the server fire on the next statement any driver sends.

#![allow(dead_code)]

use sqlkeeper::{
    ConnectionError, ConnectionErrorKind, Driver, Error, PreparedStatement, QueryErrorKind, Result,
    Row, TransactionErrorKind, Value,
};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

pub const GONE_AWAY: &str = "SQLSTATE[HY000]: General error: 2006 MySQL server has gone away";
pub const LOST_CONNECTION: &str =
    "SQLSTATE[HY000]: General error: 2013 Lost connection to MySQL server during query";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Let the statement through.
    Pass,
    /// Drop the session; the statement fails with "gone away".
    GoneAway,
    /// Drop the session; the statement fails with "lost connection".
    LostConnection,
    /// Fail the statement with a deadlock and abort the open transaction.
    Deadlock,
    /// Fail the statement with a syntax error.
    Syntax,
}

#[derive(Debug, Default)]
pub struct ServerState {
    pub table: BTreeMap<String, i64>,
    pub sessions_opened: u64,
    pub live_session: Option<u64>,
    pub faults: VecDeque<Fault>,
    pub refuse_connects: usize,
    pub statements: Vec<String>,
    pub probes: usize,
}

#[derive(Debug, Clone, Default)]
pub struct FakeServer {
    state: Arc<Mutex<ServerState>>,
}

impl FakeServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_row(self, key: &str, value: i64) -> Self {
        self.state.lock().unwrap().table.insert(key.to_string(), value);
        self
    }

    pub fn inject(&self, faults: &[Fault]) {
        self.state.lock().unwrap().faults.extend(faults.iter().copied());
    }

    pub fn refuse_next_connects(&self, count: usize) {
        self.state.lock().unwrap().refuse_connects = count;
    }

    /// Kill the live session without failing any statement.
    pub fn kill_session(&self) {
        self.state.lock().unwrap().live_session = None;
    }

    pub fn value(&self, key: &str) -> Option<i64> {
        self.state.lock().unwrap().table.get(key).copied()
    }

    pub fn sessions_opened(&self) -> u64 {
        self.state.lock().unwrap().sessions_opened
    }

    pub fn probes(&self) -> usize {
        self.state.lock().unwrap().probes
    }

    pub fn statements(&self) -> Vec<String> {
        self.state.lock().unwrap().statements.clone()
    }

    pub fn driver(&self) -> FakeMySql {
        FakeMySql {
            server: self.clone(),
            session: None,
            nesting: 0,
            pending: BTreeMap::new(),
            prepared: Vec::new(),
        }
    }
}

/// A driver bound to a [`FakeServer`]. Starts disconnected.
#[derive(Debug)]
pub struct FakeMySql {
    server: FakeServer,
    session: Option<u64>,
    nesting: u32,
    pending: BTreeMap<String, i64>,
    prepared: Vec<String>,
}

// Inside a transaction writes stay pending until commit.
fn write(
    table: &mut BTreeMap<String, i64>,
    pending: &mut BTreeMap<String, i64>,
    nesting: u32,
    key: String,
    value: i64,
) {
    if nesting > 0 {
        pending.insert(key, value);
    } else {
        table.insert(key, value);
    }
}

fn gone(message: &str) -> Error {
    Error::Custom(message.to_string())
}

fn no_transaction() -> Error {
    Error::transaction(
        TransactionErrorKind::NoActiveTransaction,
        "There is no active transaction",
    )
}

impl FakeMySql {
    pub fn session_id(&self) -> Option<u64> {
        self.session
    }

    fn run(&mut self, sql: &str, params: &[Value]) -> Result<(Vec<Row>, u64)> {
        let mut server = self.server.state.lock().unwrap();
        if self.session.is_none() {
            return Err(Error::disconnected("not connected"));
        }
        if server.live_session != self.session {
            return Err(gone(GONE_AWAY));
        }

        if sql.starts_with("SELECT 'ping_") {
            server.probes += 1;
            return Ok((vec![Row::new(vec!["ping".into()], vec![Value::from(1_i64)])], 0));
        }

        server.statements.push(sql.to_string());
        if let Some(fault) = server.faults.pop_front() {
            match fault {
                Fault::Pass => {}
                Fault::GoneAway | Fault::LostConnection => {
                    server.live_session = None;
                    self.pending.clear();
                    return Err(gone(if fault == Fault::GoneAway {
                        GONE_AWAY
                    } else {
                        LOST_CONNECTION
                    }));
                }
                Fault::Deadlock => {
                    self.pending.clear();
                    return Err(Error::query(
                        QueryErrorKind::Deadlock,
                        "Deadlock found when trying to get lock; try restarting transaction",
                    ));
                }
                Fault::Syntax => {
                    return Err(Error::query(
                        QueryErrorKind::Syntax,
                        "You have an error in your SQL syntax",
                    ));
                }
            }
        }

        if sql == "COMMIT" {
            return Ok((Vec::new(), 0));
        }

        let key_at = |i: usize| -> Result<String> {
            params
                .get(i)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| Error::query(QueryErrorKind::Parameters, "missing key parameter"))
        };
        let int_at = |i: usize| -> Result<i64> {
            params
                .get(i)
                .and_then(Value::as_i64)
                .ok_or_else(|| {
                    Error::query(QueryErrorKind::Parameters, "missing integer parameter")
                })
        };

        if sql.starts_with("SELECT v FROM kv WHERE k = ?") {
            let key = key_at(0)?;
            let value = self.pending.get(&key).or_else(|| server.table.get(&key)).copied();
            let rows = value
                .map(|v| Row::new(vec!["v".into()], vec![Value::BigInt(v)]))
                .into_iter()
                .collect();
            return Ok((rows, 0));
        }
        if sql.starts_with("INSERT INTO kv (k, v) VALUES (?, ?)") {
            let (key, value) = (key_at(0)?, int_at(1)?);
            write(&mut server.table, &mut self.pending, self.nesting, key, value);
            return Ok((Vec::new(), 1));
        }
        if sql.starts_with("UPDATE kv SET v = v + ? WHERE k = ?") {
            let (delta, key) = (int_at(0)?, key_at(1)?);
            let current = self.pending.get(&key).or_else(|| server.table.get(&key)).copied();
            let Some(current) = current else {
                return Ok((Vec::new(), 0));
            };
            write(&mut server.table, &mut self.pending, self.nesting, key, current + delta);
            return Ok((Vec::new(), 1));
        }
        Err(Error::query(QueryErrorKind::Syntax, format!("unsupported statement: {sql}")))
    }

    fn require_live(&self) -> Result<()> {
        let server = self.server.state.lock().unwrap();
        if self.session.is_none() {
            return Err(Error::disconnected("not connected"));
        }
        if server.live_session != self.session {
            return Err(gone(GONE_AWAY));
        }
        Ok(())
    }
}

impl Driver for FakeMySql {
    fn connect(&mut self) -> Result<bool> {
        if self.session.is_some() {
            return Ok(false);
        }
        let mut server = self.server.state.lock().unwrap();
        if server.refuse_connects > 0 {
            server.refuse_connects -= 1;
            return Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Refused,
                message: "Connection refused".to_string(),
                source: None,
            }));
        }
        server.sessions_opened += 1;
        let id = server.sessions_opened;
        server.live_session = Some(id);
        self.session = Some(id);
        Ok(true)
    }

    fn close(&mut self) {
        let mut server = self.server.state.lock().unwrap();
        if server.live_session == self.session {
            server.live_session = None;
        }
        self.session = None;
        self.nesting = 0;
        self.pending.clear();
        self.prepared.clear();
    }

    fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.run(sql, params).map(|(rows, _)| rows)
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        self.run(sql, params).map(|(_, affected)| affected)
    }

    fn prepare(&mut self, sql: &str) -> Result<PreparedStatement> {
        self.require_live()?;
        self.prepared.push(sql.to_string());
        let params = sql.matches('?').count();
        Ok(PreparedStatement::new(self.prepared.len() as u64, sql.to_string(), params))
    }

    fn query_prepared(&mut self, stmt: &PreparedStatement, params: &[Value]) -> Result<Vec<Row>> {
        self.run(stmt.sql(), params).map(|(rows, _)| rows)
    }

    fn execute_prepared(&mut self, stmt: &PreparedStatement, params: &[Value]) -> Result<u64> {
        self.run(stmt.sql(), params).map(|(_, affected)| affected)
    }

    fn begin(&mut self) -> Result<()> {
        self.require_live()?;
        self.nesting += 1;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        if self.nesting == 0 {
            return Err(no_transaction());
        }
        self.run("COMMIT", &[])?;
        self.nesting -= 1;
        if self.nesting == 0 {
            let pending = std::mem::take(&mut self.pending);
            self.server.state.lock().unwrap().table.extend(pending);
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        if self.nesting == 0 {
            return Err(no_transaction());
        }
        self.nesting -= 1;
        if self.nesting == 0 {
            self.pending.clear();
        }
        self.require_live()
    }

    fn transaction_nesting_level(&self) -> u32 {
        self.nesting
    }
}

pub fn read(rows: &[Row]) -> Option<i64> {
    rows.first().and_then(|r| r.get_by_name("v")).and_then(Value::as_i64)
}
