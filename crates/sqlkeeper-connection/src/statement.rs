//! Prepared statements whose executions are retried by their connection.

use crate::connection::KeeperConnection;
use sqlkeeper_core::{Driver, PreparedStatement, Result, Row, Value};

/// A prepared statement bound to the [`KeeperConnection`] that prepared it.
///
/// Each execution is routed through the connection's executor, so a
/// statement-level failure is treated exactly like a direct query. A retry
/// re-runs the same handle with the same parameters; the statement is never
/// re-prepared here.
#[derive(Debug)]
pub struct Statement<'conn, D: Driver> {
    conn: &'conn mut KeeperConnection<D>,
    stmt: PreparedStatement,
}

impl<'conn, D: Driver> Statement<'conn, D> {
    pub(crate) fn new(conn: &'conn mut KeeperConnection<D>, stmt: PreparedStatement) -> Self {
        Self { conn, stmt }
    }

    pub fn sql(&self) -> &str {
        self.stmt.sql()
    }

    pub fn param_count(&self) -> usize {
        self.stmt.param_count()
    }

    pub fn prepared(&self) -> &PreparedStatement {
        &self.stmt
    }

    /// Execute the statement and return rows affected.
    pub fn execute(&mut self, params: &[Value]) -> Result<u64> {
        self.stmt.check_params(params)?;
        let stmt = &self.stmt;
        self.conn.handle(|d| {
            d.connect()?;
            d.execute_prepared(stmt, params)
        })
    }

    /// Execute the statement and return all rows.
    pub fn query(&mut self, params: &[Value]) -> Result<Vec<Row>> {
        self.stmt.check_params(params)?;
        let stmt = &self.stmt;
        self.conn.handle(|d| {
            d.connect()?;
            d.query_prepared(stmt, params)
        })
    }

    /// Release the connection borrow, keeping the driver's handle.
    pub fn into_prepared(self) -> PreparedStatement {
        self.stmt
    }
}
