//! Driver capability consumed by the retry layers.
//!
//! This module defines the boundary between SQLKeeper and whatever real
//! database driver is in use:
//!
//! - [`Driver`] - the operations the proxy intercepts, retries or passes through
//! - [`PreparedStatement`] - a handle to a statement prepared by the driver
//!
//! A thin adapter implements [`Driver`] against a concrete client library;
//! nothing in SQLKeeper inherits from or depends on a vendor type.

use crate::error::{Error, QueryErrorKind, Result};
use crate::row::Row;
use crate::value::Value;

/// A prepared statement for repeated execution.
///
/// The handle is opaque to the proxy: it is created by [`Driver::prepare`] and
/// handed back to [`Driver::execute_prepared`] / [`Driver::query_prepared`]
/// verbatim, including on retries.
#[derive(Debug, Clone)]
pub struct PreparedStatement {
    /// Unique identifier for this prepared statement (driver-specific)
    id: u64,
    /// The original SQL text
    sql: String,
    /// Number of expected parameters
    param_count: usize,
}

impl PreparedStatement {
    /// Create a new prepared statement.
    ///
    /// This is typically called by the driver, not by users directly.
    #[must_use]
    pub fn new(id: u64, sql: String, param_count: usize) -> Self {
        Self {
            id,
            sql,
            param_count,
        }
    }

    /// Get the statement ID.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Get the original SQL text.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Get the expected number of parameters.
    #[must_use]
    pub const fn param_count(&self) -> usize {
        self.param_count
    }

    /// Check if the provided parameters match the expected count.
    #[must_use]
    pub fn validate_params(&self, params: &[Value]) -> bool {
        params.len() == self.param_count
    }

    /// Like [`validate_params`](Self::validate_params) but produces the error
    /// returned to callers on mismatch.
    pub fn check_params(&self, params: &[Value]) -> Result<()> {
        if self.validate_params(params) {
            return Ok(());
        }
        Err(Error::Query(crate::error::QueryError {
            kind: QueryErrorKind::Parameters,
            sql: Some(self.sql.clone()),
            sqlstate: None,
            message: format!(
                "statement expects {} parameter(s), got {}",
                self.param_count,
                params.len()
            ),
            source: None,
        }))
    }
}

/// A stateful database connection as seen by the retry layers.
///
/// All operations are synchronous and take `&mut self`: a connection is owned
/// by exactly one caller at a time.
///
/// # Connection lifecycle
///
/// [`connect`](Driver::connect) must be idempotent and return `Ok(false)` when
/// a usable connection is already open. [`close`](Driver::close) must never
/// fail; it drops the socket and resets the transaction nesting level.
pub trait Driver {
    /// Open the connection if it is not already open.
    ///
    /// Returns `true` when a new connection was established.
    fn connect(&mut self) -> Result<bool>;

    /// Close the connection, discarding any server-side state.
    fn close(&mut self);

    /// Whether a connection is currently open.
    fn is_connected(&self) -> bool;

    /// Execute a query and return all rows.
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Execute a statement (INSERT, UPDATE, DELETE) and return rows affected.
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Prepare a statement for repeated execution.
    fn prepare(&mut self, sql: &str) -> Result<PreparedStatement>;

    /// Execute a prepared statement and return all rows.
    fn query_prepared(&mut self, stmt: &PreparedStatement, params: &[Value]) -> Result<Vec<Row>>;

    /// Execute a prepared statement and return rows affected.
    fn execute_prepared(&mut self, stmt: &PreparedStatement, params: &[Value]) -> Result<u64>;

    /// Begin a transaction, or a nested savepoint when one is already open.
    fn begin(&mut self) -> Result<()>;

    /// Commit the innermost transaction level.
    fn commit(&mut self) -> Result<()>;

    /// Roll back the innermost transaction level.
    fn rollback(&mut self) -> Result<()>;

    /// Current transaction nesting depth (0 = no transaction).
    fn transaction_nesting_level(&self) -> u32;

    /// Whether a transaction is currently open.
    fn is_transaction_active(&self) -> bool {
        self.transaction_nesting_level() > 0
    }
}
