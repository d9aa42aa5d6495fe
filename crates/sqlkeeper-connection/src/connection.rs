//! The reconnecting connection proxy.

use crate::executor::{ResilientExecutor, probe_sql};
use crate::statement::Statement;
use sqlkeeper_core::{Driver, Error, PreparedStatement, Result, RetryPolicy, Row, Value};
use std::fmt;

/// Callback invoked with every error the proxy catches.
pub type CatchHook = Box<dyn FnMut(&Error) + Send>;

/// A database connection that reconnects and retries on transient failures.
///
/// Queries, statements and the outermost `begin` are routed through a
/// [`ResilientExecutor`]. `commit` and `rollback` are passed straight to the
/// driver: a transaction boundary that may already have taken effect is
/// never replayed.
///
/// # Example
///
/// ```rust,ignore
/// let policy = RetryPolicy::new(3).refresh_on_exception(true);
/// let mut conn = KeeperConnection::new(MySqlDriver::new(config), policy)?;
/// let rows = conn.query("SELECT id FROM users WHERE active = ?", &[Value::Bool(true)])?;
/// ```
pub struct KeeperConnection<D: Driver> {
    driver: D,
    executor: ResilientExecutor,
    catch_hook: Option<CatchHook>,
    closed_with_open_transaction: bool,
}

impl<D: Driver> fmt::Debug for KeeperConnection<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeeperConnection")
            .field("policy", self.executor.policy())
            .field("catch_hook", &self.catch_hook.is_some())
            .field("closed_with_open_transaction", &self.closed_with_open_transaction)
            .finish_non_exhaustive()
    }
}

impl<D: Driver> KeeperConnection<D> {
    /// Wrap `driver` with the given retry policy.
    pub fn new(driver: D, policy: RetryPolicy) -> Result<Self> {
        Ok(Self {
            driver,
            executor: ResilientExecutor::new(policy)?,
            catch_hook: None,
            closed_with_open_transaction: false,
        })
    }

    /// Wrap `driver`, reading the policy from the `connection_keeper` section
    /// of the connection parameters.
    pub fn from_params(driver: D, params: &serde_json::Value) -> Result<Self> {
        Self::new(driver, RetryPolicy::from_connection_params(params)?)
    }

    pub fn policy(&self) -> &RetryPolicy {
        self.executor.policy()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.executor.policy().attempts()
    }

    /// Install the hook used by every intercepted operation.
    pub fn set_catch_hook(&mut self, hook: impl FnMut(&Error) + Send + 'static) {
        self.catch_hook = Some(Box::new(hook));
    }

    /// Remove the installed hook, returning it.
    pub fn clear_catch_hook(&mut self) -> Option<CatchHook> {
        self.catch_hook.take()
    }

    pub fn has_catch_hook(&self) -> bool {
        self.catch_hook.is_some()
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Direct access to the driver, bypassing retries.
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn into_driver(self) -> D {
        self.driver
    }

    /// Whether the connection was closed while a transaction was open and has
    /// not been explicitly reconnected since.
    pub fn closed_with_open_transaction(&self) -> bool {
        self.closed_with_open_transaction
    }

    /// Run `operation` through the executor using the installed catch hook.
    pub fn handle<T, F>(&mut self, operation: F) -> Result<T>
    where
        F: FnMut(&mut D) -> Result<T>,
    {
        let Self {
            driver,
            executor,
            catch_hook,
            closed_with_open_transaction,
        } = self;
        executor.handle(driver, *closed_with_open_transaction, operation, |e| {
            if let Some(hook) = catch_hook.as_mut() {
                hook(e);
            }
        })
    }

    /// Run `operation` through the executor with a per-call hook instead of
    /// the installed one.
    pub fn handle_with<T, F, H>(&mut self, operation: F, on_caught: H) -> Result<T>
    where
        F: FnMut(&mut D) -> Result<T>,
        H: FnMut(&Error),
    {
        self.executor.handle(
            &mut self.driver,
            self.closed_with_open_transaction,
            operation,
            on_caught,
        )
    }

    /// Open the connection if needed. Clears the closed-with-open-transaction mark.
    pub fn connect(&mut self) -> Result<bool> {
        self.closed_with_open_transaction = false;
        self.driver.connect()
    }

    /// Close the connection. Closing inside a transaction disables retries
    /// until the next explicit [`connect`](Self::connect).
    pub fn close(&mut self) {
        if self.driver.transaction_nesting_level() > 0 {
            tracing::warn!(
                nesting_level = self.driver.transaction_nesting_level(),
                "Connection closed with an open transaction"
            );
            self.closed_with_open_transaction = true;
        }
        self.driver.close();
    }

    pub fn is_connected(&self) -> bool {
        self.driver.is_connected()
    }

    /// Execute a query and return all rows.
    #[tracing::instrument(level = "trace", skip(self, params))]
    pub fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.handle(|d| {
            d.connect()?;
            d.query(sql, params)
        })
    }

    /// Execute a query and return the first row, if any.
    pub fn query_one(&mut self, sql: &str, params: &[Value]) -> Result<Option<Row>> {
        Ok(self.query(sql, params)?.into_iter().next())
    }

    /// Execute a statement and return rows affected.
    #[tracing::instrument(level = "trace", skip(self, params))]
    pub fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        self.handle(|d| {
            d.connect()?;
            d.execute(sql, params)
        })
    }

    /// Prepare a statement whose executions are retried through this connection.
    ///
    /// Preparation itself is not retried; a failure propagates unchanged.
    pub fn prepare(&mut self, sql: &str) -> Result<Statement<'_, D>> {
        self.connect()?;
        let stmt = self.driver.prepare(sql)?;
        Ok(Statement::new(self, stmt))
    }

    /// Re-attach a statement handle previously detached with
    /// [`Statement::into_prepared`].
    pub fn statement(&mut self, stmt: PreparedStatement) -> Statement<'_, D> {
        Statement::new(self, stmt)
    }

    /// Begin a transaction.
    ///
    /// Only the outermost level is retry-eligible: nested levels, and a
    /// connection closed with an open transaction, go straight to the driver.
    pub fn begin(&mut self) -> Result<()> {
        if self.closed_with_open_transaction || self.driver.transaction_nesting_level() != 0 {
            return self.driver.begin();
        }
        self.handle(|d| {
            d.connect()?;
            d.begin()
        })
    }

    pub fn commit(&mut self) -> Result<()> {
        self.driver.commit()
    }

    pub fn rollback(&mut self) -> Result<()> {
        self.driver.rollback()
    }

    pub fn transaction_nesting_level(&self) -> u32 {
        self.driver.transaction_nesting_level()
    }

    pub fn is_transaction_active(&self) -> bool {
        self.driver.is_transaction_active()
    }

    /// Round-trip a trivial query through the executor.
    pub fn refresh(&mut self) -> Result<()> {
        let sql = probe_sql();
        self.query(&sql, &[]).map(|_| ())
    }
}
