//! Reconnecting connection proxy for SQLKeeper.
//!
//! `sqlkeeper-connection` is the **statement layer**: every single operation
//! issued against a connection passes through a [`ResilientExecutor`] that
//! classifies failures and decides whether to reconnect and try again.
//!
//! - [`KeeperConnection`] wraps any [`Driver`](sqlkeeper_core::Driver) and
//!   intercepts queries, statements and the outermost `begin`.
//! - [`Statement`] routes prepared-statement executions back through the
//!   owning connection.
//! - [`PrimaryReplicaDriver`] splits reads and writes across a primary and
//!   its replicas and composes with [`KeeperConnection`].
//!
//! # Example
//!
//! ```ignore
//! let policy = RetryPolicy::new(3).refresh_on_exception(true);
//! let mut conn = KeeperConnection::new(driver, policy)?;
//!
//! conn.execute(
//!     "UPDATE jobs SET state = ? WHERE id = ?",
//!     &[Value::from("done"), Value::from(7_i64)],
//! )?;
//!
//! let mut stmt = conn.prepare("INSERT INTO audit (event) VALUES (?)")?;
//! stmt.execute(&[Value::from("job.done")])?;
//! ```

pub mod connection;
pub mod executor;
pub mod primary_replica;
pub mod statement;

#[cfg(test)]
mod testing;

pub use connection::{CatchHook, KeeperConnection};
pub use executor::{AttemptState, ResilientExecutor, probe, probe_sql};
pub use primary_replica::{PrimaryReplicaDriver, Target};
pub use statement::Statement;
