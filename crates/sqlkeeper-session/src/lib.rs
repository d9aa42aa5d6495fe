//! Transactional retry for SQLKeeper.
//!
//! `sqlkeeper-session` is the **unit-of-work layer**. Where
//! `sqlkeeper-connection` retries one statement, this crate retries a whole
//! business function inside a transaction, replacing the session between
//! attempts.
//!
//! # Role In The Architecture
//!
//! - **Session capability**: [`Session`] is the transactional context a unit of
//!   work runs against. [`KeeperConnection`] implements it, so a reconnecting
//!   connection can be used directly.
//! - **Registry**: [`SessionRegistry`] hands out a brand-new session for a
//!   logical name, invalidating the previous one. [`FactoryRegistry`] builds
//!   sessions from a closure.
//! - **Decorator**: [`RetryingSession`] runs `begin → unit of work → flush →
//!   commit` and on a transient failure rolls back, discards the session,
//!   obtains a fresh one and tries again.
//!
//! # Example
//!
//! ```ignore
//! let mut registry = FactoryRegistry::new(|_name| {
//!     KeeperConnection::new(MySqlDriver::new(config.clone()), RetryPolicy::new(2))
//! });
//! let session = registry.session(None)?;
//! let mut tx = RetryingSession::new(session, registry, RetryPolicy::transactional(), None)?;
//!
//! let moved = tx.run_in_transaction(|conn| {
//!     let debit = "UPDATE accounts SET balance = balance - ? WHERE id = ?";
//!     let credit = "UPDATE accounts SET balance = balance + ? WHERE id = ?";
//!     conn.execute(debit, &[amount.into(), from.into()])?;
//!     conn.execute(credit, &[amount.into(), to.into()])
//! })?;
//! ```

pub mod registry;
pub mod retry;

pub use registry::{DEFAULT_SESSION_NAME, FactoryRegistry};
pub use retry::{RetryingSession, Sleeper};

use sqlkeeper_connection::KeeperConnection;
use sqlkeeper_core::{Driver, Result};

/// A transactional context a unit of work runs against.
///
/// Sessions are exclusively owned; once closed they must not be used again.
pub trait Session {
    /// Begin a transaction.
    fn begin(&mut self) -> Result<()>;

    /// Write out pending changes without committing.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Commit the current transaction.
    fn commit(&mut self) -> Result<()>;

    /// Roll back the current transaction.
    fn rollback(&mut self) -> Result<()>;

    /// Close the session and release its connection.
    fn close(&mut self);

    /// Whether the session still holds a live connection.
    fn is_open(&self) -> bool;

    /// Whether a transaction is open on this session.
    fn is_transaction_active(&self) -> bool;
}

/// Hands out fresh sessions by logical name.
pub trait SessionRegistry {
    /// The session type produced.
    type Session: Session;

    /// Build a new session for `name` (or the registry's default name),
    /// invalidating any session previously handed out under it.
    fn reset_session(&mut self, name: Option<&str>) -> Result<Self::Session>;
}

impl<D: Driver> Session for KeeperConnection<D> {
    fn begin(&mut self) -> Result<()> {
        KeeperConnection::begin(self)
    }

    fn commit(&mut self) -> Result<()> {
        KeeperConnection::commit(self)
    }

    fn rollback(&mut self) -> Result<()> {
        KeeperConnection::rollback(self)
    }

    fn close(&mut self) {
        KeeperConnection::close(self);
    }

    fn is_open(&self) -> bool {
        self.is_connected()
    }

    fn is_transaction_active(&self) -> bool {
        KeeperConnection::is_transaction_active(self)
    }
}
