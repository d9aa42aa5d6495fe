//! SQLKeeper - keep stateful database connections alive across transient failures.
//!
//! SQLKeeper sits between application code and a database driver and turns
//! "the server went away" from a crash into a reconnect:
//!
//! - **Statement level**: [`KeeperConnection`] runs every query, statement
//!   execution and outermost `begin` through a [`ResilientExecutor`]. A lost
//!   connection is closed, reopened, optionally probed, and the same call is
//!   issued again, up to [`RetryPolicy::attempts`] times.
//! - **Unit-of-work level**: [`RetryingSession`] runs a whole function inside
//!   a transaction and, on a transient failure, rolls back, throws the session
//!   away, obtains a fresh one from a [`SessionRegistry`] and runs the function
//!   again.
//!
//! Nothing is retried while a transaction is open on the connection: replaying
//! one statement of a half-finished transaction on a fresh socket would
//! silently drop the earlier ones.
//!
//! # Quick Start
//!
//! ```ignore
//! use sqlkeeper::prelude::*;
//!
//! let params = serde_json::json!({
//!     "connection_keeper": {
//!         "reconnect_attempts": 3,
//!         "refresh_on_exception": "1",
//!         "handle_retryable_exceptions": true
//!     }
//! });
//! let mut conn = KeeperConnection::from_params(driver, &params)?;
//! conn.set_catch_hook(|e| eprintln!("database error: {e}"));
//!
//! let rows = conn.query("SELECT id FROM jobs WHERE state = ?", &["queued".into()])?;
//! ```
//!
//! # Crates
//!
//! - `sqlkeeper-core`: [`Driver`], [`Error`], [`RetryPolicy`], [`Classifier`]
//! - `sqlkeeper-connection`: [`KeeperConnection`], [`Statement`], [`PrimaryReplicaDriver`]
//! - `sqlkeeper-session`: [`Session`], [`RetryingSession`], [`FactoryRegistry`]

pub use sqlkeeper_core::{
    CONNECTION_LOSS_PHRASES, Classifier, ConfigError, ConnectionError, ConnectionErrorKind, Driver,
    Error, FailureClass, KeeperParams, PARAMS_SECTION, PreparedStatement, QueryError,
    QueryErrorKind, Result, RetryPolicy, Row, TransactionError, TransactionErrorKind, Value,
};

pub use sqlkeeper_connection::{
    AttemptState, CatchHook, KeeperConnection, PrimaryReplicaDriver, ResilientExecutor, Statement,
    Target, probe, probe_sql,
};

pub use sqlkeeper_session::{
    DEFAULT_SESSION_NAME, FactoryRegistry, RetryingSession, Session, SessionRegistry, Sleeper,
};

/// Everything needed to wrap a driver and run retried work.
pub mod prelude {
    pub use crate::{
        Driver, Error, FactoryRegistry, FailureClass, KeeperConnection, KeeperParams,
        PrimaryReplicaDriver, Result, RetryPolicy, RetryingSession, Row, Session, SessionRegistry,
        Statement, Value,
    };
}
