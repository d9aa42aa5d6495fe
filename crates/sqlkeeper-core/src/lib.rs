//! Core types and traits for SQLKeeper.
//!
//! `sqlkeeper-core` is the **foundation layer** shared by the connection proxy and
//! the transactional decorator.
//!
//! # Role In The Architecture
//!
//! - **Contract layer**: [`Driver`] is the capability a real database client
//!   adapter implements; the retry layers depend on nothing else.
//! - **Failure taxonomy**: [`Error`] plus [`Classifier`] decide whether a caught
//!   error is a transient connection loss, a retryable conflict, or fatal.
//! - **Policy**: [`RetryPolicy`] is the immutable per-component retry configuration,
//!   parsed from the `connection_keeper` parameter section by [`KeeperParams`].
//! - **Data model**: [`Row`] and [`Value`] carry parameters and results through
//!   the proxy untouched.
//!
//! Most applications should use the `sqlkeeper` facade.

pub mod classify;
pub mod config;
pub mod connection;
pub mod error;
pub mod row;
pub mod value;

pub use classify::{CONNECTION_LOSS_PHRASES, Classifier, FailureClass};
pub use config::{KeeperParams, PARAMS_SECTION, RetryPolicy};
pub use connection::{Driver, PreparedStatement};
pub use error::{
    ConfigError, ConnectionError, ConnectionErrorKind, Error, QueryError, QueryErrorKind, Result,
    TransactionError, TransactionErrorKind,
};
pub use row::Row;
pub use value::Value;
