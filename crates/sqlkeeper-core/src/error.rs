//! Error types for SQLKeeper operations.

use std::fmt;

/// The primary error type for all SQLKeeper operations.
#[derive(Debug)]
pub enum Error {
    /// Connection-related errors (connect, disconnect, refused)
    Connection(ConnectionError),
    /// Query execution errors
    Query(QueryError),
    /// Transaction errors
    Transaction(TransactionError),
    /// Configuration errors
    Config(ConfigError),
    /// I/O errors
    Io(std::io::Error),
    /// Operation timed out
    Timeout,
    /// Custom error with message
    Custom(String),
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Connection lost during operation
    Disconnected,
    /// Connection refused
    Refused,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub sqlstate: Option<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Syntax error in SQL
    Syntax,
    /// Constraint violation (unique, foreign key, etc.)
    Constraint,
    /// Wrong number of bound parameters
    Parameters,
    /// Deadlock detected
    Deadlock,
    /// Serialization failure (retry may succeed)
    Serialization,
    /// Lock wait or statement timeout
    Timeout,
    /// Other database error
    Database,
}

#[derive(Debug)]
pub struct TransactionError {
    pub kind: TransactionErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionErrorKind {
    /// Commit or rollback without an active transaction
    NoActiveTransaction,
    /// The session was closed and can no longer be used
    SessionClosed,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Is this a retryable error (deadlock, serialization, timeouts)?
    ///
    /// These errors are intrinsic to the operation and may succeed when the
    /// operation is simply attempted again on a valid session. Query errors
    /// are recognised by kind or by SQLSTATE, whichever the driver reports.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Query(q) => {
                q.kind == QueryErrorKind::Timeout
                    || q.is_deadlock()
                    || q.is_serialization_failure()
            }
            Error::Timeout => true,
            _ => false,
        }
    }

    /// Did the session or socket go away underneath the operation?
    pub fn is_disconnect(&self) -> bool {
        match self {
            Error::Connection(c) => c.kind == ConnectionErrorKind::Disconnected,
            Error::Transaction(t) => t.kind == TransactionErrorKind::SessionClosed,
            _ => false,
        }
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }

    /// Shorthand for a lost-connection error carrying the driver's message.
    pub fn disconnected(message: impl Into<String>) -> Self {
        Error::Connection(ConnectionError {
            kind: ConnectionErrorKind::Disconnected,
            message: message.into(),
            source: None,
        })
    }

    /// Shorthand for a query error of the given kind.
    pub fn query(kind: QueryErrorKind, message: impl Into<String>) -> Self {
        Error::Query(QueryError {
            kind,
            sql: None,
            sqlstate: None,
            message: message.into(),
            source: None,
        })
    }

    /// Shorthand for a transaction error of the given kind.
    pub fn transaction(kind: TransactionErrorKind, message: impl Into<String>) -> Self {
        Error::Transaction(TransactionError {
            kind,
            message: message.into(),
        })
    }

    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(ConfigError {
            message: message.into(),
            source: None,
        })
    }
}

impl QueryError {
    /// Is this a deadlock? SQLSTATE 40P01 is PostgreSQL's deadlock code.
    pub fn is_deadlock(&self) -> bool {
        self.kind == QueryErrorKind::Deadlock || self.sqlstate.as_deref() == Some("40P01")
    }

    /// Is this a serialization failure? MySQL also reports deadlocks as 40001.
    pub fn is_serialization_failure(&self) -> bool {
        self.kind == QueryErrorKind::Serialization || self.sqlstate.as_deref() == Some("40001")
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "Connection error: {}", e.message),
            Error::Query(e) => {
                if let Some(sqlstate) = &e.sqlstate {
                    write!(f, "Query error (SQLSTATE {}): {}", sqlstate, e.message)
                } else {
                    write!(f, "Query error: {}", e.message)
                }
            }
            Error::Transaction(e) => write!(f, "Transaction error: {}", e.message),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Timeout => write!(f, "Operation timed out"),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connection(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sqlstate) = &self.sqlstate {
            write!(f, "{} (SQLSTATE {})", self.message, sqlstate)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<TransactionError> for Error {
    fn from(err: TransactionError) -> Self {
        Error::Transaction(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

/// Result type alias for SQLKeeper operations.
pub type Result<T> = std::result::Result<T, Error>;
