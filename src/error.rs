//! Error types for the MySQL scanner
//!
//! Errors are classified so that the pool and the scan loop know what may be
//! recovered locally:
//! - connection errors are retried a bounded number of times
//! - schema, internal and timeout errors are fatal for the query

use std::fmt;
use thiserror::Error;

/// Result type for scanner operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Connect or validate failure (retriable)
    Connection,
    /// The pool could not be configured or could not hand out a connection
    Configuration,
    /// MySQL rejected a statement
    Query,
    /// Table or columns not found, malformed introspection result
    Schema,
    /// Unsupported type or filter, enum mapping failure
    Internal,
    /// Bind-time metadata round trip exceeded its budget
    Timeout,
    /// The pool has been closed
    PoolClosed,
}

impl ErrorCategory {
    /// Whether errors in this category may be recovered by reconnecting
    #[inline]
    pub const fn is_retriable(self) -> bool {
        matches!(self, Self::Connection)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection => write!(f, "connection"),
            Self::Configuration => write!(f, "configuration"),
            Self::Query => write!(f, "query"),
            Self::Schema => write!(f, "schema"),
            Self::Internal => write!(f, "internal"),
            Self::Timeout => write!(f, "timeout"),
            Self::PoolClosed => write!(f, "pool_closed"),
        }
    }
}

/// Main error type for the scanner
#[derive(Error, Debug)]
pub enum Error {
    /// Connecting to or validating a MySQL connection failed
    #[error("connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Invalid configuration, or no connection after the retry budget
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// MySQL returned an error for a statement
    #[error("query error: {message}")]
    Query { message: String, sql: Option<String> },

    /// Introspection found no columns for the table
    #[error("MySQL table `{schema}`.`{table}` does not contain any columns or does not exist")]
    TableNotFound { schema: String, table: String },

    /// A metadata query returned an unexpected shape
    #[error("malformed result: {message}")]
    MalformedResult { message: String },

    /// Output type the result transformer cannot materialize
    #[error("unsupported type: {type_name}")]
    UnsupportedType { type_name: String },

    /// Filter kind the request transformer cannot translate
    #[error("unsupported table filter: {message}")]
    UnsupportedFilter { message: String },

    /// Fetched enum literal is not part of the bound domain
    #[error("could not map ENUM value {value:?} of column {column}")]
    EnumMapping { column: String, value: String },

    /// Bind-time metadata round trip did not finish in time
    #[error("timeout: {message}")]
    Timeout { message: String },

    /// Acquire on a closed pool
    #[error("connection pool for {endpoint} is closed")]
    PoolClosed { endpoint: String },

    /// Internal invariant violated
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Connection { .. } => ErrorCategory::Connection,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Query { .. } => ErrorCategory::Query,
            Self::TableNotFound { .. } | Self::MalformedResult { .. } => ErrorCategory::Schema,
            Self::UnsupportedType { .. }
            | Self::UnsupportedFilter { .. }
            | Self::EnumMapping { .. }
            | Self::Internal { .. } => ErrorCategory::Internal,
            Self::Timeout { .. } => ErrorCategory::Timeout,
            Self::PoolClosed { .. } => ErrorCategory::PoolClosed,
        }
    }

    /// Whether this error is retriable
    #[inline]
    pub fn is_retriable(&self) -> bool {
        self.category().is_retriable()
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection error with source
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a query error
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
            sql: None,
        }
    }

    /// Attach the offending SQL to a query error; other errors pass through.
    pub fn with_sql(self, sql: impl Into<String>) -> Self {
        match self {
            Self::Query { message, .. } => Self::Query {
                message,
                sql: Some(sql.into()),
            },
            other => other,
        }
    }

    /// Create a malformed result error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResult {
            message: message.into(),
        }
    }

    /// Create an unsupported type error
    pub fn unsupported_type(type_name: impl Into<String>) -> Self {
        Self::UnsupportedType {
            type_name: type_name.into(),
        }
    }

    /// Create an unsupported filter error
    pub fn unsupported_filter(message: impl Into<String>) -> Self {
        Self::UnsupportedFilter {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<mysql::Error> for Error {
    fn from(err: mysql::Error) -> Self {
        match err {
            mysql::Error::IoError(_) | mysql::Error::CodecError(_) | mysql::Error::DriverError(_) => {
                Self::connection_with_source("MySQL connection failure", err)
            }
            mysql::Error::MySqlError(e) => Self::Query {
                message: format!("{} (code {})", e.message, e.code),
                sql: None,
            },
            other => Self::internal(other.to_string()),
        }
    }
}
