//! Error types for relgraph operations.

use std::fmt;

/// The primary error type for all relgraph operations.
#[derive(Debug)]
pub enum Error {
    /// A caller-supplied argument was rejected (unknown field, null where a value is required,
    /// mixed entity types, placeholder/bind mismatch).
    InvalidArgument(String),
    /// A builder was used out of order (second primary ordering, limit set twice).
    InvalidState(String),
    /// The operation cannot run on this entity in its current state (insert with a key,
    /// update or delete without one, unresolvable related key).
    InvalidOperation(String),
    /// The operation is not defined for the kind of field it was given.
    UnsupportedFieldType(UnsupportedFieldType),
    /// A single-row operation matched more than one row.
    NotUnique(NotUniqueError),
    /// Errors reported by the SQL client while executing a statement
    Query(QueryError),
    /// Stored or supplied value does not convert to the field's scalar kind
    Conversion(ConversionError),
    /// Connection-related errors (open, close)
    Connection(ConnectionError),
    /// Configuration errors
    Config(ConfigError),
}

#[derive(Debug)]
pub struct UnsupportedFieldType {
    pub entity: &'static str,
    pub field: &'static str,
    pub field_kind: &'static str,
    pub operation: &'static str,
}

#[derive(Debug)]
pub struct NotUniqueError {
    pub entity: &'static str,
    pub rows: usize,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Syntax error in SQL
    Syntax,
    /// Constraint violation (unique, foreign key, etc.)
    Constraint,
    /// Table or column not found
    NotFound,
    /// Permission denied
    Permission,
    /// Database busy or locked
    Busy,
    /// Transaction misuse (commit without begin, nested begin)
    Transaction,
    /// Other database error
    Database,
}

#[derive(Debug)]
pub struct ConversionError {
    pub expected: &'static str,
    pub actual: String,
    pub field: Option<String>,
}

#[derive(Debug)]
pub struct ConnectionError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

/// Flattened classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    InvalidState,
    InvalidOperation,
    UnsupportedFieldType,
    NotUnique,
    ConstraintViolation,
    QueryFailed,
    Conversion,
    Connection,
    Config,
}

impl Error {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Error::InvalidArgument(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Error::InvalidState(message.into())
    }

    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Error::InvalidOperation(message.into())
    }

    pub fn unsupported_field(
        entity: &'static str,
        field: &'static str,
        field_kind: &'static str,
        operation: &'static str,
    ) -> Self {
        Error::UnsupportedFieldType(UnsupportedFieldType {
            entity,
            field,
            field_kind,
            operation,
        })
    }

    pub fn not_unique(entity: &'static str, rows: usize) -> Self {
        Error::NotUnique(NotUniqueError { entity, rows })
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::InvalidState(_) => ErrorKind::InvalidState,
            Error::InvalidOperation(_) => ErrorKind::InvalidOperation,
            Error::UnsupportedFieldType(_) => ErrorKind::UnsupportedFieldType,
            Error::NotUnique(_) => ErrorKind::NotUnique,
            Error::Query(q) if q.kind == QueryErrorKind::Constraint => {
                ErrorKind::ConstraintViolation
            }
            Error::Query(_) => ErrorKind::QueryFailed,
            Error::Conversion(_) => ErrorKind::Conversion,
            Error::Connection(_) => ErrorKind::Connection,
            Error::Config(_) => ErrorKind::Config,
        }
    }

    /// Is this a foreign-key or unique constraint failure reported by the client?
    pub fn is_constraint_violation(&self) -> bool {
        self.kind() == ErrorKind::ConstraintViolation
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }
}

impl QueryError {
    pub fn new(kind: QueryErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            sql: None,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Error::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            Error::InvalidOperation(msg) => write!(f, "Invalid operation: {}", msg),
            Error::UnsupportedFieldType(e) => write!(f, "Unsupported field type: {}", e),
            Error::NotUnique(e) => write!(f, "Not unique: {}", e),
            Error::Query(e) => write!(f, "Query error: {}", e),
            Error::Conversion(e) => write!(f, "Conversion error: {}", e),
            Error::Connection(e) => write!(f, "Connection error: {}", e.message),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Connection(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl fmt::Display for UnsupportedFieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} is not supported on {}.{} ({} field)",
            self.operation, self.entity, self.field, self.field_kind
        )
    }
}

impl fmt::Display for NotUniqueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "expected at most one {} row, found {}",
            self.entity, self.rows
        )
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sql) = &self.sql {
            write!(f, "{} (while executing `{}`)", self.message, sql)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(field) = &self.field {
            write!(
                f,
                "expected {} for field '{}', found {}",
                self.expected, field, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<ConversionError> for Error {
    fn from(err: ConversionError) -> Self {
        Error::Conversion(err)
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Config(ConfigError {
            message: err.to_string(),
            source: Some(Box::new(err)),
        })
    }
}

/// Result type alias for relgraph operations.
pub type Result<T> = std::result::Result<T, Error>;
