use crate::config::ConfigError;
use crate::value::ValueKind;

/// Boxed driver error carried by [`DataError::Database`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur in the data layer.
///
/// Policy and shape failures (`UpdateFullNotAllowed`, `QueryArgs`,
/// `Decode`, ...) are raised before any backend is contacted. Driver
/// failures arrive as `Database` and carry the operation that failed.
#[derive(Debug)]
pub enum DataError {
    NotFound(String),
    /// A driver or transport error, with the operation it occurred in
    /// (e.g. `"insert into person"`).
    Database {
        context: Option<String>,
        source: BoxError,
    },
    /// The entity type could not be mapped to a table.
    Metadata(String),
    /// A value read from the backend did not fit the destination field.
    Decode {
        column: String,
        expected: ValueKind,
    },
    /// A statement could not be generated (bad identifier, empty SET list...).
    Grammar(String),
    /// `exec` was called with malformed arguments.
    QueryArgs(String),
    /// `exec` was called with an empty statement or pipeline.
    EmptyStatement,
    /// Update with neither a filter nor a primary key value.
    UpdateFullNotAllowed,
    /// Delete with neither a filter nor a primary key value.
    DeleteFullNotAllowed,
    /// A command was queued on, or a commit requested from, a unit of work
    /// that already committed.
    UnitOfWorkClosed,
    /// No resource is registered for the requested backend kind or alias.
    NotConfigured(String),
    /// One member of a composite unit of work failed to commit.
    Commit {
        backend: String,
        source: Box<DataError>,
    },
    Config(ConfigError),
    Cancelled,
    Timeout,
    Other(String),
}

impl DataError {
    /// Construct a `Database` variant from any error type.
    ///
    /// Used by backend crates (`strata-sqlx`, `strata-diesel`, ...) to wrap
    /// driver-specific errors.
    pub fn database(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        DataError::Database {
            context: None,
            source: Box::new(err),
        }
    }

    pub fn decode(column: impl Into<String>, expected: ValueKind) -> Self {
        DataError::Decode {
            column: column.into(),
            expected,
        }
    }

    /// Attach the failing operation to a `Database` error. Other variants
    /// are returned unchanged.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        match self {
            DataError::Database { source, .. } => DataError::Database {
                context: Some(context.into()),
                source,
            },
            other => other,
        }
    }
}

impl std::fmt::Display for DataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataError::NotFound(msg) => write!(f, "Not found: {msg}"),
            DataError::Database {
                context: Some(ctx),
                source,
            } => write!(f, "Database error during {ctx}: {source}"),
            DataError::Database {
                context: None,
                source,
            } => write!(f, "Database error: {source}"),
            DataError::Metadata(msg) => write!(f, "Metadata error: {msg}"),
            DataError::Decode { column, expected } => {
                write!(f, "Cannot decode column '{column}': expected {expected}")
            }
            DataError::Grammar(msg) => write!(f, "Grammar error: {msg}"),
            DataError::QueryArgs(msg) => write!(f, "Invalid query arguments: {msg}"),
            DataError::EmptyStatement => write!(f, "Query statement is empty"),
            DataError::UpdateFullNotAllowed => {
                write!(f, "Update without filter or primary key is not allowed")
            }
            DataError::DeleteFullNotAllowed => {
                write!(f, "Delete without filter or primary key is not allowed")
            }
            DataError::UnitOfWorkClosed => write!(f, "Unit of work is already committed"),
            DataError::NotConfigured(what) => write!(f, "Resource not configured: {what}"),
            DataError::Commit { backend, source } => {
                write!(f, "[{backend}] database transaction failed: {source}")
            }
            DataError::Config(err) => write!(f, "{err}"),
            DataError::Cancelled => write!(f, "Operation cancelled"),
            DataError::Timeout => write!(f, "Operation timed out"),
            DataError::Other(msg) => write!(f, "Data error: {msg}"),
        }
    }
}

impl std::error::Error for DataError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DataError::Database { source, .. } => Some(source.as_ref()),
            DataError::Commit { source, .. } => Some(source.as_ref()),
            DataError::Config(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ConfigError> for DataError {
    fn from(err: ConfigError) -> Self {
        DataError::Config(err)
    }
}
