use strata_core::DataError;

/// A non-success response from the search cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchError {
    pub status: u16,
    pub body: String,
}

impl std::fmt::Display for SearchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "search cluster answered {}: {}", self.status, self.body)
    }
}

impl std::error::Error for SearchError {}

/// Extension trait for converting transport errors into `DataError`.
///
/// Due to Rust's orphan rules, we can't implement `From<reqwest::Error> for DataError`
/// in this crate. Instead, use `.into_data_error()` or `.context_error("...")`.
pub trait HttpErrorExt {
    fn into_data_error(self) -> DataError;

    /// Convert and attach the failing operation (`"index into people"`).
    fn context_error(self, context: impl Into<String>) -> DataError
    where
        Self: Sized,
    {
        self.into_data_error().with_context(context)
    }
}

impl HttpErrorExt for reqwest::Error {
    fn into_data_error(self) -> DataError {
        if self.is_timeout() {
            DataError::Timeout
        } else {
            DataError::database(self)
        }
    }
}

impl HttpErrorExt for SearchError {
    fn into_data_error(self) -> DataError {
        if self.status == 404 {
            DataError::NotFound(self.body)
        } else {
            DataError::database(self)
        }
    }
}

/// Convenience alias for data-layer results using `DataError`.
pub type SearchResult<T> = Result<T, DataError>;
