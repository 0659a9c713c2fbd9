use strata_core::DataError;

/// Extension trait for converting `sqlx::Error` into `DataError`.
///
/// Due to Rust's orphan rules, we can't implement `From<sqlx::Error> for DataError`
/// in this crate. Instead, use `.into_data_error()` or `.context_error("...")`.
pub trait SqlxErrorExt {
    fn into_data_error(self) -> DataError;

    /// Convert and attach the failing operation (`"insert into person"`).
    fn context_error(self, context: impl Into<String>) -> DataError;
}

impl SqlxErrorExt for sqlx::Error {
    fn into_data_error(self) -> DataError {
        match &self {
            sqlx::Error::RowNotFound => DataError::NotFound("Row not found".into()),
            _ => DataError::database(self),
        }
    }

    fn context_error(self, context: impl Into<String>) -> DataError {
        self.into_data_error().with_context(context)
    }
}

/// Convenience alias for data-layer results using `DataError`.
pub type SqlxResult<T> = Result<T, DataError>;
