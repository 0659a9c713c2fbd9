use strata_core::DataError;

/// Extension trait for converting `mongodb::error::Error` into `DataError`.
///
/// Due to Rust's orphan rules, we can't implement `From<mongodb::error::Error> for DataError`
/// in this crate. Instead, use `.into_data_error()` or `.context_error("...")`.
pub trait MongoErrorExt {
    fn into_data_error(self) -> DataError;

    /// Convert and attach the failing operation (`"insert into person"`).
    fn context_error(self, context: impl Into<String>) -> DataError;
}

impl MongoErrorExt for mongodb::error::Error {
    fn into_data_error(self) -> DataError {
        DataError::database(self)
    }

    fn context_error(self, context: impl Into<String>) -> DataError {
        self.into_data_error().with_context(context)
    }
}

/// Convenience alias for data-layer results using `DataError`.
pub type MongoResult<T> = Result<T, DataError>;
