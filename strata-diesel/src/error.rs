use strata_core::DataError;

/// Extension trait for converting Diesel and pool errors into `DataError`.
///
/// Due to Rust's orphan rules, we can't implement `From<diesel::result::Error> for DataError`
/// in this crate. Instead, use `.into_data_error()` or `.context_error("...")`.
pub trait DieselErrorExt {
    fn into_data_error(self) -> DataError;

    /// Convert and attach the failing operation (`"update person"`).
    fn context_error(self, context: impl Into<String>) -> DataError
    where
        Self: Sized,
    {
        self.into_data_error().with_context(context)
    }
}

impl DieselErrorExt for diesel::result::Error {
    fn into_data_error(self) -> DataError {
        match &self {
            diesel::result::Error::NotFound => DataError::NotFound("Row not found".into()),
            _ => DataError::database(self),
        }
    }
}

impl DieselErrorExt for diesel::r2d2::PoolError {
    fn into_data_error(self) -> DataError {
        DataError::database(self)
    }
}

impl DieselErrorExt for diesel::ConnectionError {
    fn into_data_error(self) -> DataError {
        DataError::database(self)
    }
}

impl DieselErrorExt for tokio::task::JoinError {
    fn into_data_error(self) -> DataError {
        DataError::Other(format!("blocking database task failed: {self}"))
    }
}

/// Failure inside `Connection::transaction`: either raised by the work
/// itself or by Diesel while beginning or committing.
pub(crate) enum TransactionError {
    Work(DataError),
    Diesel(diesel::result::Error),
}

impl From<diesel::result::Error> for TransactionError {
    fn from(err: diesel::result::Error) -> Self {
        TransactionError::Diesel(err)
    }
}

impl From<DataError> for TransactionError {
    fn from(err: DataError) -> Self {
        TransactionError::Work(err)
    }
}

impl TransactionError {
    pub(crate) fn into_data_error(self) -> DataError {
        match self {
            TransactionError::Work(err) => err,
            TransactionError::Diesel(err) => err.context_error("commit transaction"),
        }
    }
}

/// Convenience alias for data-layer results using `DataError`.
pub type DieselResult<T> = Result<T, DataError>;
