use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum StorageError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Json conversion(Serde) error: {0}")]
    Serde(String),

    /// The row a read expected does not exist
    #[error("Record not found: {0}")]
    NotFound(String),

    /// A conditional write matched zero rows: another writer already
    /// advanced the state this caller observed
    #[error("No rows affected: {0}")]
    NoRowsAffected(String),

    /// A CHECK constraint rejected the write
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Operation cancelled by caller")]
    Cancelled,
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serde(err.to_string())
    }
}

/// Map a sqlx error into a `StorageError`, keeping CHECK violations apart
/// from every other database failure.
pub(crate) fn map_sqlx_error(context: &str, err: sqlx::Error) -> StorageError {
    if let Some(db_err) = err.as_database_error() {
        if matches!(db_err.kind(), sqlx::error::ErrorKind::CheckViolation) {
            return StorageError::ConstraintViolation(format!("{context}: {db_err}"));
        }
    }
    StorageError::Storage(format!("{context}: {err}"))
}
