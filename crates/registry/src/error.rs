use thiserror::Error;

pub type Result<T> = std::result::Result<T, RegistryError>;

#[derive(Error, Debug)]
pub enum RegistryError {
    /// Pool closed, connection could not be opened, or the backend failed
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A uniqueness or check constraint fired outside the no-op conflict path
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// A stored row could not be read back into registry types
    #[error("Invalid stored row: {0}")]
    InvalidRow(String),
}

impl RegistryError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::StorageUnavailable(msg.into())
    }
}

impl From<rusqlite::Error> for RegistryError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, _)
                if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Self::ConstraintViolation(err.to_string())
            }
            _ => Self::StorageUnavailable(err.to_string()),
        }
    }
}
