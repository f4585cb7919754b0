use phone_matcher_registry::RegistryError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// The row source could not be decoded. Fatal to the call.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
}

impl PipelineError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}

impl From<RegistryError> for PipelineError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::StorageUnavailable(msg) => Self::StorageUnavailable(msg),
            RegistryError::ConstraintViolation(msg) => Self::ConstraintViolation(msg),
            RegistryError::InvalidRow(msg) => {
                Self::StorageUnavailable(format!("registry returned an invalid row: {msg}"))
            }
        }
    }
}
