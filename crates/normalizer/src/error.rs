use thiserror::Error;

/// Result type for normalizer operations
pub type Result<T> = std::result::Result<T, NormalizerError>;

/// Errors raised while building policies or re-validating stored phones.
///
/// Normalizing a raw field never produces one of these: rejected fields are
/// reported as `None`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizerError {
    /// The policy's length bounds or prefixes are unusable
    #[error("Invalid normalization policy: {0}")]
    InvalidPolicy(String),

    /// A string claimed to be canonical but is not digits-only
    #[error("Not a canonical phone: {0:?}")]
    NotCanonical(String),
}

impl NormalizerError {
    pub fn invalid_policy(msg: impl Into<String>) -> Self {
        Self::InvalidPolicy(msg.into())
    }
}
