use dataspace_policy::PolicyError;
use thiserror::Error;

/// Result type for policy store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Policy store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached or failed an I/O operation.
    #[error("policy store unavailable: {0}")]
    Unavailable(String),

    /// The candidate policy could not be canonicalized.
    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// A stored record no longer decodes.
    #[error("corrupt policy record {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

impl StoreError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}
