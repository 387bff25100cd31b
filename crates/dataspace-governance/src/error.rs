use dataspace_policy::PolicyError;
use dataspace_policy_store::StoreError;
use thiserror::Error;

pub type GovernanceResult<T> = Result<T, GovernanceError>;

/// Governance engine errors.
#[derive(Debug, Error)]
pub enum GovernanceError {
    #[error(transparent)]
    Store(StoreError),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error("invalid governance configuration: {0}")]
    InvalidConfig(String),
}

impl From<StoreError> for GovernanceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Policy(e) => GovernanceError::Policy(e),
            other => GovernanceError::Store(other),
        }
    }
}

impl GovernanceError {
    /// True when the backing store could not answer, as opposed to the
    /// policy being rejected.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, GovernanceError::Store(e) if e.is_unavailable())
    }
}
