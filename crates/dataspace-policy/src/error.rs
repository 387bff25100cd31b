use thiserror::Error;

/// Result type for policy parsing and canonicalization.
pub type PolicyResult<T> = Result<T, PolicyError>;

/// Policy-layer errors. None of these are retryable: they describe bad input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    /// A constraint node is missing a required key or mixes groupings.
    #[error("malformed constraint: {0}")]
    MalformedConstraint(String),

    #[error("invalid rule: {0}")]
    InvalidRule(String),

    #[error("invalid policy: {0}")]
    InvalidPolicy(String),

    #[error("invalid catalog: {0}")]
    InvalidCatalog(String),

    #[error("invalid policy hash: {0}")]
    InvalidHash(String),
}
