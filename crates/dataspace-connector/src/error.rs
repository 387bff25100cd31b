use std::time::Duration;

use thiserror::Error;

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors talking to the remote connector.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The connector answered with a non-success status.
    #[error("connector returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response did not have the expected shape.
    #[error("unexpected connector response: {0}")]
    Decode(String),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("invalid connector configuration: {0}")]
    InvalidConfig(String),
}

impl GatewayError {
    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::Http { status, .. } => Some(*status),
            GatewayError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
