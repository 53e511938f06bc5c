//! Transport-specific error types.
//!
//! Kept separate from [`crate::error::ExcsError`] so connector
//! implementations do not depend on the protocol layer.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while establishing a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The endpoint actively refused the connection.
    #[error("Connection refused by {0}")]
    Refused(String),

    /// The endpoint did not answer within the connect timeout.
    #[error("Connecting to {endpoint} timed out after {after:?}")]
    Timeout { endpoint: String, after: Duration },

    /// The host name could not be resolved or was malformed.
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Any other I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Create a Timeout error for an endpoint.
    pub fn timeout(endpoint: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            endpoint: endpoint.into(),
            after,
        }
    }
}
