//! Unified error handling for the command station client.
//!
//! Every fallible public operation returns [`ExcsResult`]. Connection-level
//! failures, response-wait timeouts and parse failures are kept in separate
//! variants so callers can tell "device silent" apart from "link down".

use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::transport::TransportError;

/// A specialized `Result` type for client operations.
pub type ExcsResult<T> = Result<T, ExcsError>;

/// Why a live connection transitioned to `Disconnected`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectCause {
    /// `disconnect()` was called by the owner of the client.
    Requested,
    /// No line arrived within the heartbeat interval.
    HeartbeatTimeout,
    /// The device closed the stream.
    EndOfStream,
    /// Reading from the socket failed.
    ReadError(String),
    /// Writing a command to the socket failed.
    WriteError(String),
}

impl DisconnectCause {
    /// Whether the connection manager should try to re-establish the link.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Requested)
    }
}

impl fmt::Display for DisconnectCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => write!(f, "disconnect requested"),
            Self::HeartbeatTimeout => write!(f, "no data received within heartbeat interval"),
            Self::EndOfStream => write!(f, "connection closed by command station"),
            Self::ReadError(e) => write!(f, "read error: {e}"),
            Self::WriteError(e) => write!(f, "write error: {e}"),
        }
    }
}

/// Errors surfaced by the client to its callers.
#[derive(Debug, Clone, Error)]
pub enum ExcsError {
    /// Establishing the transport failed.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The link dropped while the operation was in flight.
    #[error("Connection lost: {0}")]
    ConnectionLost(DisconnectCause),

    /// The client was explicitly disconnected while the operation was in flight.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The operation requires a live connection.
    #[error("Not connected to the command station")]
    NotConnected,

    /// No reply with the expected prefix arrived in time.
    #[error("Timed out after {after:?} waiting for a response starting with '{prefix}'")]
    Timeout { prefix: String, after: Duration },

    /// A reply did not match the expected grammar.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The firmware version is missing or below the supported minimum.
    #[error("Unsupported version: {0}")]
    Version(String),

    /// A field held a value outside its domain (id mismatch, unknown state).
    #[error("Invalid value: {0}")]
    Value(String),

    /// A command was built from out-of-range arguments.
    #[error("Invalid argument: {0}")]
    Argument(String),

    /// A correlated request was issued while another live request could
    /// claim the same reply.
    #[error("Response prefix '{requested}' collides with pending prefix '{pending}'")]
    PrefixCollision { requested: String, pending: String },
}

impl ExcsError {
    /// Create an InvalidResponse error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse(message.into())
    }

    /// Create a Value error.
    pub fn value(message: impl Into<String>) -> Self {
        Self::Value(message.into())
    }

    /// Create an Argument error.
    pub fn argument(message: impl Into<String>) -> Self {
        Self::Argument(message.into())
    }

    /// True for every variant that means the link itself is unusable.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::ConnectionLost(_) | Self::ConnectionClosed | Self::NotConnected
        )
    }

    /// True when the device stayed silent past the response timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<TransportError> for ExcsError {
    fn from(err: TransportError) -> Self {
        ExcsError::Connection(err.to_string())
    }
}
