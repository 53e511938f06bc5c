//! Core traits for transport abstraction.
//!
//! Defines the [`Connector`] trait that allows both a real TCP link and the
//! in-memory mock to be used interchangeably by the connection manager.

use super::error::TransportError;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

/// Read half of an established transport.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Write half of an established transport.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// An established, split byte stream to the command station.
pub struct Connection {
    /// Inbound bytes, consumed exclusively by the read loop.
    pub reader: BoxedReader,
    /// Outbound bytes, shared by all command senders behind a lock.
    pub writer: BoxedWriter,
}

impl Connection {
    /// Bundle two halves into a connection.
    pub fn new(reader: BoxedReader, writer: BoxedWriter) -> Self {
        Self { reader, writer }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

/// Factory for transports to a single command station endpoint.
///
/// `connect` is called once for the initial connection and again for every
/// reconnect attempt; implementations must not cache a previous stream.
#[async_trait]
pub trait Connector: Send + Sync + std::fmt::Debug {
    /// Open a new connection.
    async fn connect(&self) -> Result<Connection, TransportError>;

    /// Human-readable endpoint, used in log lines.
    fn endpoint(&self) -> String;
}
