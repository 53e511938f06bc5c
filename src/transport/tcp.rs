//! TCP connector for command stations reachable over WiFi or Ethernet.

use super::error::TransportError;
use super::traits::{Connection, Connector};
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

/// Opens a plain TCP stream to `host:port`.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    host: String,
    port: u16,
    connect_timeout: Duration,
}

impl TcpConnector {
    /// Create a connector for the given endpoint.
    ///
    /// # Example
    /// ```no_run
    /// use excs_client::transport::{Connector, TcpConnector};
    /// use std::time::Duration;
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let connector = TcpConnector::new("192.168.4.1", 2560, Duration::from_secs(5));
    /// let connection = connector.connect().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(host: impl Into<String>, port: u16, connect_timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout,
        }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self) -> Result<Connection, TransportError> {
        if self.host.trim().is_empty() {
            return Err(TransportError::InvalidEndpoint(self.endpoint()));
        }

        let endpoint = self.endpoint();
        debug!("Opening TCP connection to {}", endpoint);

        let stream = tokio::time::timeout(
            self.connect_timeout,
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await
        .map_err(|_| TransportError::timeout(endpoint.clone(), self.connect_timeout))?
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::ConnectionRefused => TransportError::Refused(endpoint.clone()),
            _ => TransportError::Io(e),
        })?;

        // Commands are tiny; don't let Nagle hold them back.
        stream.set_nodelay(true)?;

        let (reader, writer) = stream.into_split();
        Ok(Connection::new(Box::new(reader), Box::new(writer)))
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
