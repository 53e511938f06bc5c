//! In-memory connector for testing.
//!
//! Provides a [`MockConnector`] that hands the client one end of a
//! `tokio::io::duplex` pipe on every connect, and delivers the other end to
//! the test as a [`MockDevice`] so the test can play the command station.

use super::error::TransportError;
use super::traits::{Connection, Connector};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{
    AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf,
};
use tokio::sync::mpsc;

/// Size of the in-memory pipe buffer in each direction.
const PIPE_CAPACITY: usize = 8 * 1024;

/// Inner state of the mock connector, shared by its clones.
#[derive(Debug, Default)]
struct MockConnectorState {
    /// Number of upcoming connect attempts that should be refused.
    refuse_next: u32,
    /// Total number of connect attempts seen, successful or not.
    attempts: u32,
}

/// Mock connector implementation for testing.
///
/// # Example
/// ```
/// use excs_client::transport::{Connector, MockConnector};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let (connector, mut acceptor) = MockConnector::new("MOCK0");
/// let _connection = connector.connect().await.unwrap();
///
/// let mut device = acceptor.accept().await.unwrap();
/// device.send("p1").await.unwrap();
/// # }
/// ```
#[derive(Clone)]
pub struct MockConnector {
    name: String,
    state: Arc<Mutex<MockConnectorState>>,
    devices: mpsc::UnboundedSender<MockDevice>,
}

impl MockConnector {
    /// Create a connector and the acceptor that receives device ends.
    pub fn new(name: impl Into<String>) -> (Self, MockDeviceAcceptor) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Self {
            name: name.into(),
            state: Arc::new(Mutex::new(MockConnectorState::default())),
            devices: tx,
        };
        (connector, MockDeviceAcceptor { devices: rx })
    }

    /// Refuse the next `count` connect attempts.
    pub fn refuse_next(&self, count: u32) {
        self.state.lock().refuse_next = count;
    }

    /// Number of connect attempts made so far.
    pub fn attempts(&self) -> u32 {
        self.state.lock().attempts
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self) -> Result<Connection, TransportError> {
        {
            let mut state = self.state.lock();
            state.attempts += 1;
            if state.refuse_next > 0 {
                state.refuse_next -= 1;
                return Err(TransportError::Refused(self.name.clone()));
            }
        }

        let (client_end, device_end) = tokio::io::duplex(PIPE_CAPACITY);
        let (client_rx, client_tx) = tokio::io::split(client_end);
        let (device_rx, device_tx) = tokio::io::split(device_end);

        // If nobody is accepting, the device end drops and the client sees EOF.
        let _ = self.devices.send(MockDevice {
            reader: BufReader::new(device_rx),
            writer: device_tx,
        });

        Ok(Connection::new(Box::new(client_rx), Box::new(client_tx)))
    }

    fn endpoint(&self) -> String {
        self.name.clone()
    }
}

impl std::fmt::Debug for MockConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockConnector")
            .field("name", &self.name)
            .field("attempts", &self.attempts())
            .finish()
    }
}

/// Receives the device side of every connection the mock hands out.
pub struct MockDeviceAcceptor {
    devices: mpsc::UnboundedReceiver<MockDevice>,
}

impl MockDeviceAcceptor {
    /// Wait for the next connection.
    pub async fn accept(&mut self) -> Option<MockDevice> {
        self.devices.recv().await
    }

    /// Wait for the next connection, giving up after `limit`.
    pub async fn accept_within(&mut self, limit: Duration) -> Option<MockDevice> {
        tokio::time::timeout(limit, self.devices.recv())
            .await
            .ok()
            .flatten()
    }
}

/// The command station's end of a mock connection.
pub struct MockDevice {
    reader: BufReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
}

impl MockDevice {
    /// Send a bracket-wrapped message, e.g. `send("p1")` writes `<p1>\n`.
    pub async fn send(&mut self, body: &str) -> std::io::Result<()> {
        self.send_raw(&format!("<{body}>")).await
    }

    /// Send a line verbatim (a newline is appended).
    pub async fn send_raw(&mut self, line: &str) -> std::io::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await
    }

    /// Read the next line written by the client, without its terminator.
    ///
    /// Returns `None` once the client has closed its end.
    pub async fn recv_line(&mut self) -> Option<String> {
        let mut line = String::new();
        match self.reader.read_line(&mut line).await {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
        }
    }

    /// Read the next command body, with the angle brackets removed.
    pub async fn recv_command(&mut self) -> Option<String> {
        let line = self.recv_line().await?;
        Some(
            line.strip_prefix('<')
                .and_then(|l| l.strip_suffix('>'))
                .unwrap_or(&line)
                .to_string(),
        )
    }

    /// Close the device end; the client observes end-of-stream.
    pub async fn close(mut self) {
        let _ = self.writer.shutdown().await;
    }
}

impl std::fmt::Debug for MockDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockDevice").finish_non_exhaustive()
    }
}
