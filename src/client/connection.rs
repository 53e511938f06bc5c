//! Connection supervision.
//!
//! [`ConnectionManager`] owns the transport. Once connected, a supervisor
//! task runs the read loop; when the loop ends for any reason other than an
//! explicit [`ConnectionManager::disconnect`], the supervisor walks the
//! reconnect schedule until the link is back or it is told to stop.
//!
//! ```text
//! Disconnected --connect()--> Connecting --ok--> Connected
//!      ^                          |                  |
//!      +---------- error ---------+                  |
//!      +--- read error / EOF / heartbeat / disconnect() ---+
//! ```

use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::events::ConnectionEvents;
use crate::config::ClientOptions;
use crate::error::{DisconnectCause, ExcsError, ExcsResult};
use crate::protocol::commands::CMD_SYSTEM_INFO;
use crate::protocol::{
    frame_command, unwrap_line, Discard, Frame, ResponseCorrelator, MAX_LINE_LEN,
};
use crate::transport::{BoxedReader, BoxedWriter, Connector, TransportError};

/// Lifecycle state of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// Delay before reconnect attempt `attempt` (1-based): `2^attempt` seconds,
/// capped at `max_backoff`.
pub fn backoff_delay(attempt: u32, max_backoff: Duration) -> Duration {
    let secs = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
    Duration::from_secs(secs).min(max_backoff)
}

#[derive(Debug, Clone, Copy)]
struct Timing {
    connect: Duration,
    response: Duration,
    heartbeat: Duration,
    max_backoff: Duration,
}

/// Write side of the current link.
struct LinkWriter {
    sink: BoxedWriter,
    /// Tells the read loop that a write failed.
    failures: mpsc::UnboundedSender<String>,
}

/// Read side of the current link, owned by the supervisor.
struct LinkReader {
    reader: BufReader<BoxedReader>,
    failures: mpsc::UnboundedReceiver<String>,
}

struct Shared {
    connector: Arc<dyn Connector>,
    endpoint: String,
    timing: Timing,
    state: Mutex<ConnectionState>,
    writer: tokio::sync::Mutex<Option<LinkWriter>>,
    correlator: ResponseCorrelator,
    events: ConnectionEvents,
    retry_attempts: AtomicU32,
    keep_running: AtomicBool,
}

struct Supervisor {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns the link to one command station.
pub struct ConnectionManager {
    shared: Arc<Shared>,
    supervisor: tokio::sync::Mutex<Option<Supervisor>>,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>, options: &ClientOptions) -> Self {
        let endpoint = connector.endpoint();
        Self {
            shared: Arc::new(Shared {
                connector,
                endpoint,
                timing: Timing {
                    connect: options.connect_timeout,
                    response: options.response_timeout,
                    heartbeat: options.heartbeat_timeout,
                    max_backoff: options.max_backoff,
                },
                state: Mutex::new(ConnectionState::Disconnected),
                writer: tokio::sync::Mutex::new(None),
                correlator: ResponseCorrelator::new(),
                events: ConnectionEvents::default(),
                retry_attempts: AtomicU32::new(0),
                keep_running: AtomicBool::new(false),
            }),
            supervisor: tokio::sync::Mutex::new(None),
        }
    }

    /// Establish the link and start the read loop.
    ///
    /// A failed initial connect is reported to the caller and is not
    /// retried. Calling this while connected is a no-op.
    ///
    /// # Errors
    ///
    /// - `ExcsError::Connection` if the transport could not be opened within
    ///   the connect timeout
    pub async fn connect(&self) -> ExcsResult<()> {
        let mut supervisor = self.supervisor.lock().await;
        if self.state() == ConnectionState::Connected {
            debug!("Already connected to {}", self.shared.endpoint);
            return Ok(());
        }

        // A supervisor still walking the reconnect schedule is replaced.
        if let Some(previous) = supervisor.take() {
            previous.token.cancel();
            let _ = previous.handle.await;
        }

        let link = match self.shared.open_link().await {
            Ok(link) => link,
            Err(e) => {
                error!("Failed to connect to {}: {}", self.shared.endpoint, e);
                return Err(e);
            }
        };
        self.shared.keep_running.store(true, Ordering::SeqCst);

        // Subscribers hear about the link before the read loop can drop it.
        self.shared.events.connected.emit(&());

        let token = CancellationToken::new();
        let handle = tokio::spawn(supervise(self.shared.clone(), link, token.clone()));
        *supervisor = Some(Supervisor { token, handle });
        Ok(())
    }

    /// Close the link and stop reconnecting.
    ///
    /// Pending correlated requests fail with `ExcsError::ConnectionClosed`.
    ///
    /// # Errors
    ///
    /// - `ExcsError::Connection` if the supervisor task panicked
    pub async fn disconnect(&self) -> ExcsResult<()> {
        self.shared.keep_running.store(false, Ordering::SeqCst);

        let mut supervisor = self.supervisor.lock().await;
        let Some(active) = supervisor.take() else {
            debug!("disconnect() with no active connection to {}", self.shared.endpoint);
            return Ok(());
        };

        info!("Disconnecting from {}", self.shared.endpoint);
        active.token.cancel();
        active.handle.await.map_err(|e| {
            error!("Connection supervisor for {} failed: {}", self.shared.endpoint, e);
            ExcsError::Connection(format!("connection supervisor failed: {e}"))
        })
    }

    /// Write `<body>\n` and flush.
    ///
    /// # Errors
    ///
    /// - `ExcsError::NotConnected` if the link is not up
    /// - `ExcsError::Connection` if the write fails; the link is then dropped
    pub async fn send_command(&self, body: &str) -> ExcsResult<()> {
        self.shared.send(body).await
    }

    /// Send `body` and wait for the first message starting with
    /// `expected_prefix`.
    ///
    /// # Errors
    ///
    /// - `ExcsError::NotConnected` / `ExcsError::Connection` as for [`Self::send_command`]
    /// - `ExcsError::PrefixCollision` if a pending request could claim the same reply
    /// - `ExcsError::Timeout` if no reply arrived within the response timeout
    /// - `ExcsError::ConnectionLost` / `ExcsError::ConnectionClosed` if the
    ///   link went down while waiting
    /// - `ExcsError::InvalidResponse` if the resolved reply lacks the prefix
    pub async fn send_command_awaiting_response(
        &self,
        body: &str,
        expected_prefix: &str,
    ) -> ExcsResult<String> {
        if self.state() != ConnectionState::Connected {
            return Err(ExcsError::NotConnected);
        }

        let correlator = &self.shared.correlator;
        let mut pending = correlator.register(expected_prefix)?;

        if let Err(e) = self.shared.send(body).await {
            correlator.cancel(&pending);
            return Err(e);
        }

        let response = match pending.wait(self.shared.timing.response).await {
            Ok(response) => response,
            Err(e) => {
                if e.is_timeout() {
                    correlator.cancel(&pending);
                    warn!("No response to <{}> from {}: {}", body, self.shared.endpoint, e);
                }
                return Err(e);
            }
        };

        if !response.starts_with(expected_prefix) {
            error!(
                "Unexpected response from {}: {} (expected prefix '{}')",
                self.shared.endpoint, response, expected_prefix
            );
            return Err(ExcsError::invalid_response(format!(
                "unexpected response '{response}', expected prefix '{expected_prefix}'"
            )));
        }
        Ok(response)
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.lock()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Current reconnect attempt; 0 while connected.
    pub fn retry_attempts(&self) -> u32 {
        self.shared.retry_attempts.load(Ordering::SeqCst)
    }

    /// Correlated requests still waiting for a reply.
    pub fn pending_requests(&self) -> usize {
        self.shared.correlator.pending_count()
    }

    pub fn endpoint(&self) -> &str {
        &self.shared.endpoint
    }

    pub fn events(&self) -> &ConnectionEvents {
        &self.shared.events
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.shared.keep_running.store(false, Ordering::SeqCst);
        if let Some(active) = self.supervisor.get_mut().take() {
            active.token.cancel();
        }
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("endpoint", &self.shared.endpoint)
            .field("state", &self.state())
            .field("retry_attempts", &self.retry_attempts())
            .finish()
    }
}

impl Shared {
    fn set_state(&self, next: ConnectionState) {
        let previous = std::mem::replace(&mut *self.state.lock(), next);
        if previous != next {
            debug!("Connection to {}: {} -> {}", self.endpoint, previous, next);
        }
    }

    /// Open the transport and install its write half.
    async fn open_link(&self) -> ExcsResult<LinkReader> {
        self.set_state(ConnectionState::Connecting);
        info!("Connecting to command station at {}", self.endpoint);

        let opened = match tokio::time::timeout(self.timing.connect, self.connector.connect()).await
        {
            Ok(result) => result.map_err(ExcsError::from),
            Err(_) => Err(TransportError::timeout(self.endpoint.clone(), self.timing.connect).into()),
        };
        let connection = match opened {
            Ok(connection) => connection,
            Err(e) => {
                self.set_state(ConnectionState::Disconnected);
                return Err(e);
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        *self.writer.lock().await = Some(LinkWriter {
            sink: connection.writer,
            failures: tx,
        });
        self.retry_attempts.store(0, Ordering::SeqCst);
        self.set_state(ConnectionState::Connected);
        info!("Connected to command station at {}", self.endpoint);

        Ok(LinkReader {
            reader: BufReader::new(connection.reader),
            failures: rx,
        })
    }

    async fn send(&self, body: &str) -> ExcsResult<()> {
        if *self.state.lock() != ConnectionState::Connected {
            error!("Cannot send <{}>: not connected to {}", body, self.endpoint);
            return Err(ExcsError::NotConnected);
        }

        let mut guard = self.writer.lock().await;
        let link = guard.as_mut().ok_or(ExcsError::NotConnected)?;

        debug!("Sending command: <{}>", body);
        let frame = frame_command(body);
        let written = async {
            link.sink.write_all(frame.as_bytes()).await?;
            link.sink.flush().await
        }
        .await;

        if let Err(e) = written {
            error!("Error sending command to {}: {}", self.endpoint, e);
            // The read loop owns the transition; hand it the cause.
            if let Some(failed) = guard.take() {
                let _ = failed.failures.send(e.to_string());
            }
            return Err(ExcsError::Connection(format!("error sending command: {e}")));
        }
        Ok(())
    }

    /// Read lines until the link ends; returns why it ended.
    async fn read_loop(&self, link: &mut LinkReader, token: &CancellationToken) -> DisconnectCause {
        debug!("Read loop for {} started", self.endpoint);
        let mut buf = Vec::with_capacity(256);
        // Set while skipping the remainder of an overlong line.
        let mut skipping = false;
        loop {
            buf.clear();
            let mut bounded = (&mut link.reader).take(MAX_LINE_LEN as u64);
            let read = tokio::select! {
                biased;
                _ = token.cancelled() => return DisconnectCause::Requested,
                Some(e) = link.failures.recv() => return DisconnectCause::WriteError(e),
                read = tokio::time::timeout(
                    self.timing.heartbeat,
                    bounded.read_until(b'\n', &mut buf),
                ) => read,
            };

            match read {
                Err(_) => return DisconnectCause::HeartbeatTimeout,
                Ok(Err(e)) => return DisconnectCause::ReadError(e.to_string()),
                Ok(Ok(0)) => return DisconnectCause::EndOfStream,
                Ok(Ok(_)) => {
                    let complete = buf.last() == Some(&b'\n');
                    if skipping {
                        skipping = !complete;
                    } else if !complete && buf.len() >= MAX_LINE_LEN {
                        warn!(
                            "Discarding line from {}: {}",
                            self.endpoint,
                            Discard::Overlong(MAX_LINE_LEN)
                        );
                        skipping = true;
                    } else {
                        self.dispatch_line(&buf);
                    }
                }
            }
        }
    }

    fn dispatch_line(&self, raw: &[u8]) {
        let line = String::from_utf8_lossy(raw);
        match unwrap_line(&line) {
            Frame::Message(message) => {
                debug!("Received message: <{}>", message);
                if !self.correlator.try_resolve(&message) {
                    self.events.push.emit(&message);
                }
            }
            Frame::Discard(reason) => {
                warn!("Discarding line from {}: {}", self.endpoint, reason);
            }
        }
    }

    /// Tear down the current link and notify subscribers.
    async fn enter_disconnected(&self, cause: &DisconnectCause) {
        if let Some(mut link) = self.writer.lock().await.take() {
            let _ = link.sink.shutdown().await;
        }
        self.set_state(ConnectionState::Disconnected);

        let error = match cause {
            DisconnectCause::Requested => ExcsError::ConnectionClosed,
            other => ExcsError::ConnectionLost(other.clone()),
        };
        let failed = self.correlator.fail_all(error);

        if cause.is_recoverable() {
            warn!(
                "Lost connection to {}: {} ({} pending request(s) failed)",
                self.endpoint, cause, failed
            );
        } else {
            info!("Disconnected from {} ({} pending request(s) cancelled)", self.endpoint, failed);
        }
        self.events.disconnected.emit(cause);
    }

    /// Retry with exponential backoff until connected or cancelled.
    async fn reconnect(&self, token: &CancellationToken) -> Option<LinkReader> {
        loop {
            let attempt = self.retry_attempts.fetch_add(1, Ordering::SeqCst) + 1;
            let delay = backoff_delay(attempt, self.timing.max_backoff);
            info!(
                "Reconnecting to {} in {:?} (attempt {})",
                self.endpoint, delay, attempt
            );

            tokio::select! {
                biased;
                _ = token.cancelled() => return None,
                _ = tokio::time::sleep(delay) => {}
            }

            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                result = self.open_link() => Some(result),
            };

            match outcome {
                None => {
                    // Cancelled mid-attempt; drop whatever was half installed.
                    self.writer.lock().await.take();
                    self.set_state(ConnectionState::Disconnected);
                    return None;
                }
                Some(Ok(link)) => {
                    info!(
                        "Reconnected to {} after {} attempt(s)",
                        self.endpoint, attempt
                    );
                    return Some(link);
                }
                Some(Err(e)) => {
                    warn!(
                        "Reconnect attempt {} to {} failed: {}",
                        attempt, self.endpoint, e
                    );
                }
            }
        }
    }
}

async fn supervise(shared: Arc<Shared>, mut link: LinkReader, token: CancellationToken) {
    loop {
        let cause = shared.read_loop(&mut link, &token).await;
        shared.enter_disconnected(&cause).await;

        if !cause.is_recoverable() || !shared.keep_running.load(Ordering::SeqCst) {
            break;
        }

        match shared.reconnect(&token).await {
            Some(next) => {
                link = next;
                shared.events.connected.emit(&());
                // Refresh dependent state; the reply arrives as a push.
                if let Err(e) = shared.send(CMD_SYSTEM_INFO).await {
                    warn!("Failed to request system info after reconnect: {}", e);
                }
            }
            None => break,
        }
    }
    debug!("Connection supervisor for {} stopped", shared.endpoint);
}
