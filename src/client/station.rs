//! The command station client.
//!
//! Composes the connection manager with the domain model: it runs the
//! setup sequences, keeps the live turnout/roster/power state current from
//! push messages, and hands collaborators snapshots only.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracing::{debug, info, trace, warn};

use super::connection::{ConnectionManager, ConnectionState};
use super::events::Subscription;
use crate::config::ClientOptions;
use crate::error::{DisconnectCause, ExcsResult};
use crate::model::{
    validate_version, Direction, PushTarget, RosterEntry, SystemInfo, TrackPower,
    TrackPowerState, Turnout, TurnoutState,
};
use crate::protocol::commands::{self, RESP_SYSTEM_INFO_PREFIX};
use crate::transport::{Connector, TcpConnector};

/// Live state owned by the client.
#[derive(Debug, Default)]
struct StationState {
    system_info: Mutex<Option<SystemInfo>>,
    turnouts: Mutex<Vec<Turnout>>,
    roster: Mutex<Vec<RosterEntry>>,
    power: Mutex<TrackPowerState>,
}

impl StationState {
    fn apply_push(&self, message: &str) {
        match message.as_bytes().first() {
            Some(b'H') => apply_first(&mut self.turnouts.lock(), message, "turnout"),
            Some(b'l') => apply_first(&mut self.roster.lock(), message, "locomotive"),
            Some(b'p') => match self.power.lock().apply_push(message) {
                Ok(true) => debug!("Track power updated: {}", message),
                Ok(false) => {}
                Err(e) => warn!("Ignoring power message: {}", e),
            },
            Some(b'i') if message.starts_with(RESP_SYSTEM_INFO_PREFIX) => {
                match SystemInfo::parse(message) {
                    Ok(info) => {
                        info!(
                            "Command station reported version {} ({})",
                            info.version, info.processor_type
                        );
                        *self.system_info.lock() = Some(info);
                    }
                    Err(e) => warn!("Ignoring system info push: {}", e),
                }
            }
            _ => trace!("Push not tracked by client: {}", message),
        }
    }

    fn cabs(&self) -> Vec<u16> {
        self.roster.lock().iter().map(|loco| loco.id).collect()
    }
}

/// Offer `message` to each target until one takes it.
fn apply_first<T: PushTarget>(targets: &mut [T], message: &str, kind: &str) {
    for target in targets.iter_mut() {
        match target.apply_push(message) {
            Ok(true) => {
                debug!("Applied {} update: {}", kind, message);
                return;
            }
            Ok(false) => {}
            Err(e) => {
                warn!("Error parsing {} update: {}", kind, e);
                return;
            }
        }
    }
}

/// Client for one EX-CommandStation.
///
/// # Example
/// ```no_run
/// use excs_client::{ClientOptions, CommandStationClient};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = CommandStationClient::new(ClientOptions::new("192.168.4.1"));
/// client.setup().await?;
/// for turnout in client.turnouts() {
///     println!("{}: {}", turnout.description, turnout.state);
/// }
/// client.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct CommandStationClient {
    options: ClientOptions,
    connection: Arc<ConnectionManager>,
    state: Arc<StationState>,
    _wiring: Vec<Subscription>,
}

impl CommandStationClient {
    /// Client for a command station reachable over TCP.
    pub fn new(options: ClientOptions) -> Self {
        let connector = TcpConnector::new(options.host.clone(), options.port, options.connect_timeout);
        Self::with_connector(options, Arc::new(connector))
    }

    /// Client over any transport.
    pub fn with_connector(options: ClientOptions, connector: Arc<dyn Connector>) -> Self {
        let connection = Arc::new(ConnectionManager::new(connector, &options));
        let state = Arc::new(StationState::default());
        debug!("Command station client created for {}", connection.endpoint());

        let push_state = state.clone();
        let on_push = connection
            .events()
            .push
            .subscribe(move |message: &String| push_state.apply_push(message));

        let weak: Weak<ConnectionManager> = Arc::downgrade(&connection);
        let refresh_state = state.clone();
        let on_connect = connection.events().connected.subscribe(move |_| {
            let Some(connection) = weak.upgrade() else {
                return;
            };
            let cabs = refresh_state.cabs();
            if cabs.is_empty() {
                return;
            }
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    runtime.spawn(async move { request_loco_states(&connection, &cabs).await });
                }
                Err(_) => warn!("No runtime available to refresh locomotive state"),
            }
        });

        Self {
            options,
            connection,
            state,
            _wiring: vec![on_push, on_connect],
        }
    }

    /// Open the connection.
    ///
    /// # Errors
    ///
    /// - `ExcsError::Connection` if the station is unreachable
    pub async fn connect(&self) -> ExcsResult<()> {
        self.connection.connect().await
    }

    /// Close the connection and stop reconnecting.
    ///
    /// # Errors
    ///
    /// - `ExcsError::Connection` if the connection task failed
    pub async fn disconnect(&self) -> ExcsResult<()> {
        self.connection.disconnect().await
    }

    /// Connect if needed, then load system info, check the firmware
    /// version and load turnouts and roster.
    ///
    /// # Errors
    ///
    /// Any error from the individual steps; nothing is retried.
    pub async fn setup(&self) -> ExcsResult<()> {
        debug!("Setting up command station client");
        if !self.connection.is_connected() {
            self.connect().await?;
        }

        self.fetch_system_info().await?;
        self.validate_version()?;
        self.fetch_turnouts().await?;
        self.fetch_roster_entries().await?;
        Ok(())
    }

    /// Disconnect, logging instead of returning any error.
    pub async fn shutdown(&self) {
        debug!("Shutting down command station client");
        if let Err(e) = self.disconnect().await {
            warn!("Error during shutdown of command station client: {}", e);
        }
    }

    /// Fire-and-forget command.
    ///
    /// # Errors
    ///
    /// - `ExcsError::NotConnected` or `ExcsError::Connection`
    pub async fn send_command(&self, body: &str) -> ExcsResult<()> {
        self.connection.send_command(body).await
    }

    /// Send a command and wait for the reply starting with `expected_prefix`.
    ///
    /// # Errors
    ///
    /// See [`ConnectionManager::send_command_awaiting_response`].
    pub async fn send_command_awaiting_response(
        &self,
        body: &str,
        expected_prefix: &str,
    ) -> ExcsResult<String> {
        self.connection
            .send_command_awaiting_response(body, expected_prefix)
            .await
    }

    /// Query and store the system info.
    ///
    /// # Errors
    ///
    /// - connection and timeout errors from the exchange
    /// - `ExcsError::InvalidResponse` if the reply does not parse
    pub async fn fetch_system_info(&self) -> ExcsResult<SystemInfo> {
        let response = self
            .send_command_awaiting_response(commands::CMD_SYSTEM_INFO, RESP_SYSTEM_INFO_PREFIX)
            .await?;
        let info = SystemInfo::parse(&response)?;
        info!(
            "EX-CommandStation {} on {} with {} (build {})",
            info.version, info.processor_type, info.motor_controller, info.build_number
        );
        *self.state.system_info.lock() = Some(info.clone());
        Ok(info)
    }

    /// Check the stored system info against the configured minimum version.
    ///
    /// # Errors
    ///
    /// - `ExcsError::Version` if no version is known yet or it is too old
    pub fn validate_version(&self) -> ExcsResult<()> {
        validate_version(
            self.state.system_info.lock().as_ref(),
            &self.options.min_version,
        )
    }

    /// Rebuild the turnout list from the station.
    ///
    /// The list is cleared first and filled one detail reply at a time.
    ///
    /// # Errors
    ///
    /// - connection and timeout errors from any exchange
    /// - `ExcsError::InvalidResponse` for a malformed list or detail reply
    /// - `ExcsError::Value` for an id mismatch or an unknown (`X`) state
    pub async fn fetch_turnouts(&self) -> ExcsResult<Vec<Turnout>> {
        self.state.turnouts.lock().clear();

        let response = self
            .send_command_awaiting_response(
                commands::CMD_LIST_TURNOUTS,
                commands::RESP_TURNOUT_LIST_PREFIX,
            )
            .await?;
        let ids = Turnout::parse_ids(&response)?;
        debug!("Station reports {} turnout(s): {:?}", ids.len(), ids);

        for id in ids {
            let detail = self
                .send_command_awaiting_response(
                    &commands::turnout_details(id),
                    &commands::turnout_details_prefix(id),
                )
                .await?;
            let turnout = Turnout::from_detail_response_for(id, &detail)?;
            debug!("Loaded turnout {} '{}' ({})", turnout.id, turnout.description, turnout.state);
            self.state.turnouts.lock().push(turnout);
        }

        Ok(self.turnouts())
    }

    /// Rebuild the roster from the station.
    ///
    /// # Errors
    ///
    /// As [`Self::fetch_turnouts`].
    pub async fn fetch_roster_entries(&self) -> ExcsResult<Vec<RosterEntry>> {
        self.state.roster.lock().clear();

        let response = self
            .send_command_awaiting_response(
                commands::CMD_LIST_ROSTER,
                commands::RESP_ROSTER_LIST_PREFIX,
            )
            .await?;
        let cabs = RosterEntry::parse_ids(&response)?;
        debug!("Station reports {} roster entr(ies): {:?}", cabs.len(), cabs);

        for cab in cabs {
            let detail = self
                .send_command_awaiting_response(
                    &commands::roster_details(cab),
                    &commands::roster_details_prefix(cab),
                )
                .await?;
            let entry = RosterEntry::from_detail_response_for(cab, &detail)?;
            debug!(
                "Loaded locomotive {} '{}' with {} function(s)",
                entry.id,
                entry.description,
                entry.functions.len()
            );
            self.state.roster.lock().push(entry);
        }

        Ok(self.roster_entries())
    }

    /// Switch power on all tracks.
    ///
    /// # Errors
    ///
    /// - `ExcsError::NotConnected` or `ExcsError::Connection`
    pub async fn set_track_power(&self, power: TrackPower) -> ExcsResult<()> {
        info!("Setting track power {}", power);
        self.send_command(power.command()).await
    }

    /// Throw or close a turnout; the station confirms with an `H` push.
    ///
    /// # Errors
    ///
    /// - `ExcsError::NotConnected` or `ExcsError::Connection`
    pub async fn set_turnout(&self, id: u16, state: TurnoutState) -> ExcsResult<()> {
        self.send_command(&Turnout::toggle_command(id, state)).await
    }

    /// # Errors
    ///
    /// - `ExcsError::Argument` if `speed` exceeds 127
    /// - `ExcsError::NotConnected` or `ExcsError::Connection`
    pub async fn set_loco_speed(&self, cab: u16, speed: u8, direction: Direction) -> ExcsResult<()> {
        let command = commands::set_loco_speed(cab, speed, direction)?;
        self.send_command(&command).await
    }

    /// # Errors
    ///
    /// - `ExcsError::Argument` if `function` exceeds 68
    /// - `ExcsError::NotConnected` or `ExcsError::Connection`
    pub async fn set_loco_function(&self, cab: u16, function: u8, on: bool) -> ExcsResult<()> {
        let command = commands::set_loco_function(cab, function, on)?;
        self.send_command(&command).await
    }

    /// Ask the station to push the current throttle state of `cab`.
    ///
    /// # Errors
    ///
    /// - `ExcsError::NotConnected` or `ExcsError::Connection`
    pub async fn request_loco_state(&self, cab: u16) -> ExcsResult<()> {
        self.send_command(&commands::loco_state(cab)).await
    }

    /// Request the throttle state of every roster entry.
    pub async fn refresh_loco_states(&self) {
        request_loco_states(&self.connection, &self.state.cabs()).await;
    }

    /// Write a CV on the main track.
    ///
    /// # Errors
    ///
    /// - `ExcsError::Argument` if `cv` is outside 1..=1024
    /// - `ExcsError::NotConnected` or `ExcsError::Connection`
    pub async fn write_cv(&self, address: u16, cv: u16, value: u8) -> ExcsResult<()> {
        let command = commands::write_cv(address, cv, value)?;
        debug!("Writing CV: address={}, cv={}, value={}", address, cv, value);
        self.send_command(&command).await
    }

    pub fn system_info(&self) -> Option<SystemInfo> {
        self.state.system_info.lock().clone()
    }

    pub fn turnouts(&self) -> Vec<Turnout> {
        self.state.turnouts.lock().clone()
    }

    pub fn turnout(&self, id: u16) -> Option<Turnout> {
        self.state.turnouts.lock().iter().find(|t| t.id == id).cloned()
    }

    pub fn roster_entries(&self) -> Vec<RosterEntry> {
        self.state.roster.lock().clone()
    }

    pub fn roster_entry(&self, cab: u16) -> Option<RosterEntry> {
        self.state.roster.lock().iter().find(|r| r.id == cab).cloned()
    }

    pub fn track_power(&self) -> TrackPowerState {
        self.state.power.lock().clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Current reconnect attempt; 0 while connected.
    pub fn retry_attempts(&self) -> u32 {
        self.connection.retry_attempts()
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Called after every successful (re)connect.
    pub fn on_connected<F>(&self, callback: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.connection.events().connected.subscribe(move |_| callback())
    }

    /// Called with the cause whenever the link goes down.
    pub fn on_disconnected<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&DisconnectCause) + Send + Sync + 'static,
    {
        self.connection.events().disconnected.subscribe(callback)
    }

    /// Called with every message no pending request claimed.
    ///
    /// The client's own state is updated before subscribers run.
    pub fn on_push<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.connection
            .events()
            .push
            .subscribe(move |message: &String| callback(message))
    }
}

impl std::fmt::Debug for CommandStationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandStationClient")
            .field("connection", &self.connection)
            .field("turnouts", &self.state.turnouts.lock().len())
            .field("roster", &self.state.roster.lock().len())
            .finish()
    }
}

async fn request_loco_states(connection: &ConnectionManager, cabs: &[u16]) {
    for &cab in cabs {
        if let Err(e) = connection.send_command(&commands::loco_state(cab)).await {
            warn!("Error requesting state of locomotive {}: {}", cab, e);
            if e.is_connection_error() {
                break;
            }
        }
    }
}
