//! Entity interface for integrations that expose station state.
//!
//! Every exposed object (a turnout, a locomotive, the track power) is a
//! [`Tracked`] value: the model object plus its availability, which follows
//! the connection. Integrations feed it push messages and connection
//! changes through [`StationEntity`] and read the value back.

use crate::client::ConnectionState;
use crate::error::ExcsResult;
use crate::model::{PushTarget, RosterEntry, TrackPowerState, Turnout};

/// Capabilities shared by all station-backed entities.
pub trait StationEntity {
    /// Whether the entity reflects live state.
    fn is_available(&self) -> bool;

    /// Apply a push message; `Ok(true)` when the entity changed.
    fn handle_push(&mut self, message: &str) -> ExcsResult<bool>;

    fn handle_connection_change(&mut self, state: ConnectionState);
}

/// A model object whose availability follows the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tracked<T> {
    value: T,
    available: bool,
}

impl<T: PushTarget> Tracked<T> {
    /// Start tracking `value` under the current connection `state`.
    pub fn new(value: T, state: ConnectionState) -> Self {
        Self {
            value,
            available: state == ConnectionState::Connected,
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T: PushTarget> StationEntity for Tracked<T> {
    fn is_available(&self) -> bool {
        self.available
    }

    fn handle_push(&mut self, message: &str) -> ExcsResult<bool> {
        self.value.apply_push(message)
    }

    fn handle_connection_change(&mut self, state: ConnectionState) {
        self.available = state == ConnectionState::Connected;
    }
}

pub type TurnoutEntity = Tracked<Turnout>;
pub type LocomotiveEntity = Tracked<RosterEntry>;
pub type TrackPowerEntity = Tracked<TrackPowerState>;
