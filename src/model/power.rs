//! Track power state, reported as `p0`/`p1` with an optional track name.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::PushTarget;
use crate::error::{ExcsError, ExcsResult};

/// Power on or off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackPower {
    Off,
    On,
}

impl TrackPower {
    /// Command body that switches all tracks to this state.
    pub fn command(self) -> &'static str {
        match self {
            Self::On => crate::protocol::commands::CMD_TRACKS_ON,
            Self::Off => crate::protocol::commands::CMD_TRACKS_OFF,
        }
    }

    /// Parse a `p0`/`p1` message, returning the state and the track it
    /// concerns (`None` means every track).
    ///
    /// # Errors
    ///
    /// - `ExcsError::InvalidResponse` if the message is not a power report
    pub fn parse(message: &str) -> ExcsResult<(Self, Option<String>)> {
        let mut tokens = message.split_whitespace();
        let power = match tokens.next() {
            Some("p1") => Self::On,
            Some("p0") => Self::Off,
            _ => {
                return Err(ExcsError::invalid_response(format!(
                    "invalid power response: {message}"
                )))
            }
        };
        let track = tokens.next().map(str::to_string);
        if tokens.next().is_some() {
            return Err(ExcsError::invalid_response(format!(
                "invalid power response: {message}"
            )));
        }
        Ok((power, track))
    }
}

impl fmt::Display for TrackPower {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::On => write!(f, "on"),
            Self::Off => write!(f, "off"),
        }
    }
}

/// Last known power state of the layout.
///
/// Unknown until the station reports it. A report for a single track sets
/// that track; a report without a track name applies to every track.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackPowerState {
    pub all: Option<TrackPower>,
    pub tracks: std::collections::BTreeMap<String, TrackPower>,
}

impl TrackPowerState {
    /// Power of a named track, falling back to the layout-wide state.
    pub fn track(&self, name: &str) -> Option<TrackPower> {
        self.tracks.get(name).copied().or(self.all)
    }
}

impl PushTarget for TrackPowerState {
    fn apply_push(&mut self, message: &str) -> ExcsResult<bool> {
        if !(message.starts_with("p0") || message.starts_with("p1")) {
            return Ok(false);
        }
        let before = self.clone();
        match TrackPower::parse(message)? {
            (power, Some(track)) => {
                self.tracks.insert(track, power);
            }
            (power, None) => {
                self.all = Some(power);
                self.tracks.clear();
            }
        }
        Ok(*self != before)
    }
}
