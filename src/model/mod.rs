//! Typed domain model built from command station replies.
//!
//! Parsers here are pure: they take an unwrapped message body and either
//! return a value or an [`ExcsError`](crate::error::ExcsError) carrying the
//! offending text. Nothing in this module touches the connection.

pub mod power;
pub mod roster;
pub mod system_info;
pub mod turnout;

pub use power::{TrackPower, TrackPowerState};
pub use roster::{Direction, LocoFunction, RosterEntry, ThrottleState};
pub use system_info::{validate_version, SystemInfo, Version};
pub use turnout::{Turnout, TurnoutState};

use crate::error::ExcsResult;

/// A piece of station state that can be updated from push messages.
pub trait PushTarget {
    /// Apply `message` if it concerns this object.
    ///
    /// Returns `Ok(true)` when state changed, `Ok(false)` when the message
    /// was for someone else.
    fn apply_push(&mut self, message: &str) -> ExcsResult<bool>;
}
