//! EX-CommandStation client library.
//!
//! An async engine that keeps a connection to a DCC-EX EX-CommandStation,
//! correlates replies with the requests waiting for them, and keeps a typed
//! model of turnouts, locomotives and track power current from the
//! station's push messages.
//!
//! # Modules
//!
//! - `client`: connection supervision, events and the [`CommandStationClient`]
//! - `protocol`: line framing, response correlation, command builders
//! - `model`: parsers for system info, turnouts, roster entries and power
//! - `transport`: TCP and in-memory connectors
//! - `config`: configuration management with TOML support
//! - `entity`: availability-tracking wrapper for integrations
//! - `error`: unified error handling

pub mod client;
pub mod config;
pub mod entity;
pub mod error;
pub mod model;
pub mod protocol;
pub mod transport;

// Re-export commonly used types for convenience
pub use client::{CommandStationClient, ConnectionManager, ConnectionState, Subscription};
pub use error::{DisconnectCause, ExcsError, ExcsResult};
pub use model::{
    Direction, LocoFunction, RosterEntry, SystemInfo, TrackPower, TrackPowerState, Turnout,
    TurnoutState, Version,
};

// Re-export config types
pub use config::{ClientOptions, Config, ConfigError, ConfigLoader, ConfigResult};
