//! The client engine: connection supervision, typed events and the
//! command station client that ties them to the domain model.

pub mod connection;
pub mod events;
pub mod station;

pub use connection::{backoff_delay, ConnectionManager, ConnectionState};
pub use events::{ConnectionEvents, EventChannel, Subscription};
pub use station::CommandStationClient;
