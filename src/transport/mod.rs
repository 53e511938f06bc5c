//! Transport abstraction for the command station byte stream.
//!
//! The connection manager never opens sockets itself; it asks a
//! [`Connector`] for a fresh [`Connection`] on every (re)connect attempt.
//! This keeps the TCP implementation swappable with the in-memory mock used
//! by the test suite.

pub mod error;
pub mod mock;
pub mod tcp;
pub mod traits;

pub use error::TransportError;
pub use mock::{MockConnector, MockDevice, MockDeviceAcceptor};
pub use tcp::TcpConnector;
pub use traits::{BoxedReader, BoxedWriter, Connection, Connector};
