//! Wire protocol: line framing, request/response correlation and outbound
//! command builders.
//!
//! Messages on the wire are single lines wrapped in angle brackets, in both
//! directions: `<s>` out, `<iDCC-EX V-5.4.8 / ESP32 / ...>` back. Everything
//! in this module works on the unwrapped body.

pub mod commands;
pub mod correlator;
pub mod framer;

pub use correlator::{PendingResponse, ResponseCorrelator};
pub use framer::{frame_command, unwrap_line, Discard, Frame, MAX_LINE_LEN};
