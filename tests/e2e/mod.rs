//! End-to-end tests for the command station client.
//!
//! Each test connects a real client to a scripted mock station and checks
//! what crosses the wire and what the client reports back.

pub mod client_tests;
pub mod connection_tests;
pub mod push_tests;
