//! Tests against a real command station.
//!
//! Skipped unless `EXCS_TEST_HOST` is set. They change nothing on the
//! layout except where a test name says so.

pub mod station_tests;
