//! Tests requiring a real EX-CommandStation.
//!
//! # Running Hardware Tests
//!
//! ```bash
//! export EXCS_TEST_HOST=192.168.4.1
//! export EXCS_TEST_PORT=2560            # optional, default: 2560
//! cargo test --features hardware-tests -- --ignored
//! ```

use excs_client::config::DEFAULT_PORT;
use excs_client::{ClientOptions, CommandStationClient, ExcsError};
use std::env;
use std::time::Duration;

fn test_options() -> Option<ClientOptions> {
    let Ok(host) = env::var("EXCS_TEST_HOST") else {
        println!("Skipping hardware test: EXCS_TEST_HOST not set");
        return None;
    };
    let port = env::var("EXCS_TEST_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);
    Some(ClientOptions::new(host).with_port(port))
}

#[tokio::test]
#[ignore]
async fn test_real_station_setup() {
    let Some(options) = test_options() else {
        return;
    };
    let client = CommandStationClient::new(options);

    client.setup().await.expect("setup against real station");

    let info = client.system_info().expect("system info after setup");
    println!(
        "EX-CommandStation {} on {} ({})",
        info.version, info.processor_type, info.motor_controller
    );
    println!(
        "{} turnout(s), {} roster entr(ies)",
        client.turnouts().len(),
        client.roster_entries().len()
    );
    for turnout in client.turnouts() {
        assert!(!turnout.description.is_empty());
    }

    client.shutdown().await;
    assert!(!client.is_connected());
}

#[tokio::test]
#[ignore]
async fn test_real_station_unknown_turnout() {
    let Some(options) = test_options() else {
        return;
    };
    let client = CommandStationClient::new(options);
    client.connect().await.expect("connect");

    // Firmware answers an undefined id with "jT <id> X".
    let reply = client
        .send_command_awaiting_response("JT 32767", "jT 32767 ")
        .await;
    match reply {
        Ok(message) => assert!(message.ends_with('X'), "unexpected reply {message}"),
        Err(e) => assert!(matches!(e, ExcsError::Timeout { .. }), "unexpected error {e}"),
    }

    client.shutdown().await;
}

#[tokio::test]
#[ignore]
async fn test_real_station_unreachable_port() {
    let Some(options) = test_options() else {
        return;
    };
    let options = options
        .with_port(1)
        .with_connect_timeout(Duration::from_secs(2));
    let client = CommandStationClient::new(options);

    let result = client.connect().await;
    assert!(matches!(result, Err(ExcsError::Connection(_))));
}
