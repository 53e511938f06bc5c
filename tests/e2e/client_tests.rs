//! Setup sequences, fetches and outbound commands.

use crate::common::*;
use excs_client::{Direction, ExcsError, TrackPower, TurnoutState, Version};
use pretty_assertions::assert_eq;
use std::time::Duration;

#[tokio::test]
async fn test_system_info_exchange() {
    let mut harness = Harness::new(fast_options());
    let mut device = harness.connect().await;

    let (info, _) = tokio::join!(harness.client.fetch_system_info(), async {
        assert_eq!(expect_command(&mut device).await, "s");
        device.send(SYSTEM_INFO).await.unwrap();
    });

    let info = info.unwrap();
    assert_eq!(info.version, "5.4.8");
    assert_eq!(info.version_parsed, Version::new(vec![5, 4, 8]));
    assert_eq!(info.processor_type, "ESP32");
    assert_eq!(info.motor_controller, "STANDARD_MOTOR_SHIELD");
    assert_eq!(info.build_number, "G-c389fe9");
    assert_eq!(harness.client.system_info(), Some(info));
    assert!(harness.client.validate_version().is_ok());
}

#[tokio::test]
async fn test_version_checks() {
    let mut harness = Harness::new(fast_options());
    let mut device = harness.connect().await;

    assert!(matches!(
        harness.client.validate_version(),
        Err(ExcsError::Version(_))
    ));

    let (info, _) = tokio::join!(harness.client.fetch_system_info(), async {
        expect_command(&mut device).await;
        device
            .send("iDCC-EX V-5.3.9 / MEGA / STANDARD_MOTOR_SHIELD")
            .await
            .unwrap();
    });

    assert_eq!(info.unwrap().build_number, "unknown");
    assert!(matches!(
        harness.client.validate_version(),
        Err(ExcsError::Version(_))
    ));
}

#[tokio::test]
async fn test_setup_loads_layout() {
    let mut harness = Harness::new(fast_options());
    harness.client.connect().await.unwrap();
    let station = serve(harness.next_device().await, layout_script());

    harness.client.setup().await.unwrap();

    let turnouts = harness.client.turnouts();
    assert_eq!(turnouts.len(), 2);
    assert_eq!(turnouts[0].description, "Siding");
    assert_eq!(turnouts[0].state, TurnoutState::Thrown);
    assert_eq!(turnouts[1].description, "Turnout 2");
    assert_eq!(turnouts[1].state, TurnoutState::Closed);

    let loco = harness.client.roster_entry(3).unwrap();
    assert_eq!(loco.description, "Big Boy");
    assert_eq!(loco.functions.len(), 3);
    assert!(loco.functions[&1].is_momentary);
    assert_eq!(loco.functions[&3].label, "Bell");

    harness.client.shutdown().await;
    let seen = station.await.unwrap();
    assert_eq!(seen, vec!["s", "JT", "JT 1", "JT 2", "JR", "JR 3"]);
}

#[tokio::test]
async fn test_setup_connects_when_needed() {
    let mut harness = Harness::new(fast_options());
    let acceptor = &mut harness.acceptor;

    let station = async {
        let device = acceptor.accept_within(PATIENCE).await.unwrap();
        serve(device, layout_script())
    };
    let (result, station) = tokio::join!(harness.client.setup(), station);

    result.unwrap();
    assert!(harness.client.is_connected());
    assert_eq!(harness.client.turnouts().len(), 2);
    harness.client.shutdown().await;
    station.await.unwrap();
}

#[tokio::test]
async fn test_empty_lists() {
    let mut harness = Harness::new(fast_options());
    harness.client.connect().await.unwrap();
    let station = serve(
        harness.next_device().await,
        vec![("JT", vec!["jT"]), ("JR", vec!["jR"])],
    );

    assert!(harness.client.fetch_turnouts().await.unwrap().is_empty());
    assert!(harness.client.fetch_roster_entries().await.unwrap().is_empty());

    harness.client.shutdown().await;
    station.await.unwrap();
}

#[tokio::test]
async fn test_unknown_turnout_state_is_value_error() {
    let mut harness = Harness::new(fast_options());
    harness.client.connect().await.unwrap();
    let station = serve(
        harness.next_device().await,
        vec![("JT", vec!["jT 9"]), ("JT 9", vec!["jT 9 X"])],
    );

    let result = harness.client.fetch_turnouts().await;
    assert!(matches!(result, Err(ExcsError::Value(_))));
    assert!(harness.client.turnouts().is_empty());
    // A parse failure leaves the link alone.
    assert!(harness.client.is_connected());

    harness.client.shutdown().await;
    station.await.unwrap();
}

#[tokio::test]
async fn test_malformed_list_is_invalid_response() {
    let mut harness = Harness::new(fast_options());
    harness.client.connect().await.unwrap();
    let station = serve(
        harness.next_device().await,
        vec![("JR", vec!["jR 3 three"])],
    );

    let result = harness.client.fetch_roster_entries().await;
    assert!(matches!(result, Err(ExcsError::InvalidResponse(_))));

    harness.client.shutdown().await;
    station.await.unwrap();
}

#[tokio::test]
async fn test_refetch_replaces_previous_list() {
    let mut harness = Harness::new(fast_options());
    harness.client.connect().await.unwrap();
    let station = serve(
        harness.next_device().await,
        vec![("JT", vec!["jT 4"]), ("JT 4", vec!["jT 4 C"])],
    );

    harness.client.fetch_turnouts().await.unwrap();
    harness.client.fetch_turnouts().await.unwrap();
    assert_eq!(harness.client.turnouts().len(), 1);

    harness.client.shutdown().await;
    station.await.unwrap();
}

#[tokio::test]
async fn test_response_timeout_keeps_connection() {
    let mut harness = Harness::new(fast_options());
    let mut device = harness.connect().await;

    let result = harness
        .client
        .send_command_awaiting_response("s", "iDCC-EX")
        .await;
    assert!(matches!(result, Err(ExcsError::Timeout { .. })));
    assert!(!result.unwrap_err().is_connection_error());
    assert!(harness.client.is_connected());
    assert_eq!(expect_command(&mut device).await, "s");

    // A late reply is not delivered to anyone; it becomes a push.
    let recorder = EventRecorder::attach(&harness.client);
    device.send(SYSTEM_INFO).await.unwrap();
    assert!(eventually(|| recorder.pushes().len() == 1).await);

    // The prefix is free again.
    let (reply, _) = tokio::join!(
        harness.client.send_command_awaiting_response("s", "iDCC-EX"),
        async {
            expect_command(&mut device).await;
            device.send(SYSTEM_INFO).await.unwrap();
        }
    );
    assert_eq!(reply.unwrap(), SYSTEM_INFO);
}

#[tokio::test]
async fn test_colliding_prefix_is_refused() {
    let mut harness = Harness::new(fast_options());
    let _device = harness.connect().await;

    let (first, second) = tokio::join!(
        harness.client.send_command_awaiting_response("JR", "jR"),
        async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            harness
                .client
                .send_command_awaiting_response("JR 3", "jR 3 ")
                .await
        }
    );

    assert!(matches!(first, Err(ExcsError::Timeout { .. })));
    assert!(matches!(second, Err(ExcsError::PrefixCollision { .. })));
}

#[tokio::test]
async fn test_commands_on_the_wire() {
    let mut harness = Harness::new(fast_options());
    let mut device = harness.connect().await;
    let client = &harness.client;

    client.set_track_power(TrackPower::On).await.unwrap();
    assert_eq!(expect_command(&mut device).await, "1");

    client.set_track_power(TrackPower::Off).await.unwrap();
    assert_eq!(expect_command(&mut device).await, "0");

    client.set_turnout(5, TurnoutState::Thrown).await.unwrap();
    assert_eq!(expect_command(&mut device).await, "T 5 T");

    client.set_loco_speed(3, 64, Direction::Forward).await.unwrap();
    assert_eq!(expect_command(&mut device).await, "t 3 64 1");

    client.set_loco_function(3, 2, true).await.unwrap();
    assert_eq!(expect_command(&mut device).await, "F 3 2 1");

    client.request_loco_state(3).await.unwrap();
    assert_eq!(expect_command(&mut device).await, "t 3");

    client.write_cv(3, 29, 6).await.unwrap();
    assert_eq!(expect_command(&mut device).await, "w 3 29 6");

    client.send_command("D RESET").await.unwrap();
    assert_eq!(device.recv_line().await.as_deref(), Some("<D RESET>"));
}

#[tokio::test]
async fn test_invalid_arguments_send_nothing() {
    let mut harness = Harness::new(fast_options());
    let mut device = harness.connect().await;
    let client = &harness.client;

    assert!(matches!(
        client.set_loco_speed(3, 200, Direction::Reverse).await,
        Err(ExcsError::Argument(_))
    ));
    assert!(matches!(
        client.set_loco_function(3, 69, true).await,
        Err(ExcsError::Argument(_))
    ));
    assert!(matches!(
        client.write_cv(3, 0, 1).await,
        Err(ExcsError::Argument(_))
    ));

    client.set_track_power(TrackPower::On).await.unwrap();
    assert_eq!(expect_command(&mut device).await, "1");
}

#[tokio::test]
async fn test_send_while_disconnected() {
    let harness = Harness::new(fast_options());

    assert!(matches!(
        harness.client.send_command("1").await,
        Err(ExcsError::NotConnected)
    ));
    assert!(matches!(
        harness.client.fetch_system_info().await,
        Err(ExcsError::NotConnected)
    ));
}

#[tokio::test]
async fn test_initial_connect_failure() {
    let harness = Harness::new(fast_options());
    harness.connector.refuse_next(1);

    let result = harness.client.connect().await;
    assert!(matches!(result, Err(ExcsError::Connection(_))));
    assert!(!harness.client.is_connected());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(harness.connector.attempts(), 1);
}
