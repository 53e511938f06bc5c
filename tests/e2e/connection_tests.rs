//! Link loss, reconnect and explicit disconnect.

use crate::common::*;
use excs_client::{ConnectionState, DisconnectCause, ExcsError};
use pretty_assertions::assert_eq;
use std::collections::BTreeSet;
use std::time::Duration;

#[tokio::test]
async fn test_heartbeat_timeout_reconnects() {
    let options = fast_options()
        .with_heartbeat_timeout(Duration::from_millis(200))
        .with_response_timeout(Duration::from_secs(1));
    let mut harness = Harness::new(options);
    let recorder = EventRecorder::attach(&harness.client);
    let _silent = harness.connect().await;

    let result = harness
        .client
        .send_command_awaiting_response("s", "iDCC-EX")
        .await;
    assert!(matches!(
        result,
        Err(ExcsError::ConnectionLost(DisconnectCause::HeartbeatTimeout))
    ));

    let mut device = harness.next_device().await;
    assert_eq!(expect_command(&mut device).await, "s");
    device.send(SYSTEM_INFO).await.unwrap();

    assert!(eventually(|| harness.client.system_info().is_some()).await);
    assert_eq!(
        recorder.disconnect_causes().first(),
        Some(&DisconnectCause::HeartbeatTimeout)
    );
    assert!(recorder.count(&Recorded::Connected) >= 2);

    harness.client.shutdown().await;
}

#[tokio::test]
async fn test_end_of_stream_reconnects() {
    let mut harness = Harness::new(fast_options());
    let recorder = EventRecorder::attach(&harness.client);
    let device = harness.connect().await;

    device.close().await;

    let mut device = harness.next_device().await;
    assert_eq!(expect_command(&mut device).await, "s");
    assert!(harness.client.is_connected());
    assert_eq!(harness.client.retry_attempts(), 0);
    assert_eq!(
        recorder.events(),
        vec![
            Recorded::Connected,
            Recorded::Disconnected(DisconnectCause::EndOfStream),
            Recorded::Connected,
        ]
    );

    harness.client.shutdown().await;
}

#[tokio::test]
async fn test_disconnect_fails_pending_and_stays_down() {
    let mut harness = Harness::new(fast_options().with_response_timeout(Duration::from_secs(2)));
    let recorder = EventRecorder::attach(&harness.client);
    let mut device = harness.connect().await;

    let (result, _) = tokio::join!(
        harness.client.send_command_awaiting_response("s", "iDCC-EX"),
        async {
            expect_command(&mut device).await;
            harness.client.disconnect().await.unwrap();
        }
    );

    assert!(matches!(result, Err(ExcsError::ConnectionClosed)));
    assert_eq!(harness.client.connection_state(), ConnectionState::Disconnected);
    assert_eq!(recorder.disconnect_causes(), vec![DisconnectCause::Requested]);
    // The device sees the link close.
    assert_eq!(device.recv_line().await, None);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(harness.connector.attempts(), 1);
    assert!(matches!(
        harness.client.send_command("s").await,
        Err(ExcsError::NotConnected)
    ));
}

#[tokio::test]
async fn test_reconnect_after_refusals() {
    let mut harness = Harness::new(fast_options());
    let device = harness.connect().await;

    harness.connector.refuse_next(2);
    device.close().await;

    let mut device = harness.next_device().await;
    assert_eq!(expect_command(&mut device).await, "s");
    assert_eq!(harness.connector.attempts(), 4);
    assert_eq!(harness.client.retry_attempts(), 0);

    harness.client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_follows_backoff_schedule() {
    let options = fast_options()
        .with_max_backoff(Duration::from_secs(60))
        .with_heartbeat_timeout(Duration::from_secs(3600));
    let mut harness = Harness::new(options);
    let device = harness.connect().await;

    harness.connector.refuse_next(2);
    let lost = tokio::time::Instant::now();
    device.close().await;

    let at = |ms: u64| tokio::time::sleep_until(lost + Duration::from_millis(ms));

    // First retry after 2 s.
    at(1_900).await;
    assert_eq!(harness.connector.attempts(), 1);
    at(2_100).await;
    assert_eq!(harness.connector.attempts(), 2);

    // Second retry 4 s after the first.
    at(5_900).await;
    assert_eq!(harness.connector.attempts(), 2);
    at(6_100).await;
    assert_eq!(harness.connector.attempts(), 3);

    // Third retry 8 s after the second, and it succeeds.
    at(13_900).await;
    assert_eq!(harness.connector.attempts(), 3);
    let mut device = harness.acceptor.accept().await.unwrap();
    assert!(lost.elapsed() >= Duration::from_secs(14));
    assert_eq!(harness.connector.attempts(), 4);
    assert_eq!(expect_command(&mut device).await, "s");
    assert_eq!(harness.client.retry_attempts(), 0);

    harness.client.shutdown().await;
}

#[tokio::test]
async fn test_disconnect_during_backoff() {
    let mut harness = Harness::new(fast_options().with_max_backoff(Duration::from_secs(10)));
    let recorder = EventRecorder::attach(&harness.client);
    let device = harness.connect().await;

    device.close().await;
    assert!(eventually(|| harness.client.retry_attempts() == 1).await);
    assert_eq!(harness.client.connection_state(), ConnectionState::Disconnected);

    harness.client.disconnect().await.unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(harness.connector.attempts(), 1);
    assert_eq!(recorder.disconnect_causes(), vec![DisconnectCause::EndOfStream]);
}

#[tokio::test]
async fn test_connect_after_disconnect() {
    let mut harness = Harness::new(fast_options());
    let _first = harness.connect().await;

    harness.client.disconnect().await.unwrap();
    assert!(!harness.client.is_connected());

    let mut device = harness.connect().await;
    harness.client.send_command("1").await.unwrap();
    assert_eq!(expect_command(&mut device).await, "1");
    assert_eq!(harness.connector.attempts(), 2);

    harness.client.shutdown().await;
}

#[tokio::test]
async fn test_reconnect_refreshes_locomotives() {
    let mut harness = Harness::new(fast_options());
    harness.client.connect().await.unwrap();
    let mut device = harness.next_device().await;

    let (roster, _) = tokio::join!(harness.client.fetch_roster_entries(), async {
        expect_command(&mut device).await;
        device.send("jR 3 7").await.unwrap();
        expect_command(&mut device).await;
        device.send(r#"jR 3 "Big Boy" "Lights""#).await.unwrap();
        expect_command(&mut device).await;
        device.send(r#"jR 7 "Shunter" """#).await.unwrap();
    });
    assert_eq!(roster.unwrap().len(), 2);

    device.close().await;
    let mut device = harness.next_device().await;

    let mut seen = BTreeSet::new();
    for _ in 0..3 {
        seen.insert(expect_command(&mut device).await);
    }
    let expected: BTreeSet<String> = ["s", "t 3", "t 7"].iter().map(|c| c.to_string()).collect();
    assert_eq!(seen, expected);

    harness.client.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_without_connection() {
    let harness = Harness::new(fast_options());
    harness.client.shutdown().await;
    assert_eq!(harness.client.connection_state(), ConnectionState::Disconnected);
    assert_eq!(harness.connector.attempts(), 0);
}
