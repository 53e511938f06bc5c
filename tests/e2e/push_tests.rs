//! Unsolicited messages and line noise.

use crate::common::*;
use excs_client::protocol::MAX_LINE_LEN;
use excs_client::{Direction, TrackPower, TurnoutState};
use pretty_assertions::assert_eq;

#[tokio::test]
async fn test_unclaimed_message_is_pushed() {
    let mut harness = Harness::new(fast_options());
    let recorder = EventRecorder::attach(&harness.client);
    let mut device = harness.connect().await;

    device.send("p1").await.unwrap();

    assert!(eventually(|| recorder.pushes() == vec!["p1".to_string()]).await);
    assert_eq!(harness.client.track_power().all, Some(TrackPower::On));

    device.send("p0 PROG").await.unwrap();
    assert!(eventually(|| harness.client.track_power().track("PROG") == Some(TrackPower::Off)).await);
    assert_eq!(harness.client.track_power().track("MAIN"), Some(TrackPower::On));
}

#[tokio::test]
async fn test_claimed_reply_is_not_pushed() {
    let mut harness = Harness::new(fast_options());
    let recorder = EventRecorder::attach(&harness.client);
    let mut device = harness.connect().await;

    let (reply, _) = tokio::join!(
        harness.client.send_command_awaiting_response("s", "iDCC-EX"),
        async {
            expect_command(&mut device).await;
            device.send(SYSTEM_INFO).await.unwrap();
            device.send("p1").await.unwrap();
        }
    );

    assert_eq!(reply.unwrap(), SYSTEM_INFO);
    assert!(eventually(|| !recorder.pushes().is_empty()).await);
    assert_eq!(recorder.pushes(), vec!["p1".to_string()]);
}

#[tokio::test]
async fn test_noise_is_discarded() {
    let mut harness = Harness::new(fast_options());
    let recorder = EventRecorder::attach(&harness.client);
    let mut device = harness.connect().await;

    let (reply, _) = tokio::join!(
        harness.client.send_command_awaiting_response("s", "iDCC-EX"),
        async {
            expect_command(&mut device).await;
            device.send_raw("garbage").await.unwrap();
            device.send_raw("<>").await.unwrap();
            device.send_raw("<iDCC-EX unterminated").await.unwrap();
            device.send_raw("  <p1>  ").await.unwrap();
            device.send(SYSTEM_INFO).await.unwrap();
        }
    );

    // Noise neither resolves nor disturbs the pending request.
    assert_eq!(reply.unwrap(), SYSTEM_INFO);
    assert!(harness.client.is_connected());
    assert!(eventually(|| !recorder.pushes().is_empty()).await);
    assert_eq!(recorder.pushes(), vec!["p1".to_string()]);
}

#[tokio::test]
async fn test_overlong_line_is_discarded() {
    let mut harness = Harness::new(fast_options());
    let recorder = EventRecorder::attach(&harness.client);
    let mut device = harness.connect().await;

    // Well framed but far too long; neither the head nor the tail may
    // surface as a message.
    let padding = "x".repeat(MAX_LINE_LEN * 3);
    device.send(&format!("p1 {padding}")).await.unwrap();
    device.send("p0").await.unwrap();

    assert!(eventually(|| !recorder.pushes().is_empty()).await);
    assert_eq!(recorder.pushes(), vec!["p0".to_string()]);
    assert_eq!(harness.client.track_power().all, Some(TrackPower::Off));
    assert!(harness.client.is_connected());
}

#[tokio::test]
async fn test_turnout_push_updates_state() {
    let mut harness = Harness::new(fast_options());
    harness.client.connect().await.unwrap();
    let mut device = harness.next_device().await;

    let (turnouts, _) = tokio::join!(harness.client.fetch_turnouts(), async {
        assert_eq!(expect_command(&mut device).await, "JT");
        device.send("jT 1 12").await.unwrap();
        assert_eq!(expect_command(&mut device).await, "JT 1");
        device.send("jT 1 C").await.unwrap();
        assert_eq!(expect_command(&mut device).await, "JT 12");
        device.send("jT 12 C").await.unwrap();
    });
    assert_eq!(turnouts.unwrap().len(), 2);

    device.send("H 12 1").await.unwrap();

    assert!(eventually(|| {
        harness.client.turnout(12).map(|t| t.state) == Some(TurnoutState::Thrown)
    })
    .await);
    assert_eq!(
        harness.client.turnout(1).map(|t| t.state),
        Some(TurnoutState::Closed)
    );
}

#[tokio::test]
async fn test_throttle_push_updates_locomotive() {
    let mut harness = Harness::new(fast_options());
    harness.client.connect().await.unwrap();
    let mut device = harness.next_device().await;

    let (roster, _) = tokio::join!(harness.client.fetch_roster_entries(), async {
        assert_eq!(expect_command(&mut device).await, "JR");
        device.send("jR 3").await.unwrap();
        assert_eq!(expect_command(&mut device).await, "JR 3");
        device
            .send(r#"jR 3 "Big Boy" "Lights/*Horn""#)
            .await
            .unwrap();
    });
    assert_eq!(roster.unwrap().len(), 1);

    // 131: speed 2, forward, emergency stop; functions 0 and 1 on.
    device.send("l 3 0 131 3").await.unwrap();

    assert!(eventually(|| {
        harness
            .client
            .roster_entry(3)
            .map(|loco| loco.emergency_stop)
            .unwrap_or(false)
    })
    .await);
    let loco = harness.client.roster_entry(3).unwrap();
    assert_eq!(loco.speed, 2);
    assert_eq!(loco.direction, Direction::Forward);
    assert!(loco.functions[&0].state);
    assert!(loco.functions[&1].state);
}

#[tokio::test]
async fn test_push_for_unknown_entity_is_harmless() {
    let mut harness = Harness::new(fast_options());
    let recorder = EventRecorder::attach(&harness.client);
    let mut device = harness.connect().await;

    device.send("H 99 1").await.unwrap();
    device.send("l 42 0 10 0").await.unwrap();

    assert!(eventually(|| recorder.pushes().len() == 2).await);
    assert!(harness.client.turnouts().is_empty());
    assert!(harness.client.is_connected());
}
