//! Scenario: Disconnect Then Connect Hands Over Cleanly
//!
//! # Invariants under test
//!
//! 1. After `disconnect()` followed by `connect()`, the winding-down session
//!    never overwrites the new session's state: the client stays
//!    `Connected`.
//! 2. Outbound frames go to the new session, not the closed one.
//!
//! Runs on a multi-threaded runtime so the old supervisor and the new one
//! genuinely interleave; repeated rounds widen the window.

use std::sync::Arc;
use std::time::Duration;

use ops_push::{ConnectionState, PushClient, PushConfig, SendOutcome};
use ops_testkit::{fixed_now, ScriptedTransport, TestClock};

const ROUNDS: usize = 100;

fn client(transport: &Arc<ScriptedTransport>) -> PushClient {
    PushClient::new(
        PushConfig {
            url: "ws://orders.test/ws".to_string(),
            ..PushConfig::default()
        },
        transport.clone(),
        TestClock::at(fixed_now()),
    )
}

async fn connected(push: &PushClient) {
    let mut rx = push.watch_state();
    tokio::time::timeout(
        Duration::from_secs(5),
        rx.wait_for(|s| *s == ConnectionState::Connected),
    )
    .await
    .expect("connected in time")
    .expect("state channel open");
}

async fn until(pred: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !pred() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition reached");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reconnect_after_disconnect_stays_connected() {
    let transport = ScriptedTransport::new();
    let push = client(&transport);

    for round in 0..ROUNDS {
        let first = transport.open_next();
        push.connect();
        connected(&push).await;

        push.disconnect();
        let second = transport.open_next();
        push.connect();
        connected(&push).await;

        // Give the old supervisor every chance to finish winding down.
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert_eq!(push.state(), ConnectionState::Connected, "round {round}");
        assert_eq!(push.notify_order_taken("ORD-1"), SendOutcome::Sent, "round {round}");
        until(|| second.sent().iter().any(|f| f.contains("order_taken"))).await;
        assert!(
            !first.sent().iter().any(|f| f.contains("order_taken")),
            "round {round}: frame went to the closed session"
        );

        push.disconnect();
    }

    assert_eq!(transport.connect_attempts(), ROUNDS * 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn disconnect_wins_over_a_session_still_opening() {
    let transport = ScriptedTransport::new();
    let push = client(&transport);

    // The aborted session may or may not consume a scripted step, so two are
    // queued per round and every peer is kept open.
    let mut peers = Vec::new();
    for round in 0..ROUNDS {
        peers.push(transport.open_next());
        peers.push(transport.open_next());
        push.connect();
        push.disconnect();

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(push.state(), ConnectionState::Disconnected, "round {round}");
        assert_eq!(push.notify_order_taken("ORD-1"), SendOutcome::Dropped);

        push.connect();
        connected(&push).await;
        push.disconnect();
    }
}
