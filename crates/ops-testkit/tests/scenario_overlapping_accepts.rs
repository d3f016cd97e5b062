//! Scenario: Overlapping Accepts Hand Over The Ticket
//!
//! A push releases accept #1 while its request is still in flight, and staff
//! issue accept #2 on the same order. Accept #1 then resolves late.
//!
//! # Invariants under test
//!
//! 1. A late failure of #1 neither reverts nor un-tracks #2: the poll that
//!    follows still confirms #2 and releases the order.
//! 2. A late success of #1 does not release #2; only #2's own outcome does.

use std::sync::Arc;
use std::time::Duration;

use ops_runtime::{spawn_engine, AcceptError, EngineConfig, EngineHandle, ServiceError};
use ops_schemas::OrderStatus;
use ops_testkit::{fixed_now, order, FakeOrderService, TestClock};
use serde_json::json;

async fn seeded(svc: &Arc<FakeOrderService>) -> EngineHandle {
    let (engine, _task) = spawn_engine(
        EngineConfig::default(),
        svc.clone(),
        TestClock::at(fixed_now()),
    );
    engine.refresh();
    engine.wait_for(|m| m.seeded).await.expect("seeded");
    engine
}

async fn reaches(count: impl Fn() -> usize, n: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while count() < n {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("service call observed");
}

fn push_pending(engine: &EngineHandle) {
    engine.ingest_push("order_update", json!({ "orderId": "X", "status": "PENDING" }));
}

#[tokio::test]
async fn late_failure_of_released_accept_leaves_newer_accept_confirmable() {
    let svc = FakeOrderService::new([order("X", OrderStatus::Pending)]);
    let engine = seeded(&svc).await;

    svc.fail_next_accept(ServiceError::TransientNetwork("reset".to_string()));
    let first_gate = svc.hold_next_accept();
    let h = engine.clone();
    let first = tokio::spawn(async move { h.accept("X").await });
    engine.wait_for(|m| m.is_pending("X")).await.unwrap();
    reaches(|| svc.accept_calls(), 1).await;

    push_pending(&engine);
    engine.wait_for(|m| !m.is_pending("X")).await.unwrap();

    // Accept #2 succeeds; its confirming poll is held so #1 fails first.
    let confirm_poll = svc.hold_next_list();
    engine.accept("X").await.unwrap();
    reaches(|| svc.list_calls(), 2).await;
    assert!(engine.is_busy("X"));
    assert_eq!(svc.server_status("X"), Some(OrderStatus::Received));

    first_gate.release_all();
    let err = first.await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        AcceptError::Service(ServiceError::TransientNetwork(_))
    ));

    // The forced poll after #1's failure was issued after #2's success.
    let m = tokio::time::timeout(
        Duration::from_secs(5),
        engine.wait_for(|m| !m.is_pending("X")),
    )
    .await
    .expect("newer accept released by the forced poll")
    .unwrap();
    assert_eq!(m.status_of("X"), Some(OrderStatus::Received));

    confirm_poll.release_all();
}

#[tokio::test]
async fn late_success_of_released_accept_does_not_release_newer_accept() {
    let svc = FakeOrderService::new([order("X", OrderStatus::Pending)]);
    let engine = seeded(&svc).await;

    let first_gate = svc.hold_next_accept();
    let h = engine.clone();
    let first = tokio::spawn(async move { h.accept("X").await });
    engine.wait_for(|m| m.is_pending("X")).await.unwrap();
    reaches(|| svc.accept_calls(), 1).await;

    push_pending(&engine);
    engine.wait_for(|m| !m.is_pending("X")).await.unwrap();

    let second_gate = svc.hold_next_accept();
    let h = engine.clone();
    let second = tokio::spawn(async move { h.accept("X").await });
    engine.wait_for(|m| m.is_pending("X")).await.unwrap();
    reaches(|| svc.accept_calls(), 2).await;

    first_gate.release_all();
    first.await.unwrap().unwrap();
    assert!(engine.is_busy("X"), "accept #2 still in flight");

    // #1 already took the order server-side, so #2 conflicts.
    second_gate.release_all();
    let err = second.await.unwrap().unwrap_err();
    assert_eq!(err.kind(), "conflict");

    let m = engine
        .wait_for(|m| !m.is_pending("X") && m.status_of("X") == Some(OrderStatus::Received))
        .await
        .unwrap();
    assert_eq!(m.status_of("X"), Some(OrderStatus::Received));
}
