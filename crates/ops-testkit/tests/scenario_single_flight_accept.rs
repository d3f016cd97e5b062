//! Scenario: One Accept In Flight Per Order
//!
//! # Invariants under test
//!
//! 1. `accept(X)` while `X` is pending returns `Busy` without waiting for
//!    the in-flight request and without a second network call.
//! 2. Two accepts racing into the engine produce exactly one request; the
//!    loser is refused as `Busy`.
//! 3. Accepts the workflow forbids (unknown order, not `PENDING`) are
//!    refused locally.
//! 4. Accepts on different orders do not block each other.

use std::time::Duration;

use ops_runtime::{spawn_engine, AcceptError, EngineConfig, EngineHandle, StaffIdentity};
use ops_schemas::OrderStatus;
use ops_testkit::{fixed_now, order, FakeOrderService, TestClock};
use ops_workflow::WorkflowRefusal;
use tokio::task::JoinSet;

async fn seeded(svc: &std::sync::Arc<FakeOrderService>) -> EngineHandle {
    let (engine, _task) = spawn_engine(
        EngineConfig::default(),
        svc.clone(),
        TestClock::at(fixed_now()),
    );
    engine.refresh();
    engine.wait_for(|m| m.seeded).await.expect("seeded");
    engine
}

#[tokio::test]
async fn second_accept_is_busy_without_a_request() {
    let svc = FakeOrderService::new([order("X", OrderStatus::Pending)]);
    let engine = seeded(&svc).await;
    let gate = svc.hold_accepts();

    let h = engine.clone();
    let first = tokio::spawn(async move { h.accept("X").await });
    engine.wait_for(|m| m.is_pending("X")).await.unwrap();

    // Gate is still closed, so a non-busy answer would hang here.
    let second = tokio::time::timeout(Duration::from_secs(1), engine.accept("X"))
        .await
        .expect("busy is answered without waiting");
    assert_eq!(
        second,
        Err(AcceptError::Busy {
            order_id: "X".to_string()
        })
    );
    assert!(engine.is_busy("X"));

    gate.release_all();
    first.await.unwrap().unwrap();
    assert_eq!(svc.accept_calls(), 1);
}

#[tokio::test]
async fn racing_accepts_issue_one_request() {
    let svc = FakeOrderService::new([order("X", OrderStatus::Pending)]);
    let engine = seeded(&svc).await;
    let gate = svc.hold_accepts();

    let mut set = JoinSet::new();
    for _ in 0..2 {
        let h = engine.clone();
        set.spawn(async move { h.accept("X").await });
    }

    let loser = set.join_next().await.unwrap().unwrap();
    assert!(matches!(loser, Err(AcceptError::Busy { .. })));

    gate.release_all();
    let winner = set.join_next().await.unwrap().unwrap();
    assert_eq!(winner, Ok(()));
    assert_eq!(svc.accept_calls(), 1);
}

#[tokio::test]
async fn workflow_refusals_make_no_request() {
    let svc = FakeOrderService::new([
        order("R", OrderStatus::Received),
        order("C", OrderStatus::Cancelled),
        order("K", OrderStatus::Cooking),
    ]);
    let engine = seeded(&svc).await;

    assert_eq!(
        engine.accept("missing").await,
        Err(AcceptError::UnknownOrder {
            order_id: "missing".to_string()
        })
    );
    assert!(matches!(
        engine.accept("R").await,
        Err(AcceptError::Workflow(WorkflowRefusal::NotAcceptable { .. }))
    ));
    assert!(matches!(
        engine.accept("C").await,
        Err(AcceptError::Workflow(WorkflowRefusal::Terminal { .. }))
    ));
    assert!(engine.accept("K").await.is_err());
    assert_eq!(svc.accept_calls(), 0);
    assert!(engine.read_model().pending.is_empty());
}

#[tokio::test]
async fn accepts_on_different_orders_run_concurrently() {
    let svc = FakeOrderService::new([
        order("A", OrderStatus::Pending),
        order("B", OrderStatus::Pending),
    ]);
    let engine = seeded(&svc).await;
    let gate = svc.hold_accepts();

    let (ha, hb) = (engine.clone(), engine.clone());
    let a = tokio::spawn(async move { ha.accept("A").await });
    let b = tokio::spawn(async move {
        hb.accept_as(
            "B",
            StaffIdentity {
                staff_id: Some("s7".to_string()),
                staff_name: Some("Kim".to_string()),
            },
        )
        .await
    });

    let m = engine
        .wait_for(|m| m.is_pending("A") && m.is_pending("B"))
        .await
        .unwrap();
    assert_eq!(m.pending, vec!["A".to_string(), "B".to_string()]);

    gate.release_all();
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();
    assert_eq!(svc.accept_calls(), 2);
    assert!(svc
        .accepted_by()
        .iter()
        .any(|(id, s)| id == "B" && s.staff_name.as_deref() == Some("Kim")));
}
