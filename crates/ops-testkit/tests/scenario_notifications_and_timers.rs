//! Scenario: Notifications, Slow Orders And Timer Loops
//!
//! # Invariants under test
//!
//! 1. The seeding poll raises no new-order notifications; an order that
//!    first appears in a later poll or a push raises exactly one.
//! 2. A push cancellation raises an alert.
//! 3. An order waiting past the threshold raises one slow-order alert, not
//!    one per check.
//! 4. The poll loop polls on its interval and exits when the engine stops.

use std::time::Duration;

use ops_runtime::{
    spawn_engine, spawn_poll_loop, AcceptError, EngineConfig, NotificationKind,
};
use ops_schemas::OrderStatus;
use ops_testkit::{fixed_now, order, order_at, order_json, FakeOrderService, TestClock};
use serde_json::json;

#[tokio::test]
async fn new_orders_notify_once_and_not_while_seeding() {
    let svc = FakeOrderService::new([
        order("A", OrderStatus::Pending),
        order("B", OrderStatus::Cooking),
    ]);
    let (engine, _task) = spawn_engine(
        EngineConfig::default(),
        svc.clone(),
        TestClock::at(fixed_now()),
    );
    let mut feed = engine.notifications().subscribe();

    engine.refresh();
    engine.wait_for(|m| m.seeded).await.unwrap();
    assert!(engine.notifications().history().is_empty());

    svc.upsert(order("C", OrderStatus::Pending));
    engine.refresh();
    engine.wait_for(|m| m.order("C").is_some()).await.unwrap();

    let n = feed.recv().await.unwrap();
    assert_eq!(n.kind, NotificationKind::Order);
    assert_eq!(n.order_id.as_deref(), Some("C"));

    let d = order("D", OrderStatus::Pending);
    engine.ingest_push("new_order", order_json(&d));
    engine.wait_for(|m| m.order("D").is_some()).await.unwrap();

    let orders: Vec<_> = engine
        .notifications()
        .history()
        .into_iter()
        .filter(|n| n.kind == NotificationKind::Order)
        .collect();
    assert_eq!(orders.len(), 2);
    // Newest first.
    assert_eq!(orders[0].order_id.as_deref(), Some("D"));
}

#[tokio::test]
async fn push_cancellation_raises_an_alert() {
    let svc = FakeOrderService::new([order("A", OrderStatus::Cooking)]);
    let (engine, _task) = spawn_engine(
        EngineConfig::default(),
        svc.clone(),
        TestClock::at(fixed_now()),
    );
    engine.refresh();
    engine.wait_for(|m| m.seeded).await.unwrap();

    engine.ingest_push("order_cancelled", json!({ "orderId": "A" }));
    let m = engine
        .wait_for(|m| m.status_of("A") == Some(OrderStatus::Cancelled))
        .await
        .unwrap();
    assert!(!m.is_pending("A"));

    let alerts: Vec<_> = engine
        .notifications()
        .history()
        .into_iter()
        .filter(|n| n.kind == NotificationKind::Alert)
        .collect();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].order_id.as_deref(), Some("A"));
}

#[tokio::test]
async fn slow_order_alerts_once() {
    let now = fixed_now();
    let svc = FakeOrderService::new([
        order_at("OLD", OrderStatus::Cooking, now - chrono::Duration::minutes(20)),
        order_at("NEW", OrderStatus::Pending, now - chrono::Duration::minutes(5)),
        order_at("OUT", OrderStatus::Delivering, now - chrono::Duration::minutes(40)),
    ]);
    let clock = TestClock::at(now);
    let (engine, _task) = spawn_engine(EngineConfig::default(), svc.clone(), clock.clone());
    engine.refresh();
    engine.wait_for(|m| m.seeded).await.unwrap();

    for _ in 0..3 {
        let v = engine.read_model().version;
        engine.check_slow_orders();
        engine.wait_for(|m| m.version > v).await.unwrap();
    }

    let slow: Vec<_> = engine
        .notifications()
        .history()
        .into_iter()
        .filter(|n| n.title == "Slow order")
        .collect();
    assert_eq!(slow.len(), 1);
    assert_eq!(slow[0].order_id.as_deref(), Some("OLD"));
    assert!(slow[0].message.contains("20 minutes"));

    // Ten minutes later NEW crosses the threshold too.
    clock.advance(chrono::Duration::minutes(11));
    let v = engine.read_model().version;
    engine.check_slow_orders();
    engine.wait_for(|m| m.version > v).await.unwrap();
    let slow_ids: Vec<_> = engine
        .notifications()
        .history()
        .into_iter()
        .filter(|n| n.title == "Slow order")
        .filter_map(|n| n.order_id)
        .collect();
    assert_eq!(slow_ids, vec!["NEW".to_string(), "OLD".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn poll_loop_follows_its_interval_and_stops_with_the_engine() {
    let svc = FakeOrderService::new([order("A", OrderStatus::Pending)]);
    let (engine, task) = spawn_engine(
        EngineConfig::default(),
        svc.clone(),
        TestClock::at(fixed_now()),
    );
    let poller = spawn_poll_loop(engine.clone(), Duration::from_secs(15));

    tokio::time::sleep(Duration::from_secs(46)).await;
    assert_eq!(svc.list_calls(), 4, "ticks at 0, 15, 30 and 45 s");
    assert!(engine.read_model().seeded);

    engine.shutdown();
    task.await.unwrap();
    tokio::time::timeout(Duration::from_secs(30), poller)
        .await
        .expect("poll loop exits")
        .unwrap();

    assert_eq!(engine.accept("A").await, Err(AcceptError::EngineStopped));
    assert!(!engine.refresh());
}
