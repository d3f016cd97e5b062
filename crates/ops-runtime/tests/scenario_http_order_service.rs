//! Scenario: HTTP order service against a mock server.
//!
//! # Invariants under test
//!
//! 1. Listing sends the tenant header and bearer token and decodes the
//!    envelope (plain or proxied) into orders with cents totals.
//! 2. A single malformed record fails the whole list with `Decode`.
//! 3. Accept posts the staff identity to the take endpoint; a 400 maps to
//!    `Conflict`, a 404 to `Rejected`, a 5xx to `TransientNetwork`.

use std::time::Duration;

use httpmock::prelude::*;
use ops_runtime::{HttpOrderService, OrderService, ServiceError, StaffIdentity};
use ops_schemas::OrderStatus;
use serde_json::json;

fn client(server: &MockServer) -> HttpOrderService {
    HttpOrderService::new(
        server.url("/api/v1"),
        "t1",
        Some("tok".to_string()),
        Duration::from_secs(2),
    )
    .expect("client")
}

fn record(id: &str, status: &str) -> serde_json::Value {
    json!({
        "orderId": id,
        "customerName": "Ana",
        "items": [{ "name": "Pad Thai", "quantity": 2 }],
        "total": 24.99,
        "status": status,
        "createdAt": "2026-10-14T11:58:00"
    })
}

#[tokio::test]
async fn list_decodes_envelope_and_sends_tenant_headers() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/v1/tenants/t1/orders")
                .header("X-Tenant-Id", "t1")
                .header("authorization", "Bearer tok");
            then.status(200).json_body(json!({
                "success": true,
                "data": [record("A", "PENDING"), record("B", "PREPARING")],
            }));
        })
        .await;

    let orders = client(&server).list_orders().await.expect("list");
    mock.assert_async().await;

    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0].order_id, "A");
    assert_eq!(orders[0].total_cents, 2_499);
    assert_eq!(orders[1].status, OrderStatus::Preparing);
}

#[tokio::test]
async fn list_accepts_proxied_body() {
    let server = MockServer::start_async().await;
    let inner = json!({ "success": true, "data": [record("A", "PENDING")] }).to_string();
    server
        .mock_async(move |when, then| {
            when.method(GET).path("/api/v1/tenants/t1/orders");
            then.status(200)
                .json_body(json!({ "statusCode": 200, "body": inner }));
        })
        .await;

    let orders = client(&server).list_orders().await.expect("list");
    assert_eq!(orders.len(), 1);
}

#[tokio::test]
async fn one_bad_record_fails_the_whole_list() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v1/tenants/t1/orders");
            then.status(200).json_body(json!({
                "success": true,
                "data": [record("A", "PENDING"), record("B", "TELEPORTED")],
            }));
        })
        .await;

    let err = client(&server).list_orders().await.unwrap_err();
    assert!(matches!(err, ServiceError::Decode(_)), "got {err:?}");
}

#[tokio::test]
async fn list_server_error_is_transient() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v1/tenants/t1/orders");
            then.status(503).body("unavailable");
        })
        .await;

    let err = client(&server).list_orders().await.unwrap_err();
    assert!(matches!(err, ServiceError::TransientNetwork(_)), "got {err:?}");
}

#[tokio::test]
async fn accept_posts_staff_identity_and_returns_order() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/v1/tenants/t1/orders/A/workflow/take")
                .json_body(json!({ "staffId": "s1", "staffName": "Kim" }));
            then.status(200).json_body(json!({
                "success": true,
                "data": { "order": record("A", "RECEIVED") },
            }));
        })
        .await;

    let staff = StaffIdentity {
        staff_id: Some("s1".to_string()),
        staff_name: Some("Kim".to_string()),
    };
    let order = client(&server).accept_order("A", &staff).await.expect("accept");
    mock.assert_async().await;
    assert_eq!(order.status, OrderStatus::Received);
}

#[tokio::test]
async fn accept_on_changed_order_is_conflict() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/v1/tenants/t1/orders/A/workflow/take");
            then.status(400).json_body(json!({
                "success": false,
                "message": "Order cannot be taken. Current status: RECEIVED",
            }));
        })
        .await;

    let err = client(&server)
        .accept_order("A", &StaffIdentity::default())
        .await
        .unwrap_err();
    match err {
        ServiceError::Conflict { message } => assert!(message.contains("RECEIVED")),
        other => panic!("expected conflict, got {other:?}"),
    }
}

#[tokio::test]
async fn accept_on_missing_order_is_rejected() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/v1/tenants/t1/orders/ZZ/workflow/take");
            then.status(404)
                .json_body(json!({ "success": false, "message": "Order not found" }));
        })
        .await;

    let err = client(&server)
        .accept_order("ZZ", &StaffIdentity::default())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ServiceError::Rejected {
            status: 404,
            message: "Order not found".to_string()
        }
    );
}
