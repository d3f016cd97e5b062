//! Order service client.
//!
//! [`OrderService`] is the seam the engine talks to. [`HttpOrderService`] is
//! the production implementation over reqwest; tests use the fake in
//! `ops-testkit`.
//!
//! Response bodies are accepted in the shapes the service has used:
//!
//! ```text
//! { "success": true, "data": [...], "message": "..." }   // envelope
//! { "body": "{\"success\":true,...}" }                   // proxied envelope, body as a JSON string
//! [ ... ]                                                 // bare array (list only)
//! ```

use std::time::Duration;

use async_trait::async_trait;
use ops_schemas::Order;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::ServiceError;

/// Who is accepting an order. Sent with the accept request when known.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffIdentity {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staff_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staff_name: Option<String>,
}

#[async_trait]
pub trait OrderService: Send + Sync + 'static {
    /// Full list of the tenant's active orders.
    async fn list_orders(&self) -> Result<Vec<Order>, ServiceError>;

    /// Accept (take) a `PENDING` order. Returns the updated order.
    async fn accept_order(&self, order_id: &str, staff: &StaffIdentity)
        -> Result<Order, ServiceError>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// reqwest-backed client. The token is never logged.
#[derive(Clone)]
pub struct HttpOrderService {
    http: reqwest::Client,
    base_url: String,
    tenant_id: String,
    token: Option<String>,
}

impl std::fmt::Debug for HttpOrderService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpOrderService")
            .field("base_url", &self.base_url)
            .field("tenant_id", &self.tenant_id)
            .field("token", &self.token.as_ref().map(|_| "<REDACTED>"))
            .finish()
    }
}

impl HttpOrderService {
    pub fn new(
        base_url: impl Into<String>,
        tenant_id: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tenant_id: tenant_id.into(),
            token,
        })
    }

    fn orders_url(&self) -> String {
        format!("{}/tenants/{}/orders", self.base_url, self.tenant_id)
    }

    fn take_url(&self, order_id: &str) -> String {
        format!(
            "{}/tenants/{}/orders/{}/workflow/take",
            self.base_url, self.tenant_id, order_id
        )
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        let rb = self
            .http
            .request(method, url)
            .header("X-Tenant-Id", &self.tenant_id);
        match &self.token {
            Some(t) => rb.bearer_auth(t),
            None => rb,
        }
    }
}

#[async_trait]
impl OrderService for HttpOrderService {
    async fn list_orders(&self) -> Result<Vec<Order>, ServiceError> {
        let resp = self
            .request(reqwest::Method::GET, self.orders_url())
            .send()
            .await
            .map_err(map_send_error)?;
        let body = read_body(resp, Action::List).await?;

        let items = match body {
            Value::Array(items) => items,
            other => match other.get("orders").cloned() {
                Some(Value::Array(items)) => items,
                _ => {
                    return Err(ServiceError::Decode(
                        "orders payload is not an array".to_string(),
                    ))
                }
            },
        };

        let orders = items
            .iter()
            .map(|v| Order::from_value(v).map_err(|e| ServiceError::Decode(e.to_string())))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(count = orders.len(), "orders listed");
        Ok(orders)
    }

    async fn accept_order(
        &self,
        order_id: &str,
        staff: &StaffIdentity,
    ) -> Result<Order, ServiceError> {
        let resp = self
            .request(reqwest::Method::POST, self.take_url(order_id))
            .json(staff)
            .send()
            .await
            .map_err(map_send_error)?;
        let body = read_body(resp, Action::Workflow).await?;
        let record = body.get("order").filter(|o| o.is_object()).unwrap_or(&body);
        Order::from_value(record).map_err(|e| ServiceError::Decode(e.to_string()))
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Action {
    List,
    Workflow,
}

fn map_send_error(e: reqwest::Error) -> ServiceError {
    ServiceError::TransientNetwork(e.to_string())
}

/// Classify the status, unwrap the envelope and return its `data`.
async fn read_body(resp: reqwest::Response, action: Action) -> Result<Value, ServiceError> {
    let status = resp.status();
    let text = resp
        .text()
        .await
        .map_err(|e| ServiceError::TransientNetwork(e.to_string()))?;
    let parsed: Option<Value> = serde_json::from_str(&text).ok().map(unwrap_proxy_body);

    if !status.is_success() {
        let message = parsed
            .as_ref()
            .and_then(envelope_message)
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
        return Err(classify_status(status.as_u16(), message, action));
    }

    let body = parsed.ok_or_else(|| ServiceError::Decode("response is not JSON".to_string()))?;

    match body.get("success").and_then(Value::as_bool) {
        Some(false) => Err(ServiceError::Rejected {
            status: status.as_u16(),
            message: envelope_message(&body).unwrap_or_else(|| "request failed".to_string()),
        }),
        Some(true) => body
            .get("data")
            .cloned()
            .ok_or_else(|| ServiceError::Decode("envelope has no data".to_string())),
        None if body.is_object() && body.get("data").is_some() => Ok(body["data"].clone()),
        None => Ok(body),
    }
}

fn unwrap_proxy_body(v: Value) -> Value {
    match v.get("body").and_then(Value::as_str) {
        Some(inner) => serde_json::from_str(inner).unwrap_or(v),
        None => v,
    }
}

fn envelope_message(v: &Value) -> Option<String> {
    v.get("message")
        .or_else(|| v.get("error"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn classify_status(status: u16, message: String, action: Action) -> ServiceError {
    match status {
        500..=599 => ServiceError::TransientNetwork(format!("HTTP {status}: {message}")),
        // The service answers 400 when the order is no longer PENDING.
        400 | 409 if action == Action::Workflow => ServiceError::Conflict { message },
        408 | 429 => ServiceError::TransientNetwork(format!("HTTP {status}: {message}")),
        _ => ServiceError::Rejected { status, message },
    }
}
