use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

// ---------------------------------------------------------------------------
// OrderStatus
// ---------------------------------------------------------------------------

/// Fulfilment status of an order as owned by the order service.
///
/// The pipeline is totally ordered (`Pending` → `Completed`). `Cancelled` sits
/// outside the pipeline and is reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OrderStatus {
    Pending,
    Received,
    Cooking,
    Cooked,
    Packed,
    Delivering,
    Completed,
    Cancelled,
}

impl OrderStatus {
    /// The fulfilment pipeline in order. `Cancelled` is not part of it.
    pub const PIPELINE: [OrderStatus; 7] = [
        OrderStatus::Pending,
        OrderStatus::Received,
        OrderStatus::Cooking,
        OrderStatus::Cooked,
        OrderStatus::Packed,
        OrderStatus::Delivering,
        OrderStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Received => "RECEIVED",
            OrderStatus::Cooking => "COOKING",
            OrderStatus::Cooked => "COOKED",
            OrderStatus::Packed => "PACKED",
            OrderStatus::Delivering => "DELIVERING",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    /// Position in [`OrderStatus::PIPELINE`]; `None` for `Cancelled`.
    pub fn pipeline_index(&self) -> Option<usize> {
        Self::PIPELINE.iter().position(|s| s == self)
    }

    /// `true` if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    /// Parse a status string case-insensitively.
    ///
    /// The backend's older status model spells two stages differently
    /// (`PACKING`, `DELIVERY`); both are accepted as aliases.
    pub fn parse(s: &str) -> Result<Self, SchemaError> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "PENDING" => Ok(OrderStatus::Pending),
            "RECEIVED" => Ok(OrderStatus::Received),
            "COOKING" => Ok(OrderStatus::Cooking),
            "COOKED" => Ok(OrderStatus::Cooked),
            "PACKED" | "PACKING" => Ok(OrderStatus::Packed),
            "DELIVERING" | "DELIVERY" => Ok(OrderStatus::Delivering),
            "COMPLETED" => Ok(OrderStatus::Completed),
            "CANCELLED" | "CANCELED" => Ok(OrderStatus::Cancelled),
            other => Err(SchemaError::UnknownStatus(other.to_string())),
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::parse(s)
    }
}

impl Serialize for OrderStatus {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for OrderStatus {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        OrderStatus::parse(&raw).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// SchemaError
// ---------------------------------------------------------------------------

/// Structural problems with an order record received from the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    UnknownStatus(String),
    EmptyOrderId,
    ZeroQuantity { order_id: String, item: String },
    NegativeTotal { order_id: String, total_cents: i64 },
    Decode(String),
}

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaError::UnknownStatus(s) => write!(f, "unknown order status '{s}'"),
            SchemaError::EmptyOrderId => write!(f, "order record has an empty orderId"),
            SchemaError::ZeroQuantity { order_id, item } => {
                write!(f, "order {order_id}: line item '{item}' has quantity 0")
            }
            SchemaError::NegativeTotal {
                order_id,
                total_cents,
            } => write!(f, "order {order_id}: negative total ({total_cents} cents)"),
            SchemaError::Decode(msg) => write!(f, "order decode failed: {msg}"),
        }
    }
}

impl std::error::Error for SchemaError {}

// ---------------------------------------------------------------------------
// Order
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub name: String,
    pub quantity: u32,
}

impl LineItem {
    pub fn new(name: impl Into<String>, quantity: u32) -> Self {
        Self {
            name: name.into(),
            quantity,
        }
    }
}

/// Read-through cached copy of a server-owned order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(alias = "id")]
    pub order_id: String,
    #[serde(alias = "customer", default)]
    pub customer_name: String,
    #[serde(default)]
    pub items: Vec<LineItem>,
    #[serde(rename = "total", with = "crate::money::serde_cents")]
    pub total_cents: i64,
    pub status: OrderStatus,
    #[serde(with = "serde_ts")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(
        default,
        with = "serde_ts_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn new(
        order_id: impl Into<String>,
        customer_name: impl Into<String>,
        items: Vec<LineItem>,
        total_cents: i64,
        status: OrderStatus,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            customer_name: customer_name.into(),
            items,
            total_cents,
            status,
            created_at,
            order_type: None,
            assigned_to: None,
            updated_at: None,
        }
    }

    /// Enforce the record-level invariants: non-empty id, every line item
    /// quantity ≥ 1, total ≥ 0.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.order_id.trim().is_empty() {
            return Err(SchemaError::EmptyOrderId);
        }
        if let Some(item) = self.items.iter().find(|i| i.quantity == 0) {
            return Err(SchemaError::ZeroQuantity {
                order_id: self.order_id.clone(),
                item: item.name.clone(),
            });
        }
        if self.total_cents < 0 {
            return Err(SchemaError::NegativeTotal {
                order_id: self.order_id.clone(),
                total_cents: self.total_cents,
            });
        }
        Ok(())
    }

    /// Decode and validate one order from a JSON value.
    pub fn from_value(v: &Value) -> Result<Self, SchemaError> {
        let order: Order =
            serde_json::from_value(v.clone()).map_err(|e| SchemaError::Decode(e.to_string()))?;
        order.validate()?;
        Ok(order)
    }
}

// ---------------------------------------------------------------------------
// OrderPatch
// ---------------------------------------------------------------------------

/// Partial order record carried by an `order_update` push event.
///
/// Only `order_id` is required; every present field overwrites the cached
/// entry's field when merged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPatch {
    #[serde(alias = "id")]
    pub order_id: String,
    #[serde(alias = "customer", default, skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<LineItem>>,
    #[serde(
        rename = "total",
        default,
        with = "crate::money::serde_cents_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub total_cents: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,
    #[serde(
        default,
        with = "serde_ts_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(
        default,
        with = "serde_ts_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<DateTime<Utc>>,
}

impl OrderPatch {
    pub fn status_only(order_id: impl Into<String>, status: OrderStatus) -> Self {
        Self {
            order_id: order_id.into(),
            status: Some(status),
            ..Self::default()
        }
    }

    /// Decode a patch from an `order_update` payload.
    ///
    /// Two shapes are accepted: the order record itself, or the backend
    /// broadcast envelope `{orderId, status, order: {...}}` where the
    /// top-level `orderId`/`status` win over the nested record.
    pub fn from_value(v: &Value) -> Result<Self, SchemaError> {
        let decode = |v: &Value| -> Result<OrderPatch, SchemaError> {
            serde_json::from_value(v.clone()).map_err(|e| SchemaError::Decode(e.to_string()))
        };

        let mut patch = match v.get("order").filter(|o| o.is_object()) {
            Some(nested) => {
                let mut inner = nested.clone();
                if let (Some(obj), Some(id)) = (inner.as_object_mut(), v.get("orderId")) {
                    obj.insert("orderId".to_string(), id.clone());
                }
                decode(&inner)?
            }
            None => decode(v)?,
        };

        if let Some(raw) = v.get("status").and_then(Value::as_str) {
            patch.status = Some(OrderStatus::parse(raw)?);
        }
        if patch.order_id.trim().is_empty() {
            return Err(SchemaError::EmptyOrderId);
        }
        if let Some(items) = &patch.items {
            if let Some(item) = items.iter().find(|i| i.quantity == 0) {
                return Err(SchemaError::ZeroQuantity {
                    order_id: patch.order_id.clone(),
                    item: item.name.clone(),
                });
            }
        }
        if let Some(total) = patch.total_cents.filter(|t| *t < 0) {
            return Err(SchemaError::NegativeTotal {
                order_id: patch.order_id.clone(),
                total_cents: total,
            });
        }
        Ok(patch)
    }

    /// Overwrite every field of `order` that this patch carries.
    pub fn apply_to(&self, order: &mut Order) {
        if let Some(v) = &self.customer_name {
            order.customer_name = v.clone();
        }
        if let Some(v) = &self.items {
            order.items = v.clone();
        }
        if let Some(v) = self.total_cents {
            order.total_cents = v;
        }
        if let Some(v) = self.status {
            order.status = v;
        }
        if let Some(v) = self.created_at {
            order.created_at = v;
        }
        if let Some(v) = &self.order_type {
            order.order_type = Some(v.clone());
        }
        if let Some(v) = &self.assigned_to {
            order.assigned_to = Some(v.clone());
        }
        if let Some(v) = self.updated_at {
            order.updated_at = Some(v);
        }
    }

    /// Build a full order when the patch carries every required field.
    pub fn to_order(&self) -> Option<Order> {
        let order = Order {
            order_id: self.order_id.clone(),
            customer_name: self.customer_name.clone()?,
            items: self.items.clone()?,
            total_cents: self.total_cents?,
            status: self.status?,
            created_at: self.created_at?,
            order_type: self.order_type.clone(),
            assigned_to: self.assigned_to.clone(),
            updated_at: self.updated_at,
        };
        order.validate().ok()?;
        Some(order)
    }
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// Parse a service timestamp.
///
/// RFC 3339 is preferred; naive ISO timestamps (the backend writes
/// `datetime.utcnow().isoformat()`) are read as UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, SchemaError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|n| n.and_utc())
        .map_err(|e| SchemaError::Decode(format!("bad timestamp '{raw}': {e}")))
}

mod serde_ts {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_timestamp(&raw).map_err(serde::de::Error::custom)
    }
}

mod serde_ts_opt {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &Option<DateTime<Utc>>, s: S) -> Result<S::Ok, S::Error> {
        match ts {
            Some(ts) => s.serialize_some(&ts.to_rfc3339_opts(SecondsFormat::Millis, true)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<String>::deserialize(d)? {
            Some(raw) if !raw.trim().is_empty() => super::parse_timestamp(&raw)
                .map(Some)
                .map_err(serde::de::Error::custom),
            _ => Ok(None),
        }
    }
}
