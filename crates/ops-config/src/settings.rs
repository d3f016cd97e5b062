//! Typed view of the merged configuration.
//!
//! Every section and key is optional in YAML; absent keys take the defaults
//! below. [`OpsConfig::validate`] rejects values the engine cannot run with.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OpsConfig {
    pub service: ServiceConfig,
    pub auth: AuthConfig,
    pub poll: PollConfig,
    pub push: PushSection,
    pub notifications: NotificationsConfig,
    pub slow_orders: SlowOrdersConfig,
    pub daemon: DaemonConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// REST base, e.g. `https://api.example.com/api/v1`.
    pub base_url: String,
    /// Push channel endpoint, without query string.
    pub ws_url: String,
    pub tenant_id: String,
    pub request_timeout_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api/v1".to_string(),
            ws_url: "ws://localhost:8000/ws".to_string(),
            tenant_id: String::new(),
            request_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Name of the environment variable holding the bearer token.
    pub token_env: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_env: crate::DEFAULT_TOKEN_ENV.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub interval_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self { interval_ms: 15_000 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushSection {
    pub enabled: bool,
    pub base_delay_ms: u64,
    pub max_attempts: u32,
    pub channels: Vec<String>,
}

impl Default for PushSection {
    fn default() -> Self {
        Self {
            enabled: true,
            base_delay_ms: 3_000,
            max_attempts: 5,
            channels: ["orders", "kitchen", "inventory", "staff"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    pub history_cap: usize,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self { history_cap: 50 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlowOrdersConfig {
    pub threshold_mins: i64,
    pub check_interval_ms: u64,
}

impl Default for SlowOrdersConfig {
    fn default() -> Self {
        Self {
            threshold_mins: 15,
            check_interval_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub bind_addr: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8899".to_string(),
        }
    }
}

impl OpsConfig {
    /// Deserialize and validate.
    pub fn from_json(config_json: &Value) -> Result<Self> {
        let cfg: OpsConfig =
            serde_json::from_value(config_json.clone()).context("CONFIG_INVALID: bad shape")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.service.base_url.trim().is_empty() {
            bail!("CONFIG_INVALID: service.base_url must not be empty");
        }
        if self.service.tenant_id.trim().is_empty() {
            bail!("CONFIG_INVALID: service.tenant_id must not be empty");
        }
        if self.push.enabled && self.service.ws_url.trim().is_empty() {
            bail!("CONFIG_INVALID: service.ws_url is required when push.enabled");
        }
        if self.poll.interval_ms == 0 {
            bail!("CONFIG_INVALID: poll.interval_ms must be > 0");
        }
        if self.service.request_timeout_ms == 0 {
            bail!("CONFIG_INVALID: service.request_timeout_ms must be > 0");
        }
        // A poll must be able to finish before the next tick supersedes it.
        if self.service.request_timeout_ms >= self.poll.interval_ms {
            bail!(
                "CONFIG_INVALID: service.request_timeout_ms ({}) must be below poll.interval_ms ({})",
                self.service.request_timeout_ms,
                self.poll.interval_ms
            );
        }
        if self.notifications.history_cap == 0 {
            bail!("CONFIG_INVALID: notifications.history_cap must be > 0");
        }
        if self.slow_orders.threshold_mins <= 0 || self.slow_orders.check_interval_ms == 0 {
            bail!("CONFIG_INVALID: slow_orders threshold and interval must be > 0");
        }
        if self.auth.token_env.trim().is_empty() {
            bail!("CONFIG_INVALID: auth.token_env must name an environment variable");
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll.interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.service.request_timeout_ms)
    }

    pub fn push_base_delay(&self) -> Duration {
        Duration::from_millis(self.push.base_delay_ms)
    }

    pub fn slow_check_interval(&self) -> Duration {
        Duration::from_millis(self.slow_orders.check_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_fill_absent_sections() {
        let cfg = OpsConfig::from_json(&json!({ "service": { "tenant_id": "T1" } })).unwrap();
        assert_eq!(cfg.poll.interval_ms, 15_000);
        assert_eq!(cfg.service.request_timeout_ms, 10_000);
        assert_eq!(cfg.push.max_attempts, 5);
        assert_eq!(cfg.push.base_delay_ms, 3_000);
        assert_eq!(cfg.notifications.history_cap, 50);
        assert_eq!(cfg.slow_orders.threshold_mins, 15);
        assert_eq!(cfg.daemon.bind_addr, "127.0.0.1:8899");
    }

    #[test]
    fn tenant_is_required() {
        let err = OpsConfig::from_json(&json!({})).unwrap_err();
        assert!(err.to_string().contains("tenant_id"));
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let err = OpsConfig::from_json(&json!({
            "service": { "tenant_id": "T1" },
            "poll": { "interval_ms": 0 }
        }))
        .unwrap_err();
        assert!(err.to_string().contains("poll.interval_ms"));
    }

    #[test]
    fn timeout_must_be_below_poll_interval() {
        let err = OpsConfig::from_json(&json!({
            "service": { "tenant_id": "T1", "request_timeout_ms": 15_000 },
            "poll": { "interval_ms": 15_000 }
        }))
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("CONFIG_INVALID"));
        assert!(msg.contains("request_timeout_ms"));

        let cfg = OpsConfig::from_json(&json!({
            "service": { "tenant_id": "T1", "request_timeout_ms": 14_999 },
            "poll": { "interval_ms": 15_000 }
        }))
        .unwrap();
        assert_eq!(cfg.request_timeout(), Duration::from_millis(14_999));
    }

    #[test]
    fn wrong_type_is_a_shape_error() {
        let err = OpsConfig::from_json(&json!({
            "service": { "tenant_id": "T1" },
            "push": { "max_attempts": "five" }
        }))
        .unwrap_err();
        assert!(format!("{err:#}").contains("CONFIG_INVALID"));
    }
}
