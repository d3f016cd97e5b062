//! Runtime secret resolution.
//!
//! # Contract
//! - Config YAML stores only the env var **name** (`auth.token_env`).
//! - Callers invoke [`resolve_secrets`] once at startup and pass the result
//!   into constructors.
//! - `Debug` redacts values; errors name the variable, never the value.

use anyhow::{bail, Result};

use crate::OpsConfig;

pub const DEFAULT_TOKEN_ENV: &str = "OPS_SERVICE_TOKEN";

#[derive(Clone)]
pub struct ResolvedSecrets {
    /// Bearer token for the order service. Also carried on the push URL.
    pub service_token: Option<String>,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field(
                "service_token",
                &self.service_token.as_ref().map(|_| "<REDACTED>"),
            )
            .finish()
    }
}

fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

/// Read the token named by `auth.token_env`.
///
/// The push channel authenticates with the token in its URL, so a missing
/// token is an error when `push.enabled`. Without push, REST calls go out
/// unauthenticated and the service decides.
pub fn resolve_secrets(cfg: &OpsConfig) -> Result<ResolvedSecrets> {
    let var = cfg.auth.token_env.trim();
    let service_token = resolve_env(var);

    if cfg.push.enabled && service_token.is_none() {
        bail!(
            "SECRETS_MISSING: required env var '{}' (service token) is not set or empty; \
             it is needed for the push channel (push.enabled=true)",
            var
        );
    }

    Ok(ResolvedSecrets { service_token })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_never_prints_token() {
        let s = ResolvedSecrets {
            service_token: Some("top-secret-token".into()),
        };
        let dbg = format!("{s:?}");
        assert!(dbg.contains("<REDACTED>"));
        assert!(!dbg.contains("top-secret-token"));
    }
}
