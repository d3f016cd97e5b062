//! Scenario: Literal Secrets Are Rejected
//!
//! # Invariants under test
//!
//! 1. A JWT pasted into YAML fails loading with CONFIG_SECRET_DETECTED.
//! 2. The error never echoes the secret value.
//! 3. An env var name loads fine and stays a name.

use ops_config::load_layered_yaml_from_strings;

const YAML_WITH_JWT: &str = r#"
service:
  tenant_id: "store-042"
auth:
  token_env: "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9.eyJzdWIiOiJzdGFmZiJ9.sig"
"#;

const YAML_WITH_ENV_NAME: &str = r#"
service:
  tenant_id: "store-042"
auth:
  token_env: "OPS_SERVICE_TOKEN_STORE_042"
"#;

#[test]
fn literal_jwt_is_rejected() {
    let err = load_layered_yaml_from_strings(&[YAML_WITH_JWT]).unwrap_err();
    let msg = format!("{err:#}");
    assert!(msg.contains("CONFIG_SECRET_DETECTED"), "got: {msg}");
    assert!(msg.contains("/auth/token_env"));
    assert!(!msg.contains("eyJhbGci"), "secret must not be echoed");
}

#[test]
fn secret_in_overlay_is_also_rejected() {
    let overlay = "service:\n  ws_url: \"Bearer abcdefghijklmnop\"\n";
    let err = load_layered_yaml_from_strings(&[YAML_WITH_ENV_NAME, overlay]).unwrap_err();
    assert!(format!("{err:#}").contains("CONFIG_SECRET_DETECTED"));
}

#[test]
fn env_var_name_is_allowed() {
    let loaded = load_layered_yaml_from_strings(&[YAML_WITH_ENV_NAME]).unwrap();
    assert_eq!(
        loaded.typed().unwrap().auth.token_env,
        "OPS_SERVICE_TOKEN_STORE_042"
    );
}
