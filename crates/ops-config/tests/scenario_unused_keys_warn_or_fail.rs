//! Scenario: Unused Config Keys
//!
//! # Invariants under test
//!
//! 1. Unused keys are reported under `Warn` without an error.
//! 2. Unused keys are an error under `Fail`.
//! 3. Keys under consumed prefixes are not flagged.
//! 4. Unused pointers are sorted.

use ops_config::{load_layered_yaml_from_strings, report_unused_keys, UnusedKeyPolicy};

#[test]
fn warn_reports_without_error() {
    let yaml = r#"
service:
  tenant_id: "store-042"
  region: "mx-central"
menu:
  refresh: 60
"#;
    let loaded = load_layered_yaml_from_strings(&[yaml]).unwrap();
    let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn).unwrap();
    assert_eq!(
        report.unused_leaf_pointers,
        vec!["/menu/refresh".to_string(), "/service/region".to_string()]
    );
}

#[test]
fn fail_errors_on_unused() {
    let yaml = "service:\n  tenant_id: \"store-042\"\nlegacy:\n  flag: true\n";
    let loaded = load_layered_yaml_from_strings(&[yaml]).unwrap();
    let err = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Fail).unwrap_err();
    assert!(format!("{err:#}").contains("CONFIG_UNUSED_KEYS"));
}

#[test]
fn consumed_subtrees_are_clean() {
    let yaml = r#"
service:
  base_url: "https://orders.example.com/api/v1"
  tenant_id: "store-042"
push:
  enabled: true
  channels: ["orders", "kitchen"]
slow_orders:
  threshold_mins: 20
"#;
    let loaded = load_layered_yaml_from_strings(&[yaml]).unwrap();
    let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Fail).unwrap();
    assert!(report.is_clean());
}
