//! ---
//! prov_section: "01-core-functionality"
//! prov_subsection: "tests"
//! prov_type: "source"
//! prov_scope: "code"
//! prov_description: "Configuration parsing and validation tests."
//! prov_version: "v0.0.0-prealpha"
//! prov_owner: "tbd"
//! ---
use std::str::FromStr;

use prov_common::config::{AppConfig, Mode};
use prov_common::LogFormat;
use tempfile::tempdir;

#[test]
fn empty_document_yields_defaults() {
    let config = AppConfig::from_str("").unwrap();
    assert_eq!(config.mode, Mode::Production);
    assert!(config.provisioning.cleanup_allowed);
    assert_eq!(config.logging.format, LogFormat::StructuredJson);
    assert_eq!(
        config.provisioning.build_trigger.base_url("prov"),
        "https://webhook-proxy-prov-cd.192.168.56.101.nip.io"
    );
}

#[test]
fn parses_provisioning_section() {
    let config = AppConfig::from_str(
        r#"
mode = "simulation"

[provisioning]
cleanup_allowed = false

[provisioning.build_trigger]
domain = "apps.example.org"
trigger_secret = "secret101"

[provisioning.quickstarters.be-python-flask]
description = "Backend - Python/Flask"

[storage]
directory = "/var/lib/provd"
"#,
    )
    .unwrap();

    assert!(config.mode.is_simulation());
    assert!(!config.provisioning.cleanup_allowed);
    assert_eq!(config.provisioning.build_trigger.trigger_secret, "secret101");
    assert_eq!(
        config.provisioning.build_trigger.base_url("testp"),
        "https://webhook-proxy-testp-cd.apps.example.org"
    );
    let template = config
        .provisioning
        .quickstarter("be-python-flask")
        .expect("catalog entry");
    assert_eq!(template.description.as_deref(), Some("Backend - Python/Flask"));
    assert!(template.job_name.is_none());
    assert_eq!(config.storage.directory.to_str(), Some("/var/lib/provd"));
}

#[test]
fn host_pattern_without_project_placeholder_is_rejected() {
    let err = AppConfig::from_str(
        r#"
[provisioning.build_trigger]
host_pattern = "https://static-proxy.example.org"
"#,
    )
    .unwrap_err();
    assert!(format!("{err:#}").contains("{project}"));
}

#[test]
fn load_picks_first_existing_candidate() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("missing.toml");
    let present = dir.path().join("present.toml");
    std::fs::write(&present, "mode = \"simulation\"\n").unwrap();

    let loaded = AppConfig::load_with_source(&[missing, present.clone()]).unwrap();
    assert_eq!(loaded.source, present);
    assert!(loaded.config.mode.is_simulation());
}

#[test]
fn shipped_example_config_parses() {
    let config: AppConfig = include_str!("../../../configs/provd.example.toml")
        .parse()
        .expect("example config parses");
    assert!(config.mode.is_simulation());
    assert_eq!(config.logging.format, LogFormat::Pretty);
    assert_eq!(
        config
            .provisioning
            .quickstarter("be-golang-plain")
            .and_then(|template| template.job_name.as_deref()),
        Some("beGolangPlain")
    );
}
