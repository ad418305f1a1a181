use crate::config::models::*;
use std::io::Write;

#[test]
fn test_default_config() {
    let config = AppConfig::default();
    assert!(config.validate().is_ok());

    // 验证默认值
    assert_eq!(config.segmentation.max_user_data_octets, 140);
    assert_eq!(config.segmentation.concat_header_octets, 6);
    assert_eq!(config.slot_store.backend, SlotStoreBackend::Memory);
    assert_eq!(config.slot_store.record_size, 175);
    assert!(config.fallback.ims_enabled);
}

#[test]
fn test_config_from_toml() {
    let toml_content = r#"
[segmentation]
max_user_data_octets = 140
concat_header_octets = 0
port_header_octets = 6

[slot_store]
backend = "sqlite"
capacity = 4
record_size = 175
database_url = "sqlite::memory:"

[tracking]
retirement_timeout_seconds = 60
sweep_interval_seconds = 5

[fallback]
ims_enabled = false

[observability]
log_level = "debug"
log_format = "json"
"#;

    let config = AppConfig::from_toml(toml_content).unwrap();
    assert_eq!(config.segmentation.concat_header_octets, 0);
    assert_eq!(config.slot_store.backend, SlotStoreBackend::Sqlite);
    assert_eq!(config.slot_store.capacity, 4);
    assert_eq!(config.tracking.retirement_timeout().as_secs(), 60);
    assert!(!config.fallback.ims_enabled);
    assert_eq!(config.observability.log_format, "json");
}

#[test]
fn test_config_toml_serialization() {
    let config = AppConfig::default();
    let toml_str = config.to_toml().unwrap();
    assert!(toml_str.contains("[slot_store]"));
    assert!(!toml_str.contains("database_url"));

    let parsed = AppConfig::from_toml(&toml_str).unwrap();
    assert_eq!(parsed, config);
}

#[test]
fn test_sqlite_backend_requires_url() {
    let mut config = AppConfig::default();
    config.slot_store.backend = SlotStoreBackend::Sqlite;
    assert!(config.validate().is_err());

    config.slot_store.database_url = Some("postgres://localhost/sms".to_string());
    assert!(config.validate().is_err());

    config.slot_store.database_url = Some("sqlite://slots.db".to_string());
    assert!(config.validate().is_ok());
}

#[test]
fn test_invalid_values_rejected() {
    let mut config = AppConfig::default();
    config.slot_store.capacity = 0;
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.segmentation.concat_header_octets = 139;
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.tracking.sweep_interval_seconds = 0;
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.observability.log_level = "verbose".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_load_from_file_merges_defaults() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        r#"
[slot_store]
backend = "memory"
capacity = 8
record_size = 175
"#
    )
    .unwrap();

    let path = file.path().to_str().unwrap().to_string();
    let config = AppConfig::load(Some(&path)).unwrap();
    assert_eq!(config.slot_store.capacity, 8);
    // 未在文件中出现的配置项使用默认值
    assert_eq!(config.segmentation.max_user_data_octets, 140);
    assert_eq!(config.tracking.retirement_timeout_seconds, 300);
}

#[test]
fn test_load_missing_file_fails() {
    let result = AppConfig::load(Some("/nonexistent/sms-dispatch.toml"));
    assert!(result.is_err());
}
