use std::time::{SystemTime, UNIX_EPOCH};

use menuicon_core::config::{self, Config, ConfigError};
use menuicon_core::model::IconSize;

fn unique_config_path(tag: &str) -> std::path::PathBuf {
    let unique = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock should be after epoch")
        .as_nanos();
    std::env::temp_dir()
        .join(format!("menuicon-config-{tag}-{unique}"))
        .join("config.toml")
}

#[test]
fn accepts_default_config() {
    let cfg = Config::default();
    assert_eq!(cfg.icon_size, IconSize::Small);
    assert_eq!(cfg.placeholder_alpha, 128);
    assert!(cfg.config_path.to_string_lossy().contains("menuicon"));
    assert!(config::validate(&cfg).is_ok());
}

#[test]
fn rejects_opaque_or_invisible_placeholder() {
    for alpha in [0, 255] {
        let cfg = Config {
            placeholder_alpha: alpha,
            ..Default::default()
        };
        assert!(config::validate(&cfg).is_err(), "alpha {alpha}");
    }
}

#[test]
fn missing_file_loads_defaults() {
    let path = unique_config_path("missing");
    let cfg = config::load(Some(&path)).expect("missing config should load defaults");
    assert_eq!(cfg.icon_size, IconSize::Small);
    assert_eq!(cfg.config_path, path);
}

#[test]
fn saved_config_loads_back() {
    let path = unique_config_path("roundtrip");
    let cfg = Config {
        icon_size: IconSize::Large,
        placeholder_alpha: 200,
        config_path: path.clone(),
    };

    config::save(&cfg).expect("config should save");
    let loaded = config::load(Some(&path)).expect("config should load");

    assert_eq!(loaded, cfg);
    std::fs::remove_dir_all(path.parent().unwrap()).unwrap();
}

#[test]
fn partial_file_fills_in_defaults() {
    let path = unique_config_path("partial");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "icon_size = \"large\"\n").unwrap();

    let loaded = config::load(Some(&path)).expect("partial config should load");

    assert_eq!(loaded.icon_size, IconSize::Large);
    assert_eq!(loaded.placeholder_alpha, 128);
    std::fs::remove_dir_all(path.parent().unwrap()).unwrap();
}

#[test]
fn invalid_values_in_file_are_rejected() {
    let path = unique_config_path("invalid");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "placeholder_alpha = 0\n").unwrap();

    let error = config::load(Some(&path)).unwrap_err();

    assert!(matches!(error, ConfigError::Invalid(_)));
    std::fs::remove_dir_all(path.parent().unwrap()).unwrap();
}

#[test]
fn malformed_file_is_a_parse_error() {
    let path = unique_config_path("malformed");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "icon_size = \"huge\"\n").unwrap();

    let error = config::load(Some(&path)).unwrap_err();

    assert!(matches!(error, ConfigError::Parse(_)));
    std::fs::remove_dir_all(path.parent().unwrap()).unwrap();
}
