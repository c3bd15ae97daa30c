mod common;

use serial_test::serial;
use stockpulse_core::{Settings, API_URL_ENV};

#[test]
#[serial]
fn test_env_overrides_file_base_url() {
    let home = tempfile::TempDir::new().unwrap();
    let paths = common::stockpulse_paths(home.path());
    std::fs::create_dir_all(&paths.root).unwrap();
    std::fs::write(
        paths.config_file(),
        r#"{"api": {"base_url": "http://from-file/api"}, "smooth_progress": true}"#,
    )
    .unwrap();

    std::env::set_var(API_URL_ENV, "http://from-env/api/v1/");
    let settings = Settings::load(&paths.config_file()).with_env();
    std::env::remove_var(API_URL_ENV);

    assert_eq!(settings.api.base_url, "http://from-env/api/v1");
    assert!(settings.smooth_progress);
}

#[test]
#[serial]
fn test_blank_env_keeps_file_value() {
    let home = tempfile::TempDir::new().unwrap();
    let paths = common::stockpulse_paths(home.path());
    std::fs::create_dir_all(&paths.root).unwrap();
    std::fs::write(paths.config_file(), r#"{"api": {"base_url": "http://from-file/api"}}"#).unwrap();

    std::env::set_var(API_URL_ENV, "   ");
    let settings = Settings::load(&paths.config_file()).with_env();
    std::env::remove_var(API_URL_ENV);

    assert_eq!(settings.api.base_url, "http://from-file/api");
}

#[test]
#[serial]
fn test_missing_file_uses_defaults() {
    std::env::remove_var(API_URL_ENV);
    let home = tempfile::TempDir::new().unwrap();
    let settings = Settings::load(&common::stockpulse_paths(home.path()).config_file()).with_env();
    assert_eq!(settings, Settings::new());
}
