mod common;

use common::{open_stores, stdout, stockpulse, stockpulse_paths};
use serde_json::json;
use std::time::Duration;
use stockpulse_store::CacheOptions;

#[test]
fn test_version_command() {
    let home = tempfile::TempDir::new().unwrap();
    let output = stockpulse(home.path(), &["version"]);
    assert!(output.status.success());
    assert!(stdout(&output).starts_with(&format!("stockpulse {}", env!("CARGO_PKG_VERSION"))));
}

#[test]
fn test_session_commands() {
    let home = tempfile::TempDir::new().unwrap();

    let output = stockpulse(home.path(), &["session", "list"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("No saved sessions"));

    {
        let stores = open_stores(home.path());
        stores.sessions.record("t-42", "600519", "comprehensive").unwrap();
    }

    let output = stockpulse(home.path(), &["session"]);
    assert!(stdout(&output).contains("600519 | task:t-42 kind:comprehensive"));

    let output = stockpulse(home.path(), &["session", "show", "600519"]);
    let record: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(record["taskId"], "t-42");

    let output = stockpulse(home.path(), &["session", "clear", "600519"]);
    assert!(output.status.success());
    let output = stockpulse(home.path(), &["session", "show", "600519"]);
    assert!(stdout(&output).contains("No live session for 600519"));
}

#[test]
fn test_cache_commands() {
    let home = tempfile::TempDir::new().unwrap();

    let output = stockpulse(home.path(), &["cache", "stats"]);
    assert!(stdout(&output).contains("Cache is empty"));

    {
        let stores = open_stores(home.path());
        let options = CacheOptions::ttl(Duration::from_secs(3600));
        stores
            .cache
            .set("task_result_t-1", &json!({"basic_info": {"stock_code": "600519"}}), options)
            .unwrap();
        stores
            .cache
            .set("task_module_t-1_market_data", &json!({"price": 1688}), options.compressed(true))
            .unwrap();
        stores
            .cache
            .set("stale", &json!(1), CacheOptions::ttl(Duration::ZERO))
            .unwrap();
    }

    let output = stockpulse(home.path(), &["cache", "stats"]);
    let text = stdout(&output);
    assert!(text.contains("Entries: 3"), "{}", text);
    assert!(text.contains("Expired: 1"), "{}", text);

    let output = stockpulse(home.path(), &["cache", "sweep"]);
    assert!(stdout(&output).contains("Removed 1 expired entries"));

    let output = stockpulse(home.path(), &["cache", "clear"]);
    assert!(stdout(&output).contains("Removed 2 entries"));
    assert!(open_stores(home.path()).cache.stats().count == 0);
}

#[test]
fn test_unreachable_backend_fails_cleanly() {
    let home = tempfile::TempDir::new().unwrap();
    let paths = stockpulse_paths(home.path());
    std::fs::create_dir_all(&paths.root).unwrap();
    std::fs::write(
        paths.config_file(),
        r#"{"api": {"base_url": "http://127.0.0.1:9/api/v1", "retry": {"max_attempts": 1}}}"#,
    )
    .unwrap();

    let output = stockpulse(home.path(), &["status", "t-1"]);
    assert!(!output.status.success());
    assert!(stdout(&output).is_empty());
}

#[test]
fn test_unknown_subcommand_is_rejected() {
    let home = tempfile::TempDir::new().unwrap();
    let output = stockpulse(home.path(), &["frobnicate"]);
    assert!(!output.status.success());
}
