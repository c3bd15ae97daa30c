#![allow(dead_code)]

use std::path::Path;
use std::process::{Command, Output};
use std::sync::Arc;
use stockpulse_core::{CacheConfig, SessionConfig, SystemClock};
use stockpulse_store::{CacheStore, Paths, SessionStore, SqliteStore};

/// Stores opened on the database the binary uses under `home`
pub struct HomeStores {
    pub cache: CacheStore,
    pub sessions: SessionStore,
}

pub fn stockpulse_paths(home: &Path) -> Paths {
    Paths::with_root(home.join(".stockpulse"))
}

pub fn open_stores(home: &Path) -> HomeStores {
    let kv = Arc::new(SqliteStore::open(&stockpulse_paths(home).store_db()).unwrap());
    let clock = Arc::new(SystemClock);
    HomeStores {
        cache: CacheStore::new(kv.clone(), clock.clone(), CacheConfig::new()),
        sessions: SessionStore::new(kv, clock, SessionConfig::new()),
    }
}

/// Run the binary with `home` as the user's home directory
pub fn stockpulse(home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_stockpulse"))
        .args(args)
        .env("HOME", home)
        .env_remove("STOCKPULSE_API_URL")
        .env("RUST_LOG", "warn")
        .output()
        .unwrap()
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}
