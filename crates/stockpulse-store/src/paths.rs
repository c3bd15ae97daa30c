//! Locations of the local store and settings file

use std::path::PathBuf;

/// Resolves standard paths under `~/.stockpulse`
#[derive(Debug, Clone)]
pub struct Paths {
    pub root: PathBuf,
}

impl Paths {
    pub fn new() -> std::io::Result<Self> {
        let home = dirs::home_dir().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "home directory not found")
        })?;
        Ok(Self::with_root(home.join(".stockpulse")))
    }

    /// Use an explicit root, e.g. a temp dir in tests
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// SQLite database holding cache entries and sessions
    pub fn store_db(&self) -> PathBuf {
        self.root.join("store.db")
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.json")
    }
}
