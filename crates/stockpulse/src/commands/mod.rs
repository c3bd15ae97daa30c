pub mod analyze;
pub mod cache;
pub mod session;
pub mod status;
pub mod version;

use std::sync::Arc;
use stockpulse_client::{HttpTransport, TaskApiClient};
use stockpulse_core::{Clock, Settings, SystemClock};
use stockpulse_store::{CacheStore, KeyValueStore, Paths, SessionStore, SqliteStore};
use stockpulse_tracker::TaskOrchestrator;

/// Settings and stores shared by every command
pub struct Context {
    pub paths: Paths,
    pub settings: Settings,
    clock: Arc<dyn Clock>,
    kv: Arc<dyn KeyValueStore>,
}

impl Context {
    /// Open the store under `~/.stockpulse` and load settings
    pub fn load() -> anyhow::Result<Self> {
        Self::open(Paths::new()?)
    }

    pub fn open(paths: Paths) -> anyhow::Result<Self> {
        let settings = Settings::load(&paths.config_file()).with_env();
        let kv = Arc::new(SqliteStore::open(&paths.store_db())?);
        Ok(Self {
            paths,
            settings,
            clock: Arc::new(SystemClock),
            kv,
        })
    }

    pub fn cache(&self) -> Arc<CacheStore> {
        Arc::new(CacheStore::new(
            self.kv.clone(),
            self.clock.clone(),
            self.settings.cache.clone(),
        ))
    }

    pub fn sessions(&self) -> Arc<SessionStore> {
        Arc::new(SessionStore::new(
            self.kv.clone(),
            self.clock.clone(),
            self.settings.session.clone(),
        ))
    }

    pub fn client(&self) -> TaskApiClient {
        let transport = Arc::new(HttpTransport::new(self.settings.api.base_url.clone()));
        TaskApiClient::new(
            transport,
            self.cache(),
            self.clock.clone(),
            self.settings.api.clone(),
        )
    }

    pub fn orchestrator(&self) -> TaskOrchestrator {
        TaskOrchestrator::new(
            self.client(),
            self.sessions(),
            self.clock.clone(),
            self.settings.polling.clone(),
        )
        .with_smoothing(self.settings.smooth_progress)
    }
}

pub fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}
