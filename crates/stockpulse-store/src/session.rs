//! Last-started task per subject, so tracking can resume after a restart

use crate::{KeyValueStore, StoreError};
use std::sync::Arc;
use stockpulse_core::{Clock, SessionConfig, SessionRecord};

const SESSION_PREFIX: &str = "taskId_";

pub struct SessionStore {
    kv: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
}

impl SessionStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, config: SessionConfig) -> Self {
        Self { kv, clock, config }
    }

    fn key(subject: &str) -> String {
        format!("{}{}", SESSION_PREFIX, subject)
    }

    /// Store `record`, replacing any earlier one for the same subject
    pub fn save(&self, record: &SessionRecord) -> Result<(), StoreError> {
        let json = serde_json::to_string(record)?;
        self.kv.set(&Self::key(&record.subject), &json)
    }

    /// Record that `task_id` was just started for `subject`
    pub fn record(
        &self,
        task_id: &str,
        subject: &str,
        analysis_kind: &str,
    ) -> Result<SessionRecord, StoreError> {
        let record = SessionRecord::new(task_id, subject, analysis_kind, self.clock.now());
        self.save(&record)?;
        tracing::debug!("session saved: {} -> {}", subject, task_id);
        Ok(record)
    }

    /// The live record for `subject`. Stale or unreadable records are purged.
    pub fn load(&self, subject: &str) -> Option<SessionRecord> {
        let key = Self::key(subject);
        let raw = match self.kv.get(&key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("session read failed for {}: {}", subject, e);
                return None;
            }
        };

        let record = match serde_json::from_str::<SessionRecord>(&raw) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("dropping unreadable session for {}: {}", subject, e);
                self.kv.remove(&key).ok();
                return None;
            }
        };

        if record.age_millis(self.clock.now()) > self.config.horizon_ms as i64 {
            tracing::debug!("session for {} is stale", subject);
            self.kv.remove(&key).ok();
            return None;
        }

        Some(record)
    }

    pub fn clear(&self, subject: &str) -> Result<(), StoreError> {
        self.kv.remove(&Self::key(subject))
    }

    /// Live records for every subject
    pub fn list(&self) -> Result<Vec<SessionRecord>, StoreError> {
        let keys = self.kv.keys_with_prefix(SESSION_PREFIX)?;
        Ok(keys
            .iter()
            .filter_map(|key| self.load(&key[SESSION_PREFIX.len()..]))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use stockpulse_core::ManualClock;

    fn setup() -> (Arc<MemoryStore>, Arc<ManualClock>, SessionStore) {
        let kv = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::at_millis(1_700_000_000_000));
        let sessions = SessionStore::new(kv.clone(), clock.clone(), SessionConfig::new());
        (kv, clock, sessions)
    }

    #[test]
    fn test_record_and_load() {
        let (kv, _clock, sessions) = setup();
        sessions.record("t-1", "600519", "comprehensive").unwrap();
        assert!(kv.get("taskId_600519").unwrap().is_some());

        let loaded = sessions.load("600519").unwrap();
        assert_eq!(loaded.task_id, "t-1");
        assert_eq!(loaded.analysis_kind, "comprehensive");
        assert!(sessions.load("000001").is_none());
    }

    #[test]
    fn test_newer_record_replaces_older() {
        let (_kv, _clock, sessions) = setup();
        sessions.record("t-1", "600519", "comprehensive").unwrap();
        sessions.record("t-2", "600519", "quick").unwrap();
        assert_eq!(sessions.load("600519").unwrap().task_id, "t-2");
    }

    #[test]
    fn test_horizon_boundary() {
        let (kv, clock, sessions) = setup();
        sessions.record("t-1", "600519", "comprehensive").unwrap();

        clock.advance_millis(4 * 60 * 60 * 1000);
        assert!(sessions.load("600519").is_some());

        clock.advance_millis(1);
        assert!(sessions.load("600519").is_none());
        assert!(kv.is_empty());
    }

    #[test]
    fn test_unreadable_record_is_purged() {
        let (kv, _clock, sessions) = setup();
        kv.set("taskId_600519", "t-1").unwrap();
        assert!(sessions.load("600519").is_none());
        assert!(kv.get("taskId_600519").unwrap().is_none());
    }

    #[test]
    fn test_list_and_clear() {
        let (kv, clock, sessions) = setup();
        sessions.record("t-old", "000001", "comprehensive").unwrap();
        clock.advance_millis(3 * 60 * 60 * 1000);
        sessions.record("t-a", "600519", "comprehensive").unwrap();
        sessions.record("t-b", "300750", "comprehensive").unwrap();
        kv.set("stock_analysis_cache_x", "{}").unwrap();

        clock.advance_millis(2 * 60 * 60 * 1000);
        let mut ids: Vec<String> = sessions.list().unwrap().into_iter().map(|r| r.task_id).collect();
        ids.sort();
        assert_eq!(ids, vec!["t-a", "t-b"]);

        sessions.clear("600519").unwrap();
        sessions.clear("600519").unwrap();
        assert_eq!(sessions.list().unwrap().len(), 1);
    }
}
