//! TTL cache over a key/value store with size-aware compression
//!
//! Layout: `<prefix>_<key>` holds either the JSON entry
//! `{data, timestamp, expiresAt}` or its [`codec`](crate::codec) encoding; a
//! sibling `<prefix>_<key>_compressed` set to `"true"` marks the encoded form.

use crate::{codec, KeyValueStore, StoreError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use stockpulse_core::{CacheConfig, Clock};

const COMPRESSED_SUFFIX: &str = "_compressed";
const COMPRESSED_FLAG: &str = "true";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheEntry {
    data: serde_json::Value,
    /// Milliseconds since the Unix epoch
    timestamp: i64,
    expires_at: i64,
}

/// Write options for [`CacheStore::set`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheOptions {
    /// Falls back to the configured default TTL
    pub ttl: Option<Duration>,
    pub compress: bool,
}

impl CacheOptions {
    pub fn ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            compress: false,
        }
    }

    pub fn compressed(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }
}

/// How an entry ended up stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryEncoding {
    Plain,
    Compressed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub count: usize,
    pub total_bytes: usize,
    pub expired_count: usize,
}

pub struct CacheStore {
    kv: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
}

impl CacheStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, config: CacheConfig) -> Self {
        Self { kv, clock, config }
    }

    fn storage_key(&self, key: &str) -> String {
        format!("{}_{}", self.config.prefix, key)
    }

    fn flag_key(storage_key: &str) -> String {
        format!("{}{}", storage_key, COMPRESSED_SUFFIX)
    }

    fn namespace(&self) -> String {
        format!("{}_", self.config.prefix)
    }

    /// Store `value` under `key`.
    ///
    /// An uncompressed write whose serialized entry exceeds the configured
    /// threshold is stored compressed instead; the returned encoding reports
    /// what actually happened.
    pub fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        options: CacheOptions,
    ) -> Result<EntryEncoding, StoreError> {
        let now = self.clock.now_millis();
        let ttl = options.ttl.unwrap_or_else(|| self.config.default_ttl());
        let entry = CacheEntry {
            data: serde_json::to_value(value)?,
            timestamp: now,
            expires_at: now.saturating_add(ttl.as_millis().min(i64::MAX as u128) as i64),
        };
        self.write_entry(key, &entry, options.compress)
    }

    fn write_entry(
        &self,
        key: &str,
        entry: &CacheEntry,
        compress: bool,
    ) -> Result<EntryEncoding, StoreError> {
        let storage_key = self.storage_key(key);
        let flag_key = Self::flag_key(&storage_key);

        if compress {
            let encoded = codec::encode(entry)?;
            self.kv.set(&flag_key, COMPRESSED_FLAG)?;
            self.kv.set(&storage_key, &encoded)?;
            return Ok(EntryEncoding::Compressed);
        }

        let serialized = serde_json::to_string(entry)?;
        if serialized.len() > self.config.auto_compress_bytes {
            tracing::warn!(
                "cache entry {} is {}KB, storing compressed",
                key,
                serialized.len() / 1024
            );
            return self.write_entry(key, entry, true);
        }

        self.kv.remove(&flag_key)?;
        self.kv.set(&storage_key, &serialized)?;
        Ok(EntryEncoding::Plain)
    }

    /// Read a live entry. Expired or unreadable entries are evicted and reported absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let storage_key = self.storage_key(key);
        let entry = match self.read_entry(&storage_key) {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(Unreadable) => {
                tracing::warn!("dropping unreadable cache entry {}", key);
                self.remove(key);
                return None;
            }
        };

        if self.is_expired(&entry) {
            tracing::debug!("cache entry {} expired", key);
            self.remove(key);
            return None;
        }

        match serde_json::from_value(entry.data) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!("cache entry {} has unexpected shape: {}", key, e);
                None
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get::<serde_json::Value>(key).is_some()
    }

    /// Whether the stored entry is marked compressed
    pub fn is_compressed(&self, key: &str) -> bool {
        let flag_key = Self::flag_key(&self.storage_key(key));
        matches!(self.kv.get(&flag_key), Ok(Some(flag)) if flag == COMPRESSED_FLAG)
    }

    pub fn remove(&self, key: &str) {
        let storage_key = self.storage_key(key);
        for k in [Self::flag_key(&storage_key), storage_key] {
            if let Err(e) = self.kv.remove(&k) {
                tracing::warn!("failed to remove cache key {}: {}", k, e);
            }
        }
    }

    /// Remove every entry under this cache's prefix
    pub fn clear(&self) -> usize {
        let keys = self.kv.keys_with_prefix(&self.namespace()).unwrap_or_default();
        let mut removed = 0;
        for key in keys {
            if !key.ends_with(COMPRESSED_SUFFIX) {
                removed += 1;
            }
            self.kv.remove(&key).ok();
        }
        removed
    }

    /// Remove expired and unreadable entries, returning how many were dropped
    pub fn sweep_expired(&self) -> usize {
        let keys = match self.kv.keys_with_prefix(&self.namespace()) {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!("cache sweep failed to list keys: {}", e);
                return 0;
            }
        };

        let mut removed = 0;
        for storage_key in entry_keys(&keys) {
            let drop_it = match self.read_entry(storage_key) {
                Ok(Some(entry)) => self.is_expired(&entry),
                Ok(None) => false,
                Err(Unreadable) => true,
            };
            if drop_it {
                self.kv.remove(&Self::flag_key(storage_key)).ok();
                self.kv.remove(storage_key).ok();
                removed += 1;
            }
        }

        // flags left behind by a removed entry
        for key in keys.iter().filter(|k| k.ends_with(COMPRESSED_SUFFIX)) {
            let owner = &key[..key.len() - COMPRESSED_SUFFIX.len()];
            if !keys.iter().any(|k| k == owner) {
                self.kv.remove(key).ok();
            }
        }

        if removed > 0 {
            tracing::info!("cache sweep removed {} entries", removed);
        }
        removed
    }

    pub fn stats(&self) -> CacheStats {
        let keys = self.kv.keys_with_prefix(&self.namespace()).unwrap_or_default();
        let mut stats = CacheStats::default();
        for storage_key in entry_keys(&keys) {
            let raw_len = match self.kv.get(storage_key) {
                Ok(Some(raw)) => raw.len(),
                _ => continue,
            };
            stats.count += 1;
            stats.total_bytes += raw_len;
            match self.read_entry(storage_key) {
                Ok(Some(entry)) if !self.is_expired(&entry) => {}
                Ok(None) => {}
                _ => stats.expired_count += 1,
            }
        }
        stats
    }

    fn is_expired(&self, entry: &CacheEntry) -> bool {
        self.clock.now_millis() >= entry.expires_at
    }

    fn read_entry(&self, storage_key: &str) -> Result<Option<CacheEntry>, Unreadable> {
        let raw = match self.kv.get(storage_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Ok(None),
            Err(e) => {
                tracing::warn!("cache read failed for {}: {}", storage_key, e);
                return Ok(None);
            }
        };

        let compressed = matches!(
            self.kv.get(&Self::flag_key(storage_key)),
            Ok(Some(flag)) if flag == COMPRESSED_FLAG
        );

        let entry = if compressed {
            codec::decode::<CacheEntry>(&raw)
        } else {
            serde_json::from_str::<CacheEntry>(&raw).ok()
        };
        entry.map(Some).ok_or(Unreadable)
    }
}

struct Unreadable;

fn entry_keys(keys: &[String]) -> impl Iterator<Item = &String> {
    keys.iter().filter(|k| !k.ends_with(COMPRESSED_SUFFIX))
}
