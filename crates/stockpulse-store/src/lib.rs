//! Local persistence: key/value backends, compressed cache entries and task sessions

mod cache;
pub mod codec;
mod error;
mod kv;
mod paths;
mod session;
mod sqlite;

pub use cache::{CacheOptions, CacheStats, CacheStore, EntryEncoding};
pub use error::StoreError;
pub use kv::{KeyValueStore, MemoryStore};
pub use paths::Paths;
pub use session::SessionStore;
pub use sqlite::SqliteStore;
