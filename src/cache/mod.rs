//! Versioned, partitioned response cache.
//!
//! This module provides the storage side of the offline cache manager:
//! - Named partitions (`static-v1`, `runtime-v1`) keyed by request identity
//! - SQLite persistence, plus an in-memory store for ephemeral runs
//! - Network-first and cache-first policies with write-through to a partition

mod key;
mod layer;
mod storage;
mod traits;

pub use key::{CacheName, PartitionKind, RequestKey};
pub use layer::CacheLayer;
pub use storage::{MemoryStorage, SqliteStorage};
pub use traits::{CacheResult, CacheSource, CacheStore};
