//! Core traits and types for the partitioned response cache.

use chrono::{DateTime, Utc};
use color_eyre::Result;

use super::key::RequestKey;
use crate::net::Response;

/// A stored response found by a lookup.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  /// The stored snapshot
  pub response: Response,
  /// Partition the entry was found in
  pub partition: String,
  /// When the entry was written
  pub cached_at: DateTime<Utc>,
}

/// Summary of one stored entry, for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedEntry {
  pub method: String,
  pub url: String,
  pub status: u16,
  pub size: usize,
}

/// Backing store for named cache partitions.
///
/// Every write is a single atomic operation keyed by request identity, so a
/// write abandoned mid-request never leaves a partial entry behind.
pub trait CacheStore: Send + Sync {
  /// Open a partition, creating it if absent.
  fn open(&self, name: &str) -> Result<()>;

  /// Store all entries in one transaction; either every entry lands or none does.
  fn add_all(&self, name: &str, entries: &[(RequestKey, Response)]) -> Result<()>;

  /// Insert or overwrite a single entry, creating the partition on first write.
  fn put(&self, name: &str, key: &RequestKey, response: &Response) -> Result<()>;

  /// Look a request up across all partitions, oldest partition first.
  fn match_any(&self, key: &RequestKey) -> Result<Option<CachedResponse>>;

  /// All partition names in creation order.
  fn keys(&self) -> Result<Vec<String>>;

  /// Delete a partition and its entries. Returns whether it existed.
  fn delete(&self, name: &str) -> Result<bool>;

  /// Entries of one partition in write order.
  fn entries(&self, name: &str) -> Result<Vec<CachedEntry>>;
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// Partition that served it (if from cache)
  pub partition: Option<String>,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  /// Fresh data from the network.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      partition: None,
      cached_at: None,
    }
  }

  /// Network data that was never considered for caching.
  pub fn passthrough(data: T) -> Self {
    Self {
      source: CacheSource::Passthrough,
      ..Self::from_network(data)
    }
  }

  /// Data built locally because nothing else was available.
  pub fn unavailable(data: T) -> Self {
    Self {
      source: CacheSource::Unavailable,
      ..Self::from_network(data)
    }
  }
}

impl CacheResult<Response> {
  /// A cache hit served without touching the network.
  pub fn from_cache(cached: CachedResponse) -> Self {
    Self::cached(cached, CacheSource::Cache)
  }

  /// A stored copy served because the network failed.
  pub fn offline(cached: CachedResponse) -> Self {
    Self::cached(cached, CacheSource::Offline)
  }

  /// The offline fallback page served in place of the request.
  pub fn fallback(cached: CachedResponse) -> Self {
    Self::cached(cached, CacheSource::Fallback)
  }

  fn cached(cached: CachedResponse, source: CacheSource) -> Self {
    Self {
      data: cached.response,
      source,
      partition: Some(cached.partition),
      cached_at: Some(cached.cached_at),
    }
  }
}

/// Indicates where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network, written through to the runtime partition
  Network,
  /// Not intercepted; straight from the network with no caching
  Passthrough,
  /// Cache hit, no network attempted
  Cache,
  /// Network unavailable, serving a stored copy of the request
  Offline,
  /// Network unavailable and no copy stored, serving the offline page
  Fallback,
  /// Nothing to serve, not even the offline page
  Unavailable,
}

impl CacheSource {
  pub fn label(self) -> &'static str {
    match self {
      Self::Network => "network",
      Self::Passthrough => "network (passthrough)",
      Self::Cache => "cache",
      Self::Offline => "cache (offline)",
      Self::Fallback => "offline page",
      Self::Unavailable => "unavailable",
    }
  }
}
