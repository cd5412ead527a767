//! Cache layer that orchestrates response-source policies with network fetching.

use color_eyre::Result;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use super::key::RequestKey;
use super::traits::{CacheResult, CacheStore};
use crate::net::Response;

/// Cache layer that manages caching policy and network fetching.
///
/// This layer sits between the fetch router and the network, writing network
/// responses through to a partition and falling back to stored copies.
pub struct CacheLayer<S: CacheStore> {
  storage: Arc<S>,
}

impl<S: CacheStore> CacheLayer<S> {
  /// Create a new cache layer with the given storage backend.
  pub fn new(storage: S) -> Self {
    Self {
      storage: Arc::new(storage),
    }
  }

  pub fn storage(&self) -> &S {
    &self.storage
  }

  /// Fetch with a network-first strategy.
  ///
  /// 1. Fetch from network - on success, write a copy to `write_to` and return it
  /// 2. On network failure, return any stored copy (offline mode)
  /// 3. With no stored copy, the network error is returned
  pub async fn network_first<F, Fut>(
    &self,
    key: &RequestKey,
    write_to: &str,
    fetcher: F,
  ) -> Result<CacheResult<Response>>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Response>>,
  {
    match fetcher().await {
      Ok(response) => {
        self.write_through(write_to, key, &response);
        Ok(CacheResult::from_network(response))
      }
      Err(err) => {
        debug!(request = %key, error = %err, "network failed, checking cache");
        match self.storage.match_any(key)? {
          Some(cached) => Ok(CacheResult::offline(cached)),
          None => Err(err),
        }
      }
    }
  }

  /// Fetch with a cache-first strategy.
  ///
  /// 1. Check every partition - on a hit, return it without touching the network
  /// 2. On a miss, fetch from network, write a copy to `write_to` and return it
  /// 3. A network failure on a miss is returned as is
  pub async fn cache_first<F, Fut>(
    &self,
    key: &RequestKey,
    write_to: &str,
    fetcher: F,
  ) -> Result<CacheResult<Response>>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Response>>,
  {
    if let Some(cached) = self.storage.match_any(key)? {
      return Ok(CacheResult::from_cache(cached));
    }

    let response = fetcher().await?;
    self.write_through(write_to, key, &response);
    Ok(CacheResult::from_network(response))
  }

  /// Store a copy of a network response. A failed write never fails the
  /// response it accompanies.
  fn write_through(&self, name: &str, key: &RequestKey, response: &Response) {
    match self.storage.put(name, key, response) {
      Ok(()) => debug!(cache = name, request = %key, status = response.status, "stored"),
      Err(err) => warn!(cache = name, request = %key, error = %err, "failed to store response"),
    }
  }
}

impl<S: CacheStore> Clone for CacheLayer<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
    }
  }
}
