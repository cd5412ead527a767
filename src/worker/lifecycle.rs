use color_eyre::{eyre::eyre, Result};
use futures::future::try_join_all;
use tracing::{info, warn};

use super::{Notifier, OfflineCacheManager};
use crate::cache::{CacheStore, RequestKey};
use crate::net::{Network, Request};

/// Result of a successful install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
  /// Static partition that now holds the manifest
  pub cache: String,
  /// Number of manifest entries stored
  pub cached: usize,
  /// Take over immediately instead of waiting for open pages to close
  pub skip_waiting: bool,
}

/// Result of activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivateOutcome {
  /// Stale partitions removed, in enumeration order
  pub deleted: Vec<String>,
  /// Start controlling already-open pages
  pub claim_clients: bool,
}

impl<S: CacheStore, N: Network, P: Notifier> OfflineCacheManager<S, N, P> {
  /// Fetch every manifest entry and store them in the static partition.
  ///
  /// Entries are written in a single batch only after every fetch succeeded
  /// with an OK status; any failure fails the whole install and leaves no
  /// partition behind.
  pub async fn on_install(&self) -> Result<InstallOutcome> {
    let name = self.settings.static_cache.as_str();

    info!(
      cache = name,
      assets = self.settings.manifest.len(),
      "installing"
    );

    let fetches = self.settings.manifest.iter().map(|url| async move {
      let request = Request::get(url.clone());
      let response = self
        .network
        .fetch(&request)
        .await
        .map_err(|e| eyre!("Failed to cache {}: {}", url, e))?;
      if !response.is_ok() {
        return Err(eyre!(
          "Failed to cache {}: unexpected status {}",
          url,
          response.status
        ));
      }
      Ok::<_, color_eyre::Report>((RequestKey::for_request(&request), response))
    });

    let entries = match try_join_all(fetches).await {
      Ok(entries) => entries,
      Err(err) => {
        warn!(cache = name, error = %err, "install failed");
        return Err(err);
      }
    };

    self.storage().open(name)?;
    self.storage().add_all(name, &entries)?;
    info!(cache = name, cached = entries.len(), "installed");

    Ok(InstallOutcome {
      cache: name.to_string(),
      cached: entries.len(),
      skip_waiting: true,
    })
  }

  /// Delete every partition that is not one of this version's two.
  pub async fn on_activate(&self) -> Result<ActivateOutcome> {
    let mut deleted = Vec::new();

    for name in self.storage().keys()? {
      if self.settings.is_current(&name) {
        continue;
      }
      if self.storage().delete(&name)? {
        info!(cache = %name, "deleted stale cache");
        deleted.push(name);
      }
    }

    info!(
      static_cache = %self.settings.static_cache,
      runtime_cache = %self.settings.runtime_cache,
      "activated"
    );

    Ok(ActivateOutcome {
      deleted,
      claim_clients: true,
    })
  }
}
