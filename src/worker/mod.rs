//! The offline cache manager.
//!
//! One dispatcher per host, built once from configuration. It holds the two
//! partition names and its collaborators, and nothing else that changes:
//! every piece of durable state lives in the cache store.
//!
//! ## Events
//! - `install`: fetch the asset manifest into the static partition, all or nothing
//! - `activate`: delete partitions from other versions
//! - `fetch`: network-first for HTML, cache-first for static assets
//! - `sync`: acknowledge known background-sync tags
//! - `push`: show a notification from a JSON payload

mod classify;
mod lifecycle;
mod notify;
mod router;
mod signals;

use color_eyre::{eyre::eyre, Result};
use url::Url;

use crate::cache::{CacheLayer, CacheName, CacheStore, PartitionKind};
use crate::config::Config;
use crate::event::{Event, Outcome};
use crate::net::Network;

pub use classify::{Classifier, RequestClass};
pub use lifecycle::{ActivateOutcome, InstallOutcome};
pub use notify::{LogNotifier, Notification, Notifier};
pub use signals::{PushOutcome, SyncOutcome};

/// Everything the worker knows about its deployment.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
  pub static_cache: CacheName,
  pub runtime_cache: CacheName,
  pub manifest: Vec<Url>,
  pub offline_page: Url,
  pub sync_tags: Vec<String>,
  pub icon: String,
  pub badge: Option<String>,
  pub classifier: Classifier,
}

impl WorkerSettings {
  pub fn from_config(config: &Config) -> Result<Self> {
    let origin = config.origin_url()?;

    let manifest = config
      .manifest
      .iter()
      .map(|entry| {
        origin
          .join(entry)
          .map_err(|e| eyre!("Invalid manifest entry '{}': {}", entry, e))
      })
      .collect::<Result<Vec<_>>>()?;

    let offline_page = origin
      .join(&config.offline_page)
      .map_err(|e| eyre!("Invalid offline page '{}': {}", config.offline_page, e))?;

    Ok(Self {
      static_cache: CacheName::new(PartitionKind::Static, &config.version),
      runtime_cache: CacheName::new(PartitionKind::Runtime, &config.version),
      manifest,
      offline_page,
      sync_tags: config.sync_tags.clone(),
      icon: config.notification.icon.clone(),
      badge: config.notification.badge.clone(),
      classifier: Classifier::new(&origin, &config.allowed_hosts, &config.asset_extensions),
    })
  }

  /// Whether `name` is one of the two partitions of this version.
  pub fn is_current(&self, name: &str) -> bool {
    name == self.static_cache.as_str() || name == self.runtime_cache.as_str()
  }
}

pub struct OfflineCacheManager<S: CacheStore, N: Network, P: Notifier> {
  settings: WorkerSettings,
  cache: CacheLayer<S>,
  network: N,
  notifier: P,
}

impl<S: CacheStore, N: Network, P: Notifier> OfflineCacheManager<S, N, P> {
  pub fn new(settings: WorkerSettings, storage: S, network: N, notifier: P) -> Self {
    Self {
      settings,
      cache: CacheLayer::new(storage),
      network,
      notifier,
    }
  }

  pub fn settings(&self) -> &WorkerSettings {
    &self.settings
  }

  pub fn storage(&self) -> &S {
    self.cache.storage()
  }

  pub fn network(&self) -> &N {
    &self.network
  }

  /// Dispatch one event to its handler.
  pub async fn handle(&self, event: Event) -> Result<Outcome> {
    match event {
      Event::Install => self.on_install().await.map(Outcome::Installed),
      Event::Activate => self.on_activate().await.map(Outcome::Activated),
      Event::Fetch(mut fetch) => match self.on_fetch(&mut fetch) {
        Some(interception) => self.respond(interception).await.map(Outcome::Responded),
        None => Ok(Outcome::Passthrough(fetch.into_request())),
      },
      Event::Sync { tag } => Ok(Outcome::Synced(self.on_sync(&tag).await)),
      Event::Push { data } => self.on_push(data.as_deref()).await.map(Outcome::Pushed),
    }
  }
}


#[cfg(test)]
mod tests {
  use super::testing::*;
  use super::*;
  use crate::event::FetchEvent;

  #[test]
  fn test_settings_from_config() {
    let settings = WorkerSettings::from_config(&config("v4")).unwrap();
    assert_eq!(settings.static_cache.as_str(), "static-v4");
    assert_eq!(settings.runtime_cache.as_str(), "runtime-v4");
    assert_eq!(settings.manifest[0].as_str(), "https://corban.test/");
    assert_eq!(settings.offline_page.as_str(), "https://corban.test/404.html");
    assert!(settings.is_current("runtime-v4"));
    assert!(!settings.is_current("runtime-v3"));
  }

  #[tokio::test]
  async fn test_handle_dispatches_every_event() {
    let manager = manager("v1");

    let outcome = manager.handle(Event::Install).await.unwrap();
    assert!(matches!(outcome, Outcome::Installed(_)));

    let outcome = manager.handle(Event::Activate).await.unwrap();
    assert!(matches!(outcome, Outcome::Activated(_)));

    let outcome = manager
      .handle(Event::Fetch(FetchEvent::new(asset("/styles.css"))))
      .await
      .unwrap();
    assert!(matches!(outcome, Outcome::Responded(_)));

    let outcome = manager
      .handle(Event::Fetch(FetchEvent::new(asset("/api/data.json"))))
      .await
      .unwrap();
    assert!(matches!(outcome, Outcome::Passthrough(_)));

    let outcome = manager
      .handle(Event::Sync {
        tag: "contact-form".to_string(),
      })
      .await
      .unwrap();
    assert!(matches!(outcome, Outcome::Synced(SyncOutcome::Resolved)));

    let outcome = manager.handle(Event::Push { data: None }).await.unwrap();
    assert!(matches!(outcome, Outcome::Pushed(PushOutcome::NoPayload)));
  }
}
