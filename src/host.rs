//! The host side of the worker contract.
//!
//! The host serializes lifecycle events (install strictly before activate),
//! tracks the worker's state, and decides whether fetches go to the worker at
//! all: only an activated worker that has claimed its clients intercepts
//! requests. Fetches the worker declines are sent to the network here.

use color_eyre::{eyre::eyre, Result};
use tracing::{debug, info, warn};

use crate::cache::{CacheResult, CacheStore};
use crate::event::{Event, FetchEvent, Outcome};
use crate::net::{Network, Request};
use crate::worker::{Notifier, OfflineCacheManager};

/// Worker lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  Parsed,
  Installing,
  /// Installed and waiting to activate
  Installed,
  Activating,
  Activated,
  /// Install failed; this worker will never activate
  Redundant,
}

pub struct Host<S: CacheStore, N: Network, P: Notifier> {
  worker: OfflineCacheManager<S, N, P>,
  state: WorkerState,
  controls_clients: bool,
}

impl<S: CacheStore, N: Network, P: Notifier> Host<S, N, P> {
  /// A host for a freshly registered worker.
  pub fn new(worker: OfflineCacheManager<S, N, P>) -> Self {
    Self {
      worker,
      state: WorkerState::Parsed,
      controls_clients: false,
    }
  }

  /// A host that picks up where a previous process left off.
  ///
  /// Partition names are the version marker. A populated static partition
  /// means this version installed; it only counts as activated once no
  /// partition from another version is left, since activation removes them.
  pub fn resume(worker: OfflineCacheManager<S, N, P>) -> Result<Self> {
    let name = worker.settings().static_cache.clone();
    let installed = !worker.storage().entries(name.as_str())?.is_empty();
    let stale = worker
      .storage()
      .keys()?
      .into_iter()
      .filter(|key| !worker.settings().is_current(key))
      .count();

    let mut host = Self::new(worker);
    match (installed, stale) {
      (false, _) => {}
      (true, 0) => {
        debug!(cache = %name, "resuming activated worker");
        host.state = WorkerState::Activated;
        host.controls_clients = true;
      }
      (true, stale) => {
        debug!(cache = %name, stale, "resuming installed worker, waiting to activate");
        host.state = WorkerState::Installed;
      }
    }
    Ok(host)
  }

  pub fn state(&self) -> WorkerState {
    self.state
  }

  pub fn worker(&self) -> &OfflineCacheManager<S, N, P> {
    &self.worker
  }

  /// Deliver an event and wait for the worker to finish with it.
  pub async fn dispatch(&mut self, event: Event) -> Result<Outcome> {
    match event {
      Event::Install => self.install().await,
      Event::Activate => self.activate().await,
      Event::Fetch(fetch) => self.fetch(fetch).await,
      event @ (Event::Sync { .. } | Event::Push { .. }) => self.worker.handle(event).await,
    }
  }

  /// Run install, then activate right away if the worker asks to skip waiting.
  pub async fn update(&mut self) -> Result<Vec<Outcome>> {
    let installed = self.dispatch(Event::Install).await?;
    let skip_waiting = matches!(&installed, Outcome::Installed(o) if o.skip_waiting);

    let mut outcomes = vec![installed];
    if skip_waiting {
      outcomes.push(self.dispatch(Event::Activate).await?);
    }
    Ok(outcomes)
  }

  async fn install(&mut self) -> Result<Outcome> {
    let previous = self.state;
    self.state = WorkerState::Installing;

    match self.worker.handle(Event::Install).await {
      Ok(outcome) => {
        self.state = match previous {
          // reinstalling an active version keeps it serving
          WorkerState::Activated => WorkerState::Activated,
          _ => WorkerState::Installed,
        };
        Ok(outcome)
      }
      Err(err) => {
        self.state = match previous {
          WorkerState::Activated => WorkerState::Activated,
          _ => WorkerState::Redundant,
        };
        warn!(state = ?self.state, "install failed");
        Err(err)
      }
    }
  }

  async fn activate(&mut self) -> Result<Outcome> {
    if !matches!(self.state, WorkerState::Installed | WorkerState::Activated) {
      return Err(eyre!(
        "Cannot activate {}: worker is {:?}, install it first",
        self.worker.settings().static_cache,
        self.state
      ));
    }

    self.state = WorkerState::Activating;
    let outcome = self.worker.handle(Event::Activate).await;
    match &outcome {
      Ok(Outcome::Activated(activated)) => {
        self.state = WorkerState::Activated;
        if activated.claim_clients {
          self.controls_clients = true;
        }
        info!(deleted = activated.deleted.len(), "worker active");
      }
      _ => self.state = WorkerState::Installed,
    }
    outcome
  }

  async fn fetch(&mut self, mut fetch: FetchEvent) -> Result<Outcome> {
    if !self.controls_clients {
      return self.passthrough(fetch.into_request()).await;
    }

    let Some(interception) = self.worker.on_fetch(&mut fetch) else {
      return self.passthrough(fetch.into_request()).await;
    };
    debug_assert!(fetch.is_claimed());

    self
      .worker
      .respond(interception)
      .await
      .map(Outcome::Responded)
  }

  async fn passthrough(&self, request: Request) -> Result<Outcome> {
    debug!(url = %request.url(), method = request.method(), "passthrough");
    let response = self.worker.network().fetch(&request).await?;
    Ok(Outcome::Responded(CacheResult::passthrough(response)))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::CacheSource;
  use crate::worker::testing::*;

  fn response_of(outcome: Outcome) -> CacheResult<crate::net::Response> {
    match outcome {
      Outcome::Responded(result) => result,
      other => panic!("expected a response, got {other:?}"),
    }
  }

  #[tokio::test]
  async fn test_update_installs_then_activates() {
    let mut host = Host::new(manager("v1"));
    assert_eq!(host.state(), WorkerState::Parsed);

    let outcomes = host.update().await.unwrap();

    assert_eq!(outcomes.len(), 2);
    assert!(matches!(outcomes[0], Outcome::Installed(_)));
    assert!(matches!(outcomes[1], Outcome::Activated(_)));
    assert_eq!(host.state(), WorkerState::Activated);
  }

  #[tokio::test]
  async fn test_activate_before_install_is_refused() {
    let mut host = Host::new(manager("v1"));

    assert!(host.dispatch(Event::Activate).await.is_err());
    assert_eq!(host.state(), WorkerState::Parsed);
  }

  #[tokio::test]
  async fn test_failed_install_makes_worker_redundant() {
    let worker = manager("v1");
    worker.network().set_offline(true);
    let mut host = Host::new(worker);

    assert!(host.update().await.is_err());
    assert_eq!(host.state(), WorkerState::Redundant);
    assert!(host.dispatch(Event::Activate).await.is_err());
  }

  #[tokio::test]
  async fn test_uncontrolled_fetch_goes_to_network() {
    let mut host = Host::new(manager("v1"));
    host.dispatch(Event::Install).await.unwrap();

    let outcome = host
      .dispatch(Event::Fetch(FetchEvent::new(asset("/styles.css"))))
      .await
      .unwrap();

    // installed but not yet active: the cached copy is not used
    let result = response_of(outcome);
    assert_eq!(result.source, CacheSource::Passthrough);
    assert!(host.worker().storage().entries("runtime-v1").unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_scenario_cached_stylesheet() {
    let mut host = Host::new(manager("v1"));
    host.update().await.unwrap();
    let calls = host.worker().network().calls().len();

    let outcome = host
      .dispatch(Event::Fetch(FetchEvent::new(asset("/styles.css"))))
      .await
      .unwrap();

    let result = response_of(outcome);
    assert_eq!(result.source, CacheSource::Cache);
    assert_eq!(result.data.body, b"content of /styles.css");
    assert_eq!(host.worker().network().calls().len(), calls);
  }

  #[tokio::test]
  async fn test_scenario_html_online_then_runtime() {
    let mut host = Host::new(manager("v1"));
    host.update().await.unwrap();
    host.worker().network().serve("/services.html", "services");

    let outcome = host
      .dispatch(Event::Fetch(FetchEvent::new(html("/services.html"))))
      .await
      .unwrap();

    assert_eq!(response_of(outcome).data.text(), "services");
    let urls: Vec<_> = host
      .worker()
      .storage()
      .entries("runtime-v1")
      .unwrap()
      .into_iter()
      .map(|e| e.url)
      .collect();
    assert_eq!(urls, vec!["https://corban.test/services.html"]);
  }

  #[tokio::test]
  async fn test_scenario_html_offline_fallback() {
    let mut host = Host::new(manager("v1"));
    host.update().await.unwrap();
    host.worker().network().set_offline(true);

    let outcome = host
      .dispatch(Event::Fetch(FetchEvent::new(html("/contact.html"))))
      .await
      .unwrap();

    let result = response_of(outcome);
    assert_eq!(result.source, CacheSource::Fallback);
    assert_eq!(result.data.text(), "content of /404.html");
  }

  #[tokio::test]
  async fn test_declined_fetch_is_passed_through() {
    let mut host = Host::new(manager("v1"));
    host.update().await.unwrap();
    let request = Request::new("POST", asset("/contact").url().clone());

    let outcome = host
      .dispatch(Event::Fetch(FetchEvent::new(request)))
      .await
      .unwrap();

    assert_eq!(response_of(outcome).source, CacheSource::Passthrough);
    assert!(host.worker().storage().entries("runtime-v1").unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_version_bump_retires_old_partitions() {
    let old = manager("v1");
    old.on_install().await.unwrap();
    old.network().serve("/gallery.html", "gallery");
    let mut event = FetchEvent::new(html("/gallery.html"));
    let interception = old.on_fetch(&mut event).unwrap();
    old.respond(interception).await.unwrap();
    assert_eq!(old.storage().keys().unwrap(), vec!["static-v1", "runtime-v1"]);

    // carry the v1 store over to a v2 worker
    let store = crate::cache::MemoryStorage::new();
    for name in old.storage().keys().unwrap() {
      store.open(&name).unwrap();
    }
    let settings = crate::worker::WorkerSettings::from_config(&config("v2")).unwrap();
    let network = FakeNetwork::default();
    for path in ["/", "/index.html", "/styles.css", "/script.js", "/404.html"] {
      network.serve(path, "v2");
    }
    let worker = OfflineCacheManager::new(settings, store, network, RecordingNotifier::default());
    let mut host = Host::new(worker);

    let outcomes = host.update().await.unwrap();

    let Outcome::Activated(activated) = &outcomes[1] else {
      panic!("expected activation");
    };
    assert_eq!(activated.deleted, vec!["static-v1", "runtime-v1"]);
    assert_eq!(host.worker().storage().keys().unwrap(), vec!["static-v2"]);
  }

  #[tokio::test]
  async fn test_resume_detects_installed_version() {
    let worker = manager("v1");
    worker.on_install().await.unwrap();

    let host = Host::resume(worker).unwrap();
    assert_eq!(host.state(), WorkerState::Activated);

    let host = Host::resume(manager("v1")).unwrap();
    assert_eq!(host.state(), WorkerState::Parsed);
  }

  #[tokio::test]
  async fn test_resume_after_install_only_waits_for_activate() {
    let store = crate::cache::MemoryStorage::new();
    let key = crate::cache::RequestKey::for_request(&asset("/styles.css"));
    store
      .put("static-v1", &key, &crate::net::Response::new(200, b"v1 css".to_vec()))
      .unwrap();
    let settings = crate::worker::WorkerSettings::from_config(&config("v2")).unwrap();
    let network = FakeNetwork::default();
    for path in ["/", "/index.html", "/styles.css", "/script.js", "/404.html"] {
      network.serve(path, "v2 css");
    }
    let worker = OfflineCacheManager::new(settings, store, network, RecordingNotifier::default());
    worker.on_install().await.unwrap();

    // a later run sees v2 installed next to v1, but activate never ran
    let mut host = Host::resume(worker).unwrap();
    assert_eq!(host.state(), WorkerState::Installed);

    let outcome = host
      .dispatch(Event::Fetch(FetchEvent::new(asset("/styles.css"))))
      .await
      .unwrap();
    let result = response_of(outcome);
    assert_eq!(result.source, CacheSource::Passthrough);
    assert_eq!(result.data.body, b"v2 css");

    host.dispatch(Event::Activate).await.unwrap();
    assert_eq!(host.state(), WorkerState::Activated);
    assert_eq!(host.worker().storage().keys().unwrap(), vec!["static-v2"]);

    let outcome = host
      .dispatch(Event::Fetch(FetchEvent::new(asset("/styles.css"))))
      .await
      .unwrap();
    let result = response_of(outcome);
    assert_eq!(result.source, CacheSource::Cache);
    assert_eq!(result.partition.as_deref(), Some("static-v2"));
    assert_eq!(result.data.body, b"v2 css");
  }

  #[tokio::test]
  async fn test_sync_and_push_are_delegated() {
    let mut host = Host::new(manager("v1"));

    let outcome = host
      .dispatch(Event::Sync {
        tag: "contact-form".to_string(),
      })
      .await
      .unwrap();
    assert!(matches!(
      outcome,
      Outcome::Synced(crate::worker::SyncOutcome::Resolved)
    ));

    let outcome = host
      .dispatch(Event::Push {
        data: Some(b"{".to_vec()),
      })
      .await;
    assert!(outcome.is_err());
  }
}
