use color_eyre::Result;
use tracing::{debug, warn};

use super::{Notifier, OfflineCacheManager, RequestClass};
use crate::cache::{CacheResult, CacheStore, RequestKey};
use crate::event::{FetchEvent, ResponseClaim};
use crate::net::{Network, Request, Response};

/// Response-source policy for an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
  /// Network, then any stored copy, then the offline page
  NetworkFirst,
  /// Any stored copy, then network
  CacheFirst,
}

/// A claimed fetch waiting for its response.
///
/// Only [`OfflineCacheManager::on_fetch`] builds one, after claiming the event.
#[derive(Debug)]
#[must_use]
pub struct Interception {
  _claim: ResponseClaim,
  route: Route,
  request: Request,
}

impl Interception {
  pub fn route(&self) -> Route {
    self.route
  }

  pub fn request(&self) -> &Request {
    &self.request
  }
}

impl<S: CacheStore, N: Network, P: Notifier> OfflineCacheManager<S, N, P> {
  /// Decide whether to intercept a fetch.
  ///
  /// Runs synchronously: the event is claimed here, before any cache or
  /// network access, or left alone for the host to send to the network.
  pub fn on_fetch(&self, event: &mut FetchEvent) -> Option<Interception> {
    let request = event.request();
    if !request.is_get() {
      return None;
    }

    let route = match self.settings.classifier.classify(request) {
      RequestClass::Navigation => Route::NetworkFirst,
      RequestClass::StaticAsset => Route::CacheFirst,
      RequestClass::Other => return None,
    };

    let request = request.clone();
    let interception = Interception {
      _claim: event.respond_with(),
      route,
      request,
    };
    debug!(
      url = %interception.request().url(),
      route = ?interception.route(),
      "intercepted"
    );

    Some(interception)
  }

  /// Produce the response for a claimed fetch.
  ///
  /// Navigations always resolve; a static asset that is neither cached nor
  /// reachable fails with the network error.
  pub async fn respond(&self, interception: Interception) -> Result<CacheResult<Response>> {
    let Interception { route, request, .. } = interception;
    let key = RequestKey::for_request(&request);
    let runtime = self.settings.runtime_cache.as_str();
    let fetch = || self.network.fetch(&request);

    match route {
      Route::NetworkFirst => match self.cache.network_first(&key, runtime, fetch).await {
        Ok(result) => Ok(result),
        Err(err) => {
          debug!(request = %key, error = %err, "no stored copy, serving offline page");
          Ok(self.offline_fallback())
        }
      },
      Route::CacheFirst => self.cache.cache_first(&key, runtime, fetch).await,
    }
  }

  fn offline_fallback(&self) -> CacheResult<Response> {
    let key = RequestKey::for_request(&Request::get(self.settings.offline_page.clone()));

    match self.storage().match_any(&key) {
      Ok(Some(cached)) => CacheResult::fallback(cached),
      Ok(None) => {
        warn!(page = %key.url(), "offline page is not cached");
        CacheResult::unavailable(Response::offline())
      }
      Err(err) => {
        warn!(page = %key.url(), error = %err, "failed to read offline page");
        CacheResult::unavailable(Response::offline())
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::super::testing::*;
  use super::*;
  use crate::cache::CacheSource;

  async fn fetch(manager: &TestManager, request: Request) -> Option<Result<CacheResult<Response>>> {
    let mut event = FetchEvent::new(request);
    let interception = manager.on_fetch(&mut event)?;
    assert!(event.is_claimed());
    Some(manager.respond(interception).await)
  }

  #[tokio::test]
  async fn test_html_online_returns_network_and_stores_runtime() {
    let manager = manager("v1");
    manager.network().serve("/projects.html", "<h1>Projects</h1>");

    let result = fetch(&manager, html("/projects.html")).await.unwrap().unwrap();

    assert_eq!(result.source, CacheSource::Network);
    assert_eq!(result.data.text(), "<h1>Projects</h1>");

    let stored = manager
      .storage()
      .match_any(&RequestKey::for_request(&html("/projects.html")))
      .unwrap()
      .unwrap();
    assert_eq!(stored.partition, "runtime-v1");
    assert_eq!(stored.response.body, b"<h1>Projects</h1>");
  }

  #[tokio::test]
  async fn test_html_online_prefers_network_over_cache() {
    let manager = manager("v1");
    manager.on_install().await.unwrap();
    manager.network().serve("/index.html", "new index");

    let result = fetch(&manager, html("/index.html")).await.unwrap().unwrap();

    assert_eq!(result.source, CacheSource::Network);
    assert_eq!(result.data.text(), "new index");
    // the static partition is never rewritten by the router
    let static_entry = manager.storage().match_any(&RequestKey::for_request(&html("/index.html")));
    assert_eq!(static_entry.unwrap().unwrap().partition, "static-v1");
    assert_eq!(manager.storage().entries("runtime-v1").unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_html_offline_returns_cached_copy() {
    let manager = manager("v1");
    manager.network().serve("/about.html", "about us");
    fetch(&manager, html("/about.html")).await.unwrap().unwrap();

    manager.network().set_offline(true);
    let result = fetch(&manager, html("/about.html")).await.unwrap().unwrap();

    assert_eq!(result.source, CacheSource::Offline);
    assert_eq!(result.data.text(), "about us");
  }

  #[tokio::test]
  async fn test_html_offline_without_copy_returns_offline_page() {
    let manager = manager("v1");
    manager.on_install().await.unwrap();
    manager.network().set_offline(true);

    let result = fetch(&manager, html("/never-visited.html")).await.unwrap().unwrap();

    assert_eq!(result.source, CacheSource::Fallback);
    assert_eq!(result.data.text(), "content of /404.html");
  }

  #[tokio::test]
  async fn test_html_offline_before_install_is_unavailable() {
    let manager = manager("v1");
    manager.network().set_offline(true);

    let result = fetch(&manager, html("/")).await.unwrap().unwrap();

    assert_eq!(result.source, CacheSource::Unavailable);
    assert_eq!(result.data.status, 503);
  }

  #[tokio::test]
  async fn test_html_error_status_is_still_a_response() {
    let manager = manager("v1");

    let result = fetch(&manager, html("/missing.html")).await.unwrap().unwrap();

    assert_eq!(result.source, CacheSource::Network);
    assert_eq!(result.data.status, 404);
  }

  #[tokio::test]
  async fn test_asset_cache_hit_makes_no_network_call() {
    let manager = manager("v1");
    manager.on_install().await.unwrap();
    let calls_after_install = manager.network().calls().len();

    let result = fetch(&manager, asset("/styles.css")).await.unwrap().unwrap();

    assert_eq!(result.source, CacheSource::Cache);
    assert_eq!(result.data.body, b"content of /styles.css");
    assert_eq!(manager.network().calls().len(), calls_after_install);
  }

  #[tokio::test]
  async fn test_asset_miss_fetches_and_stores_runtime() {
    let manager = manager("v1");
    manager.network().serve("/images/hero.webp", "webp bytes");

    let first = fetch(&manager, asset("/images/hero.webp")).await.unwrap().unwrap();
    assert_eq!(first.source, CacheSource::Network);

    manager.network().set_offline(true);
    let second = fetch(&manager, asset("/images/hero.webp")).await.unwrap().unwrap();
    assert_eq!(second.source, CacheSource::Cache);
    assert_eq!(second.partition.as_deref(), Some("runtime-v1"));
    assert_eq!(second.data.body, b"webp bytes");
    assert_eq!(manager.network().calls().len(), 1);
  }

  #[tokio::test]
  async fn test_asset_miss_offline_propagates_error() {
    let manager = manager("v1");
    manager.network().set_offline(true);

    let result = fetch(&manager, asset("/images/gallery-1.jpg")).await.unwrap();

    assert!(result.is_err());
    assert!(manager.storage().keys().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_non_get_is_not_intercepted() {
    let manager = manager("v1");
    let request = Request::new("POST", asset("/styles.css").url().clone())
      .with_header("accept", "text/html");
    let mut event = FetchEvent::new(request);

    assert!(manager.on_fetch(&mut event).is_none());
    assert!(!event.is_claimed());
    assert!(manager.network().calls().is_empty());
    assert!(manager.storage().keys().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_cross_origin_is_not_intercepted() {
    let manager = manager("v1");
    let request = Request::get(
      url::Url::parse("https://cdnjs.cloudflare.com/ajax/libs/font-awesome/6.4.0/css/all.min.css")
        .unwrap(),
    );
    let mut event = FetchEvent::new(request);

    assert!(manager.on_fetch(&mut event).is_none());
    assert!(!event.is_claimed());
  }

  #[tokio::test]
  async fn test_other_requests_are_not_intercepted() {
    let manager = manager("v1");
    let mut event = FetchEvent::new(asset("/api/projects.json"));

    assert!(manager.on_fetch(&mut event).is_none());
    assert!(!event.is_claimed());
  }

  #[test]
  fn test_interception_carries_route() {
    let manager = manager("v1");

    let mut event = FetchEvent::new(html("/"));
    let interception = manager.on_fetch(&mut event).unwrap();
    assert_eq!(interception.route(), Route::NetworkFirst);
    assert_eq!(interception.request().url().path(), "/");

    let mut event = FetchEvent::new(asset("/script.js"));
    assert_eq!(manager.on_fetch(&mut event).unwrap().route(), Route::CacheFirst);
  }
}
