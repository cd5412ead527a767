use crate::cache::CacheResult;
use crate::net::{Request, Response};
use crate::worker::{ActivateOutcome, InstallOutcome, PushOutcome, SyncOutcome};

/// Events the host dispatches to the worker
#[derive(Debug)]
pub enum Event {
  /// Populate the static partition for the current version
  Install,
  /// Retire partitions from other versions
  Activate,
  /// An outgoing request from a controlled page
  Fetch(FetchEvent),
  /// Background sync fired for a tag
  Sync { tag: String },
  /// Push message, with or without a payload
  Push { data: Option<Vec<u8>> },
}

/// What handling an event produced
#[derive(Debug)]
pub enum Outcome {
  Installed(InstallOutcome),
  Activated(ActivateOutcome),
  /// A response for a fetch, whether intercepted or not
  Responded(CacheResult<Response>),
  /// The worker declined the fetch; the host sends it to the network itself
  Passthrough(Request),
  Synced(SyncOutcome),
  Pushed(PushOutcome),
}

/// A fetch as seen by the worker.
///
/// The worker must call [`FetchEvent::respond_with`] before doing any
/// asynchronous work; an event that is never claimed is answered by the host
/// from the network.
#[derive(Debug)]
pub struct FetchEvent {
  request: Request,
  claimed: bool,
}

impl FetchEvent {
  pub fn new(request: Request) -> Self {
    Self {
      request,
      claimed: false,
    }
  }

  pub fn request(&self) -> &Request {
    &self.request
  }

  /// Claim the event: the worker will provide the response.
  pub fn respond_with(&mut self) -> ResponseClaim {
    self.claimed = true;
    ResponseClaim(())
  }

  pub fn is_claimed(&self) -> bool {
    self.claimed
  }

  pub fn into_request(self) -> Request {
    self.request
  }
}

/// Proof that a fetch event was claimed. Only [`FetchEvent::respond_with`]
/// creates one.
#[derive(Debug)]
#[must_use]
pub struct ResponseClaim(());

#[cfg(test)]
mod tests {
  use super::*;
  use url::Url;

  #[test]
  fn test_claim_marks_event() {
    let mut event = FetchEvent::new(Request::get(Url::parse("https://site.test/").unwrap()));
    assert!(!event.is_claimed());

    let _claim = event.respond_with();
    assert!(event.is_claimed());
    assert_eq!(event.into_request().url().as_str(), "https://site.test/");
  }
}
