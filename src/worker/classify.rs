use url::{Origin, Url};

use crate::net::Request;

/// How an intercepted request is routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
  /// Accept header asks for HTML: network-first
  Navigation,
  /// Same-origin (or allow-listed) file with a static extension: cache-first
  StaticAsset,
  /// Not intercepted
  Other,
}

/// Pure request classification; depends only on the URL and Accept header.
#[derive(Debug, Clone)]
pub struct Classifier {
  origin: Origin,
  allowed_hosts: Vec<String>,
  extensions: Vec<String>,
}

impl Classifier {
  pub fn new(origin: &Url, allowed_hosts: &[String], extensions: &[String]) -> Self {
    Self {
      origin: origin.origin(),
      allowed_hosts: allowed_hosts.iter().map(|h| h.to_lowercase()).collect(),
      extensions: extensions.iter().map(|e| e.to_lowercase()).collect(),
    }
  }

  pub fn classify(&self, request: &Request) -> RequestClass {
    if request.accepts_html() {
      return RequestClass::Navigation;
    }

    let url = request.url();
    if self.is_trusted_origin(url) && self.has_asset_extension(url) {
      return RequestClass::StaticAsset;
    }

    RequestClass::Other
  }

  fn is_trusted_origin(&self, url: &Url) -> bool {
    if url.origin() == self.origin {
      return true;
    }
    url.host_str().is_some_and(|host| {
      let host = host.to_lowercase();
      self
        .allowed_hosts
        .iter()
        .any(|allowed| host == *allowed || host.ends_with(&format!(".{allowed}")))
    })
  }

  fn has_asset_extension(&self, url: &Url) -> bool {
    let file = url.path().rsplit('/').next().unwrap_or_default();
    match file.rsplit_once('.') {
      Some((_, ext)) => {
        let ext = ext.to_lowercase();
        self.extensions.iter().any(|e| *e == ext)
      }
      None => false,
    }
  }
}
