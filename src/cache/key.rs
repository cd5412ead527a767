//! Request identity and versioned partition names.

use sha2::{Digest, Sha256};
use std::fmt;

use crate::net::Request;

/// Identity of a cached request: method plus absolute URL (fragment excluded).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
  method: String,
  url: String,
}

impl RequestKey {
  pub fn for_request(request: &Request) -> Self {
    let mut url = request.url().clone();
    url.set_fragment(None);
    Self {
      method: request.method().to_string(),
      url: url.into(),
    }
  }

  pub fn method(&self) -> &str {
    &self.method
  }

  pub fn url(&self) -> &str {
    &self.url
  }

  /// Stable, fixed-length storage key.
  pub fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_bytes());
    hasher.update(b" ");
    hasher.update(self.url.as_bytes());
    hex::encode(hasher.finalize())
  }
}

impl fmt::Display for RequestKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {}", self.method, self.url)
  }
}

/// Which of the two partitions a name refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionKind {
  /// Shell assets written once at install time
  Static,
  /// Responses observed while serving requests
  Runtime,
}

impl PartitionKind {
  fn prefix(self) -> &'static str {
    match self {
      Self::Static => "static",
      Self::Runtime => "runtime",
    }
  }
}

/// A partition name of the form `<static|runtime>-<version>`.
///
/// The name doubles as the version marker in persisted state, so anything that
/// does not parse back into the current pair is stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheName {
  kind: PartitionKind,
  version: String,
  name: String,
}

impl CacheName {
  pub fn new(kind: PartitionKind, version: &str) -> Self {
    Self {
      kind,
      version: version.to_string(),
      name: format!("{}-{}", kind.prefix(), version),
    }
  }

  /// Parse a stored partition name. Returns None for names this manager never creates.
  pub fn parse(name: &str) -> Option<Self> {
    let (prefix, version) = name.split_once('-')?;
    let kind = match prefix {
      "static" => PartitionKind::Static,
      "runtime" => PartitionKind::Runtime,
      _ => return None,
    };
    if version.is_empty() {
      return None;
    }
    Some(Self::new(kind, version))
  }

  pub fn kind(&self) -> PartitionKind {
    self.kind
  }

  pub fn version(&self) -> &str {
    &self.version
  }

  pub fn as_str(&self) -> &str {
    &self.name
  }
}

impl fmt::Display for CacheName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.name)
  }
}
