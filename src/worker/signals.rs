use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use tracing::{debug, info};

use super::{Notification, Notifier, OfflineCacheManager};
use crate::cache::CacheStore;
use crate::net::Network;

const DEFAULT_TITLE: &str = "Notification";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
  /// Known tag; acknowledged immediately
  Resolved,
  /// Unknown tag; nothing to wait for
  Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
  /// Push without payload
  NoPayload,
  Shown(Notification),
}

impl<S: CacheStore, N: Network, P: Notifier> OfflineCacheManager<S, N, P> {
  /// Background sync. Known tags resolve at once: there is no queued
  /// submission to replay yet. Never fails.
  pub async fn on_sync(&self, tag: &str) -> SyncOutcome {
    if self.settings.sync_tags.iter().any(|t| t == tag) {
      info!(tag, "background sync");
      SyncOutcome::Resolved
    } else {
      debug!(tag, "ignoring unknown sync tag");
      SyncOutcome::Ignored
    }
  }

  /// Show a notification for a push payload of the form `{"title", "body"}`.
  ///
  /// A payload that is not JSON fails this push only.
  pub async fn on_push(&self, data: Option<&[u8]>) -> Result<PushOutcome> {
    let Some(data) = data else {
      return Ok(PushOutcome::NoPayload);
    };

    let payload: Value =
      serde_json::from_slice(data).map_err(|e| eyre!("Malformed push payload: {}", e))?;

    let notification = Notification {
      title: field_text(&payload, "title").unwrap_or_else(|| DEFAULT_TITLE.to_string()),
      body: field_text(&payload, "body").unwrap_or_default(),
      icon: self.settings.icon.clone(),
      badge: self.settings.badge.clone(),
    };

    self.notifier.show(&notification)?;
    Ok(PushOutcome::Shown(notification))
  }
}

/// Text of a payload field, or None when it is missing, empty or false-like.
fn field_text(payload: &Value, field: &str) -> Option<String> {
  match payload.get(field)? {
    Value::String(s) if !s.is_empty() => Some(s.clone()),
    Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
    Value::Bool(true) => Some("true".to_string()),
    _ => None,
  }
}
