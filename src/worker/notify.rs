use color_eyre::Result;
use serde::Serialize;
use tracing::info;

/// A user-visible notification requested by a push message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub icon: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub badge: Option<String>,
}

/// Displays notifications to the user.
pub trait Notifier: Send + Sync {
  fn show(&self, notification: &Notification) -> Result<()>;
}

/// Notifier that records notifications in the log
pub struct LogNotifier;

impl Notifier for LogNotifier {
  fn show(&self, notification: &Notification) -> Result<()> {
    info!(
      title = %notification.title,
      body = %notification.body,
      icon = %notification.icon,
      badge = notification.badge.as_deref().unwrap_or(""),
      "notification"
    );
    Ok(())
  }
}
