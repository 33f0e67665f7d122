//! User-visible notices.
//!
//! Cart operations never fail loudly at the view: a failure becomes a notice
//! that the view shows as a transient toast. Notices are broadcast, so any
//! number of views can listen; a notice sent with no listener is only logged.

use std::fmt;

use tokio::sync::broadcast;

use crate::error::add_breadcrumb;

const DEFAULT_CAPACITY: usize = 64;

/// Severity of a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoticeLevel {
    /// Something happened the shopper may want to know.
    Info,
    /// The request went through or was skipped, but the shopper should check it.
    Warning,
    /// The request failed.
    Error,
}

impl fmt::Display for NoticeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A message for the shopper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// Severity.
    pub level: NoticeLevel,
    /// Text to display.
    pub message: String,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.level, self.message)
    }
}

/// Broadcasts notices to subscribed views.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notice>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Notifier {
    /// Create a notifier that buffers up to `capacity` notices per slow subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Listen for notices sent from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.tx.subscribe()
    }

    /// Send an informational notice.
    pub fn info(&self, message: impl Into<String>) {
        self.send(NoticeLevel::Info, message.into());
    }

    /// Send a warning.
    pub fn warn(&self, message: impl Into<String>) {
        self.send(NoticeLevel::Warning, message.into());
    }

    /// Send an error.
    pub fn error(&self, message: impl Into<String>) {
        self.send(NoticeLevel::Error, message.into());
    }

    fn send(&self, level: NoticeLevel, message: String) {
        match level {
            NoticeLevel::Info => tracing::info!(notice = %message, "Cart notice"),
            NoticeLevel::Warning => tracing::warn!(notice = %message, "Cart notice"),
            NoticeLevel::Error => tracing::error!(notice = %message, "Cart notice"),
        }
        let level_name = level.to_string();
        add_breadcrumb("notice", &message, Some(&[("level", level_name.as_str())]));

        // No subscriber is fine: the notice is already logged.
        let _ = self.tx.send(Notice { level, message });
    }
}
