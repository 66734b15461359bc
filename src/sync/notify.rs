use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// Transient user-facing message (a toast)
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl Notification {
    pub fn new(level: NotificationLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            at: Utc::now(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Error, message)
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Keeps the most recent notifications for the UI to pick up
pub struct NotificationFeed {
    capacity: usize,
    items: Mutex<VecDeque<Notification>>,
}

impl NotificationFeed {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            items: Mutex::new(VecDeque::new()),
        }
    }

    /// Newest first
    pub fn recent(&self) -> Vec<Notification> {
        self.items.lock().iter().rev().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Notifier for NotificationFeed {
    fn notify(&self, notification: Notification) {
        match notification.level {
            NotificationLevel::Info => tracing::info!("Notification: {}", notification.message),
            NotificationLevel::Warning => tracing::warn!("Notification: {}", notification.message),
            NotificationLevel::Error => tracing::error!("Notification: {}", notification.message),
        }

        let mut items = self.items.lock();
        if items.len() == self.capacity {
            items.pop_front();
        }
        items.push_back(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_is_bounded_and_newest_first() {
        let feed = NotificationFeed::new(2);
        feed.notify(Notification::error("first"));
        feed.notify(Notification::error("second"));
        feed.notify(Notification::new(NotificationLevel::Info, "third"));

        let recent = feed.recent();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].message, "third");
        assert_eq!(recent[1].message, "second");
    }
}
