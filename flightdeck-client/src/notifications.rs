//! Toast notifications.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToastVariant {
    #[default]
    Default,
    Destructive,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Toast {
    pub title: String,
    pub description: Option<String>,
    pub variant: ToastVariant,
    pub created_at: DateTime<Utc>,
}

impl Toast {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            variant: ToastVariant::Default,
            created_at: Utc::now(),
        }
    }

    pub fn destructive(title: impl Into<String>) -> Self {
        Self::new(title).with_variant(ToastVariant::Destructive)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_variant(mut self, variant: ToastVariant) -> Self {
        self.variant = variant;
        self
    }

    pub fn is_destructive(&self) -> bool {
        self.variant == ToastVariant::Destructive
    }
}

/// Sink for user-facing notifications.
pub trait Notifier: Send + Sync {
    fn notify(&self, toast: Toast);
}

/// Bounded in-memory queue of recent toasts.
#[derive(Debug)]
pub struct NotificationCenter {
    capacity: usize,
    toasts: Mutex<VecDeque<Toast>>,
}

impl NotificationCenter {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            toasts: Mutex::new(VecDeque::new()),
        }
    }

    pub fn recent(&self) -> Vec<Toast> {
        self.toasts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn drain(&self) -> Vec<Toast> {
        self.toasts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect()
    }
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new(32)
    }
}

impl Notifier for NotificationCenter {
    fn notify(&self, toast: Toast) {
        let mut toasts = self.toasts.lock().unwrap_or_else(PoisonError::into_inner);
        if toasts.len() == self.capacity {
            toasts.pop_front();
        }
        toasts.push_back(toast);
    }
}

/// Writes toasts to the log. Used by the CLI.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, toast: Toast) {
        let description = toast.description.as_deref().unwrap_or("");
        match toast.variant {
            ToastVariant::Default => info!(title = %toast.title, description, "Notification"),
            ToastVariant::Destructive => warn!(title = %toast.title, description, "Notification"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center_drops_oldest_beyond_capacity() {
        let center = NotificationCenter::new(2);
        center.notify(Toast::new("one"));
        center.notify(Toast::new("two"));
        center.notify(Toast::destructive("three"));

        let titles: Vec<String> = center.recent().into_iter().map(|t| t.title).collect();
        assert_eq!(titles, vec!["two", "three"]);
        assert_eq!(center.drain().len(), 2);
        assert!(center.recent().is_empty());
    }

    #[test]
    fn test_toast_builder() {
        let toast = Toast::destructive("Error").with_description("Alert not found");
        assert!(toast.is_destructive());
        assert_eq!(toast.description.as_deref(), Some("Alert not found"));
    }
}
