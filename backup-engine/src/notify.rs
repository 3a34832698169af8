//! Notification sink for the failure-escalation path.
//!
//! Fire-and-forget: the engine warns, the app decides how to surface it
//! (toast, banner). Successful background sync stays invisible.

use tracing::error;

pub trait NotificationSink: Send + Sync {
    fn warn(&self, title: &str, description: &str);
}

/// Default sink that only logs. Useful headless and in tests.
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn warn(&self, title: &str, description: &str) {
        error!(title, description, "backup warning");
    }
}
