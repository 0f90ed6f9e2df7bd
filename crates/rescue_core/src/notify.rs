//! Notification dispatcher collaborator.
//!
//! Send-to-one and send-to-many by opaque device token. Engine operations
//! treat delivery as a side effect: a failed send is logged and ignored, it
//! never rolls back the state change that triggered it.

use serde_json::Value;
use tracing::debug;

use crate::error::NotifyError;

/// A push notification payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    /// Structured payload delivered alongside the text (ids, distances).
    pub data: Value,
}

impl Notification {
    pub fn new(title: impl Into<String>, body: impl Into<String>, data: Value) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            data,
        }
    }
}

/// Outcome of a multicast send.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MulticastOutcome {
    pub delivered: usize,
    pub failed: usize,
}

/// Trait for notification backends.
pub trait Notifier: Send + Sync {
    fn send(&self, token: &str, notification: &Notification) -> Result<(), NotifyError>;

    fn send_multicast(
        &self,
        tokens: &[String],
        notification: &Notification,
    ) -> Result<MulticastOutcome, NotifyError> {
        let mut outcome = MulticastOutcome::default();
        for token in tokens {
            match self.send(token, notification) {
                Ok(()) => outcome.delivered += 1,
                Err(_) => outcome.failed += 1,
            }
        }
        Ok(outcome)
    }
}

/// Logs and drops every notification. Default backend when no push provider
/// is wired up.
#[derive(Debug, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn send(&self, token: &str, notification: &Notification) -> Result<(), NotifyError> {
        debug!(token, title = %notification.title, "dropping notification (no push backend)");
        Ok(())
    }
}
