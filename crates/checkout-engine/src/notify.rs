//! # Shopper Notifications
//!
//! `notify(user, template, data)` is fire-and-forget: it never blocks and
//! never fails the money operation that triggered it.
//!
//! ```text
//!   service ──notify()──► Notifier
//!                           ├── LogNotifier      (tracing only)
//!                           └── ChannelNotifier  (try_send to a mailer task)
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Template {
    OrderPlaced,
    PaymentSucceeded,
    PaymentFailed,
    ReturnRequested,
    RefundCompleted,
    RefundFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: String,
    pub template: Template,
    pub data: Value,
}

pub trait Notifier: Send + Sync {
    fn notify(&self, user_id: &str, template: Template, data: Value);
}

/// Writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, user_id: &str, template: Template, data: Value) {
        info!(user_id = %user_id, template = ?template, %data, "Notification");
    }
}

/// Hands notifications to a consumer over a bounded channel. A full or
/// closed channel drops the message with a warning.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::Sender<Notification>,
}

impl ChannelNotifier {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(capacity);
        (ChannelNotifier { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, user_id: &str, template: Template, data: Value) {
        let notification = Notification {
            user_id: user_id.to_string(),
            template,
            data,
        };
        if let Err(e) = self.tx.try_send(notification) {
            warn!(user_id = %user_id, template = ?template, error = %e, "Notification dropped");
        }
    }
}
