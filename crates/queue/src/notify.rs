//! Best-effort notification delivery.
//!
//! Notifications never block or fail the job pipeline: every channel is
//! fire-and-forget, and delivery failures are logged and dropped.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

/// A named action the user can take on a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

impl NotificationAction {
    pub fn new(action: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            title: title.into(),
        }
    }
}

/// A user-facing notice with optional actions and an opaque data payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "JsonValue::is_null")]
    pub data: JsonValue,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<NotificationAction>,
}

impl Notification {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            icon: None,
            data: JsonValue::Null,
            actions: Vec::new(),
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn with_data(mut self, data: JsonValue) -> Self {
        self.data = data;
        self
    }

    pub fn with_action(mut self, action: impl Into<String>, title: impl Into<String>) -> Self {
        self.actions.push(NotificationAction::new(action, title));
        self
    }
}

/// Message relayed to a background worker context so a longer-lived host can
/// re-display the alert. Serializes as
/// `{"type":"SHOW_NOTIFICATION","payload":{...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    ShowNotification(Notification),
}

/// Delivery error for a single channel. Callers log it and move on.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification channel closed")]
    Closed,
}

/// A single best-effort delivery channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// Broadcast-backed channel the embedding UI subscribes to.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: broadcast::Sender<Notification>,
}

impl ChannelNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        // Send fails only when nobody is subscribed.
        self.tx.send(notification).map_err(|_| NotifyError::Closed)?;
        Ok(())
    }
}

/// Relays notifications to a background worker context as [`WorkerMessage`]s.
#[derive(Debug, Clone)]
pub struct WorkerRelayNotifier {
    tx: mpsc::UnboundedSender<WorkerMessage>,
}

impl WorkerRelayNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<WorkerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Notifier for WorkerRelayNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        self.tx
            .send(WorkerMessage::ShowNotification(notification))
            .map_err(|_| NotifyError::Closed)
    }
}

/// Tracing-only sink for headless embedding and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        tracing::info!(
            title = %notification.title,
            body = %notification.body,
            actions = notification.actions.len(),
            "notification"
        );
        Ok(())
    }
}

/// Fans a notification out to independent channels. Each channel is
/// best-effort; a failed channel is logged and never affects the others or
/// the caller.
pub struct FanoutNotifier {
    channels: Vec<Arc<dyn Notifier>>,
}

impl FanoutNotifier {
    pub fn new(primary: Arc<dyn Notifier>) -> Self {
        Self {
            channels: vec![primary],
        }
    }

    pub fn with_channel(mut self, channel: Arc<dyn Notifier>) -> Self {
        self.channels.push(channel);
        self
    }
}

#[async_trait]
impl Notifier for FanoutNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        for (index, channel) in self.channels.iter().enumerate() {
            match channel.notify(notification.clone()).await {
                Ok(()) => {}
                Err(err) => {
                    warn!(channel = index, error = %err, "notification channel failed");
                }
            }
        }
        debug!(title = %notification.title, "notification fanned out");
        Ok(())
    }
}
