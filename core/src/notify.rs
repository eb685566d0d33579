//! Semantic notification events.
//!
//! The core emits events on invitation responses and task status
//! transitions; an external dispatcher routes them to push/email/chat per
//! user preference. The core never performs delivery.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use crate::graph::UserId;

const CHANNEL_CAPACITY: usize = 256;

/// What happened, from the recipient's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NotificationKind {
    /// Someone invited the recipient to a task or subtask.
    InvitationReceived,
    /// An invitation the recipient issued was accepted.
    InvitationAccepted,
    /// An invitation the recipient issued was declined.
    InvitationDeclined,
    /// A task the recipient is involved with changed status.
    TaskStatusChanged,
}

/// A semantic event handed to the external dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    /// Event kind.
    pub kind: NotificationKind,
    /// Recipient.
    pub user_id: UserId,
    /// Short headline.
    pub title: String,
    /// Human-readable body.
    pub message: String,
    /// Opaque reference the consumer can deep-link to (task id, invitation id).
    pub action_ref: String,
    /// Structured details for channel-specific rendering.
    pub metadata: Value,
}

/// Seam between the core and the delivery infrastructure.
pub trait NotificationSink: Send + Sync {
    /// Hands an event to the dispatcher. Must not block.
    fn dispatch(&self, event: NotificationEvent);
}

/// Fans events out to any number of consumers over a broadcast channel.
#[derive(Clone)]
pub struct BroadcastSink {
    sender: broadcast::Sender<NotificationEvent>,
}

impl BroadcastSink {
    /// Creates a sink with the default channel capacity.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Subscribes a consumer to the event stream.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationSink for BroadcastSink {
    fn dispatch(&self, event: NotificationEvent) {
        // No consumers attached is fine; the event is simply dropped.
        let delivered = self.sender.send(event).unwrap_or(0);
        debug!(delivered, "Notification dispatched");
    }
}

/// Discards every event. Useful in tests and headless contexts.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn dispatch(&self, _event: NotificationEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(kind: NotificationKind) -> NotificationEvent {
        NotificationEvent {
            kind,
            user_id: UserId::new("u1"),
            title: "title".into(),
            message: "message".into(),
            action_ref: "t1".into(),
            metadata: json!({}),
        }
    }

    #[tokio::test]
    async fn broadcast_sink_reaches_subscribers() {
        let sink = BroadcastSink::new();
        let mut rx = sink.subscribe();
        sink.dispatch(event(NotificationKind::InvitationAccepted));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.kind, NotificationKind::InvitationAccepted);
    }

    #[test]
    fn dispatch_without_subscribers_is_a_no_op() {
        let sink = BroadcastSink::new();
        sink.dispatch(event(NotificationKind::TaskStatusChanged));
    }
}
