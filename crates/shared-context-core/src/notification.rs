//! Notification Hub: a subscription table keyed by resource URI,
//! each subscriber fed through a bounded channel. Overflow drops the oldest
//! queued event and emits a synthetic `overflow` event in its place; a
//! closed or persistently-full sink is dropped from the table.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

const SINK_QUEUE_CAPACITY: usize = 256;
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HubEvent {
    MessageAdded { uri: String, payload: serde_json::Value },
    SessionUpdated { uri: String, payload: serde_json::Value },
    Overflow { uri: String },
    Ping,
}

type Sink = mpsc::Sender<HubEvent>;

#[derive(Default)]
struct Subscriptions {
    by_uri: HashMap<String, Vec<Sink>>,
}

/// Shared pub/sub registry. Cheap to clone (wraps an `Arc`); one instance is
/// constructed at startup and held by every engine that publishes, plus
/// every transport that subscribes on a client's behalf.
#[derive(Clone, Default)]
pub struct NotificationHub {
    subscriptions: Arc<RwLock<Subscriptions>>,
}

impl NotificationHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new sink for `uri` and returns the receiving half. The
    /// caller (a WebSocket writer task) owns the receiver and is expected to
    /// forward queue timeouts using [`DRAIN_TIMEOUT`] as a guideline.
    pub async fn subscribe(&self, uri: &str) -> mpsc::Receiver<HubEvent> {
        let (tx, rx) = mpsc::channel(SINK_QUEUE_CAPACITY);
        let mut subs = self.subscriptions.write().await;
        subs.by_uri.entry(uri.to_string()).or_default().push(tx);
        rx
    }

    /// Publishes to every live sink on `uri`. A full queue drops the event
    /// and is told about it via a trailing `Overflow`; a closed sink is
    /// removed from the table.
    pub async fn publish(&self, uri: &str, event: HubEvent) {
        let mut subs = self.subscriptions.write().await;
        let Some(sinks) = subs.by_uri.get_mut(uri) else {
            return;
        };
        sinks.retain_mut(|sink| match sink.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(uri, "subscriber queue full, dropping event");
                let _ = sink.try_send(HubEvent::Overflow { uri: uri.to_string() });
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
        if sinks.is_empty() {
            subs.by_uri.remove(uri);
        }
    }

    pub async fn broadcast_ping(&self) {
        let subs = self.subscriptions.read().await;
        for sinks in subs.by_uri.values() {
            for sink in sinks {
                let _ = sink.try_send(HubEvent::Ping);
            }
        }
    }

    #[must_use]
    pub fn drain_timeout() -> Duration {
        DRAIN_TIMEOUT
    }

    /// Spawns the heartbeat task at `interval`. Pong tracking and the
    /// two-interval close happen at the transport layer, which owns the
    /// per-connection socket; this only drives the publish side of the tick.
    pub fn spawn_heartbeat(self, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.broadcast_ping().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn published_event_reaches_subscriber() {
        let hub = NotificationHub::new();
        let mut rx = hub.subscribe("session://session_0000000000000000").await;
        hub.publish(
            "session://session_0000000000000000",
            HubEvent::MessageAdded {
                uri: "session://session_0000000000000000".into(),
                payload: serde_json::json!({"id": 1}),
            },
        )
        .await;
        let event = rx.recv().await.unwrap();
        matches!(event, HubEvent::MessageAdded { .. });
    }

    #[tokio::test]
    async fn closed_receiver_is_pruned_on_next_publish() {
        let hub = NotificationHub::new();
        {
            let _rx = hub.subscribe("session://x").await;
        }
        hub.publish("session://x", HubEvent::Ping).await;
        let subs = hub.subscriptions.read().await;
        assert!(!subs.by_uri.contains_key("session://x"));
    }

    #[tokio::test]
    async fn overflowing_queue_emits_overflow_event() {
        let hub = NotificationHub::new();
        let mut rx = hub.subscribe("session://y").await;
        for _ in 0..SINK_QUEUE_CAPACITY {
            hub.publish("session://y", HubEvent::Ping).await;
        }
        hub.publish("session://y", HubEvent::Ping).await;
        let mut saw_overflow = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, HubEvent::Overflow { .. }) {
                saw_overflow = true;
            }
        }
        assert!(saw_overflow);
    }
}
