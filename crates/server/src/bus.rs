// crates/server/src/bus.rs
//! Per-session progress fan-out.
//!
//! One bounded broadcast channel per running session. Publishing never
//! blocks the pipeline: a slow subscriber lags and skips (last-value-wins),
//! an absent subscriber costs nothing. The channel is removed right after
//! the terminal event, so per-job channels never accumulate; late joiners
//! are served a snapshot from the session store by the SSE route instead.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::Serialize;
use tokio::sync::broadcast;

/// Per-subscriber buffer. Lagging past this many unread events skips ahead.
const SUBSCRIBER_BUFFER: usize = 64;

/// One event on a session's progress stream.
///
/// Serializes to the wire union consumed by SSE clients:
/// `{stage, message, progress}` for updates, `{stage: "complete", result}`
/// on success, `{stage: "error", error}` on failure.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ProgressEvent {
    Update {
        stage: String,
        message: String,
        progress: u8,
    },
    Completed {
        stage: String,
        result: serde_json::Value,
    },
    Failed {
        stage: String,
        error: String,
    },
}

impl ProgressEvent {
    pub fn update(progress: u8, stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Update {
            stage: stage.into(),
            message: message.into(),
            progress,
        }
    }

    pub fn completed(result: serde_json::Value) -> Self {
        Self::Completed {
            stage: "complete".to_string(),
            result,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            stage: "error".to_string(),
            error: error.into(),
        }
    }

    /// True for the events that end a stream.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Update { .. })
    }
}

/// Broadcast hub for all running sessions.
#[derive(Debug, Default)]
pub struct ProgressBus {
    channels: RwLock<HashMap<String, broadcast::Sender<ProgressEvent>>>,
}

impl ProgressBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the channel for a freshly started session.
    pub fn open(&self, session_id: &str) {
        let (tx, _) = broadcast::channel(SUBSCRIBER_BUFFER);
        match self.channels.write() {
            Ok(mut channels) => {
                if channels.insert(session_id.to_string(), tx).is_some() {
                    tracing::warn!(session_id, "progress channel already open, replaced");
                }
            }
            Err(e) => tracing::error!("RwLock poisoned opening progress channel: {e}"),
        }
    }

    /// Publish an event to whoever is listening. Never blocks; an event with
    /// no subscribers is simply dropped.
    pub fn publish(&self, session_id: &str, event: ProgressEvent) {
        match self.channels.read() {
            Ok(channels) => {
                if let Some(tx) = channels.get(session_id) {
                    let _ = tx.send(event);
                }
            }
            Err(e) => tracing::error!("RwLock poisoned publishing progress: {e}"),
        }
    }

    /// Join a session's live stream from this point onward. `None` when the
    /// session has no open channel (unknown, or already torn down).
    pub fn subscribe(&self, session_id: &str) -> Option<broadcast::Receiver<ProgressEvent>> {
        match self.channels.read() {
            Ok(channels) => channels.get(session_id).map(|tx| tx.subscribe()),
            Err(e) => {
                tracing::error!("RwLock poisoned subscribing to progress: {e}");
                None
            }
        }
    }

    /// Tear down a session's channel. Subscribers drain buffered events
    /// (including the terminal one) and then observe channel closure.
    pub fn close(&self, session_id: &str) {
        match self.channels.write() {
            Ok(mut channels) => {
                channels.remove(session_id);
            }
            Err(e) => tracing::error!("RwLock poisoned closing progress channel: {e}"),
        }
    }

    /// Number of open channels (at most one while the gate does its job).
    pub fn open_channels(&self) -> usize {
        match self.channels.read() {
            Ok(channels) => channels.len(),
            Err(e) => {
                tracing::error!("RwLock poisoned counting progress channels: {e}");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::RecvError;

    #[test]
    fn event_wire_shapes() {
        let update = ProgressEvent::update(35, "extract", "Extracting candidate therapies...");
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["stage"], "extract");
        assert_eq!(json["progress"], 35);
        assert!(!update.is_terminal());

        let done = ProgressEvent::completed(serde_json::json!({"ok": true}));
        let json = serde_json::to_value(&done).unwrap();
        assert_eq!(json["stage"], "complete");
        assert_eq!(json["result"]["ok"], true);
        assert!(done.is_terminal());

        let failed = ProgressEvent::failed("boom");
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["stage"], "error");
        assert_eq!(json["error"], "boom");
        assert!(failed.is_terminal());
    }

    #[tokio::test]
    async fn subscribers_see_events_from_join_point_onward() {
        let bus = ProgressBus::new();
        bus.open("s1");

        // Published before anyone subscribes: dropped, not replayed.
        bus.publish("s1", ProgressEvent::update(5, "search", "early"));

        let mut rx = bus.subscribe("s1").unwrap();
        bus.publish("s1", ProgressEvent::update(20, "extract", "later"));

        match rx.recv().await.unwrap() {
            ProgressEvent::Update { progress, .. } => assert_eq!(progress, 20),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn close_after_terminal_still_delivers_buffered_events() {
        let bus = ProgressBus::new();
        bus.open("s1");
        let mut rx = bus.subscribe("s1").unwrap();

        bus.publish("s1", ProgressEvent::completed(serde_json::json!({})));
        bus.close("s1");
        assert_eq!(bus.open_channels(), 0);

        // The buffered terminal event arrives, then the channel reports closed.
        assert!(rx.recv().await.unwrap().is_terminal());
        assert!(matches!(rx.recv().await, Err(RecvError::Closed)));
    }

    #[test]
    fn publish_without_channel_or_subscribers_is_a_no_op() {
        let bus = ProgressBus::new();
        // Unknown session: nothing to do.
        bus.publish("ghost", ProgressEvent::update(1, "search", "x"));

        // Open but unobserved: send error is swallowed.
        bus.open("s1");
        bus.publish("s1", ProgressEvent::update(1, "search", "x"));
    }

    #[tokio::test]
    async fn subscribe_after_close_returns_none() {
        let bus = ProgressBus::new();
        bus.open("s1");
        bus.close("s1");
        assert!(bus.subscribe("s1").is_none());
        assert!(bus.subscribe("never-opened").is_none());
    }
}
