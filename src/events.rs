//! Fire-and-forget event publishing.

use serde_json::Value;
use tokio::sync::mpsc;

pub const PROCESS_LAUNCHED: &str = "process:launched";
pub const PROCESS_TERMINATED: &str = "process:terminated";
pub const SESSION_CREATED: &str = "session:created";
pub const SESSION_UPDATED: &str = "session:updated";
pub const SESSION_DELETED: &str = "session:deleted";
pub const SESSION_RESTORED: &str = "session:restored";
pub const RECORDING_STARTED: &str = "recording:started";
pub const RECORDING_STOPPED: &str = "recording:stopped";
pub const RECORDING_FAILED: &str = "recording:failed";
pub const RECORDING_EXPORTED: &str = "recording:exported";

/// Destination for named lifecycle events.
pub trait EventBus: Send + Sync {
    fn emit(&self, topic: &str, payload: Value) -> anyhow::Result<()>;
}

/// Publish an event; failures are logged and never propagate.
pub fn publish(bus: &dyn EventBus, topic: &str, payload: Value) {
    if let Err(e) = bus.emit(topic, payload) {
        tracing::warn!(topic, error = %e, "failed to publish event");
    }
}

/// Bus forwarding events into the application loop.
pub struct ChannelBus {
    tx: mpsc::UnboundedSender<(String, Value)>,
}

impl ChannelBus {
    pub fn new(tx: mpsc::UnboundedSender<(String, Value)>) -> Self {
        Self { tx }
    }
}

impl EventBus for ChannelBus {
    fn emit(&self, topic: &str, payload: Value) -> anyhow::Result<()> {
        self.tx
            .send((topic.to_string(), payload))
            .map_err(|_| anyhow::anyhow!("event loop has shut down"))
    }
}
