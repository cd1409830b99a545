use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// State value pushed by the plugin when a test extrusion finishes
pub const EXTRUSION_COMPLETED: &str = "extrusion_completed";

/// Asynchronous push message emitted by a host plugin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginMessage {
    /// Identity of the emitting plugin
    pub plugin: String,
    pub data: PluginEventData,
}

/// Payload of a plugin message. The e-steps flow sends `state`, the PID
/// backend sends `type` + `message` notifications.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginEventData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl PluginMessage {
    pub fn with_state(plugin: &str, state: &str) -> Self {
        Self {
            plugin: plugin.to_string(),
            data: PluginEventData {
                state: Some(state.to_string()),
                ..Default::default()
            },
        }
    }

    pub fn is_from(&self, plugin: &str) -> bool {
        self.plugin == plugin
    }

    pub fn state(&self) -> Option<&str> {
        self.data.state.as_deref()
    }

    /// Extract a plugin message from a raw push-socket frame of the form
    /// `{"plugin": {"plugin": "<id>", "data": {...}}}`. Other frame kinds
    /// (`current`, `history`, `event`, ...) yield `None`.
    pub fn from_socket_frame(frame: &str) -> Option<Self> {
        let value: serde_json::Value = match serde_json::from_str(frame) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Discarding malformed push frame");
                return None;
            }
        };
        let payload = value.get("plugin")?.clone();
        match serde_json::from_value(payload) {
            Ok(message) => Some(message),
            Err(e) => {
                debug!(error = %e, "Plugin frame without a usable payload");
                None
            }
        }
    }
}

/// Source of plugin push messages
pub trait EventChannel: Send + Sync {
    /// New receiver that sees every message published after this call
    fn subscribe(&self) -> broadcast::Receiver<PluginMessage>;
}

/// In-process fan-out of plugin messages. A socket reader publishes
/// into it, workflows subscribe to it.
#[derive(Debug, Clone)]
pub struct PluginEventBus {
    sender: broadcast::Sender<PluginMessage>,
}

impl Default for PluginEventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

impl PluginEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Deliver a message to every subscriber, returns how many received it
    pub fn publish(&self, message: PluginMessage) -> usize {
        match self.sender.send(message) {
            Ok(receivers) => receivers,
            Err(_) => {
                debug!("Plugin message published with no subscribers");
                0
            }
        }
    }

    /// Parse and publish a raw socket frame, ignoring non-plugin frames
    pub fn publish_frame(&self, frame: &str) -> usize {
        match PluginMessage::from_socket_frame(frame) {
            Some(message) => self.publish(message),
            None => 0,
        }
    }
}

impl EventChannel for PluginEventBus {
    fn subscribe(&self) -> broadcast::Receiver<PluginMessage> {
        self.sender.subscribe()
    }
}
