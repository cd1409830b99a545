pub mod client;
pub mod commands;
pub mod errors;
pub mod events;

use async_trait::async_trait;

pub use client::OctoPrintClient;
pub use commands::PluginCommand;
pub use errors::CommandError;
pub use events::{EventChannel, PluginEventBus, PluginEventData, PluginMessage, EXTRUSION_COMPLETED};

/// Identity the calibration plugin uses for its API and push messages
pub const PLUGIN_IDENTIFIER: &str = "CalibrationTools";

/// Printer-control service reached through the host's plugin API
#[async_trait]
pub trait PrinterControl: Send + Sync {
    /// Send one command. Resolves exactly once with the decoded JSON response
    /// (`Value::Null` for an empty body) or the failure.
    async fn send_command(&self, command: &PluginCommand) -> Result<serde_json::Value, CommandError>;
}
