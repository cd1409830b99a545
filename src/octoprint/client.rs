use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::OctoPrintConfig;
use crate::octoprint::{CommandError, PluginCommand, PrinterControl};

/// HTTP client for a plugin's simple API on an OctoPrint host.
///
/// Every command is a `POST /api/plugin/<plugin_id>` with a JSON body, the
/// API key travels in the `X-Api-Key` header.
#[derive(Debug, Clone)]
pub struct OctoPrintClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    plugin_id: String,
}

impl OctoPrintClient {
    pub fn new(config: &OctoPrintConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|key| !key.is_empty()),
            plugin_id: config.plugin_id.clone(),
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/api/plugin/{}", self.base_url, self.plugin_id)
    }

    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl PrinterControl for OctoPrintClient {
    async fn send_command(&self, command: &PluginCommand) -> Result<Value, CommandError> {
        let name = command.name();
        let mut request = self.http.post(self.endpoint()).json(command);
        if let Some(key) = &self.api_key {
            request = request.header("X-Api-Key", key);
        }

        debug!(command = name, url = %self.endpoint(), "Sending plugin command");

        let response = request.send().await.map_err(|e| CommandError::Transport {
            command: name.to_string(),
            message: e.to_string(),
        })?;
        let status = response.status();
        let body = response.text().await.map_err(|e| CommandError::Transport {
            command: name.to_string(),
            message: e.to_string(),
        })?;

        if !status.is_success() {
            let message = error_message(&body)
                .or_else(|| status.canonical_reason().map(str::to_string))
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            warn!(command = name, status = status.as_u16(), %message, "Plugin command rejected");
            return Err(CommandError::Rejected {
                command: name.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&body).map_err(|e| CommandError::InvalidResponse {
            command: name.to_string(),
            message: e.to_string(),
        })
    }
}

/// `{"error": "..."}` bodies carry the message; anything else is used verbatim
fn error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(json) => json
            .get("error")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| Some(trimmed.to_string())),
        Err(_) => Some(trimmed.to_string()),
    }
}
