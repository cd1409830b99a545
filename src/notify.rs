use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::octoprint::CommandError;

static MARKUP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid markup pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => f.write_str("info"),
            Severity::Warning => f.write_str("warning"),
            Severity::Error => f.write_str("error"),
        }
    }
}

/// User-facing notification sink. Warning and error messages may contain
/// simple HTML markup.
pub trait Notifier: Send + Sync {
    fn notify(&self, severity: Severity, title: &str, message: &str);

    /// Shared reporter for raw command failures
    fn report_failure(&self, error: &CommandError);

    fn info(&self, title: &str, message: &str) {
        self.notify(Severity::Info, title, message);
    }

    fn warning(&self, title: &str, message: &str) {
        self.notify(Severity::Warning, title, message);
    }

    fn error(&self, title: &str, message: &str) {
        self.notify(Severity::Error, title, message);
    }
}

/// Prints notifications to the terminal and mirrors them into the log
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, severity: Severity, title: &str, message: &str) {
        let text = strip_markup(message);
        match severity {
            Severity::Info => {
                info!(%title, message = %text, "Notification");
                println!("✅ {title}: {text}");
            }
            Severity::Warning => {
                warn!(%title, message = %text, "Notification");
                println!("⚠️  {title}: {text}");
            }
            Severity::Error => {
                error!(%title, message = %text, "Notification");
                println!("❌ {title}: {text}");
            }
        }
    }

    fn report_failure(&self, error: &CommandError) {
        error!(command = error.command(), status = ?error.status(), "Command failed: {}", error);
        println!("❌ {} failed", error.command());
        println!("   {}", error.server_message());
        match error {
            CommandError::Transport { .. } => {
                println!("🔧 Check that the printer host is reachable and the API key is valid");
            }
            CommandError::Rejected { status: 401 | 403, .. } => {
                println!("🔧 The API key was refused: set OCTOPRINT_API_KEY or octoprint.api_key");
            }
            _ => {}
        }
    }
}

/// Reduce rich notification text to plain text for terminals and logs
pub fn strip_markup(message: &str) -> String {
    let with_breaks = message.replace("<br>", " ").replace("<br/>", " ").replace("<br />", " ");
    let plain = MARKUP.replace_all(&with_breaks, "");
    plain.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_markup() {
        let rich = "<b>Heating nozzle has started!</b><br>Extrusion is in progress.";
        assert_eq!(strip_markup(rich), "Heating nozzle has started! Extrusion is in progress.");
        assert_eq!(strip_markup("plain text"), "plain text");
    }

    #[test]
    fn test_severity_display() {
        assert_eq!(Severity::Warning.to_string(), "warning");
        assert_eq!(serde_json::to_value(Severity::Error).unwrap(), serde_json::json!("error"));
    }
}
