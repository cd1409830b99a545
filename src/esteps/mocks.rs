// Test doubles for the printer-control service and the notification sink

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::notify::{Notifier, Severity};
use crate::octoprint::{CommandError, PluginCommand, PrinterControl};

/// Printer service that records every command and replays queued responses.
/// Commands without a queued response succeed with `Value::Null`.
#[derive(Debug, Default)]
pub struct MockPrinterControl {
    pub responses: Mutex<HashMap<&'static str, VecDeque<Result<Value, CommandError>>>>,
    pub executed_commands: Mutex<Vec<PluginCommand>>,
}

impl MockPrinterControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_response(&self, command: &'static str, response: Result<Value, CommandError>) {
        self.responses
            .lock()
            .unwrap()
            .entry(command)
            .or_default()
            .push_back(response);
    }

    pub fn queue_rejection(&self, command: &'static str, message: &str) {
        self.queue_response(
            command,
            Err(CommandError::Rejected {
                command: command.to_string(),
                status: 409,
                message: message.to_string(),
            }),
        );
    }

    pub fn get_executed_commands(&self) -> Vec<PluginCommand> {
        self.executed_commands.lock().unwrap().clone()
    }

    pub fn count(&self, command: &str) -> usize {
        self.executed_commands
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.name() == command)
            .count()
    }

    pub fn clear_executed_commands(&self) {
        self.executed_commands.lock().unwrap().clear();
    }
}

#[async_trait]
impl PrinterControl for MockPrinterControl {
    async fn send_command(&self, command: &PluginCommand) -> Result<Value, CommandError> {
        self.executed_commands.lock().unwrap().push(command.clone());
        self.responses
            .lock()
            .unwrap()
            .get_mut(command.name())
            .and_then(VecDeque::pop_front)
            .unwrap_or(Ok(Value::Null))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedNotification {
    pub severity: Severity,
    pub title: String,
    pub message: String,
}

/// Notifier that keeps everything it is told
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    pub notifications: Mutex<Vec<RecordedNotification>>,
    pub failures: Mutex<Vec<CommandError>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<RecordedNotification> {
        self.notifications.lock().unwrap().clone()
    }

    pub fn failures(&self) -> Vec<CommandError> {
        self.failures.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<RecordedNotification> {
        self.notifications.lock().unwrap().last().cloned()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, severity: Severity, title: &str, message: &str) {
        self.notifications.lock().unwrap().push(RecordedNotification {
            severity,
            title: title.to_string(),
            message: message.to_string(),
        });
    }

    fn report_failure(&self, error: &CommandError) {
        self.failures.lock().unwrap().push(error.clone());
    }
}
