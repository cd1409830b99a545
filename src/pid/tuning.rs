use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

use super::types::{CurrentPidValues, PidAutotuneRequest, PidCycles, PidError};
use crate::notify::{Notifier, Severity};
use crate::octoprint::{CommandError, EventChannel, PluginCommand, PluginMessage, PrinterControl, PLUGIN_IDENTIFIER};
use crate::telemetry::{create_command_span, generate_correlation_id};

/// PID autotune helper speaking to the same plugin as the E-steps workflow
#[derive(Clone)]
pub struct PidTuning {
    printer: Arc<dyn PrinterControl>,
    notifier: Arc<dyn Notifier>,
    plugin_id: String,
}

impl PidTuning {
    pub fn new(printer: Arc<dyn PrinterControl>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            printer,
            notifier,
            plugin_id: PLUGIN_IDENTIFIER.to_string(),
        }
    }

    pub fn with_plugin_id(mut self, plugin_id: impl Into<String>) -> Self {
        self.plugin_id = plugin_id.into();
        self
    }

    /// Gains currently stored in the firmware
    pub async fn load_current_values(&self) -> Result<CurrentPidValues, CommandError> {
        let span = create_command_span("pid_load_current", &self.plugin_id, &generate_correlation_id());
        async {
            info!("Loading current PID values");
            match self.printer.send_command(&PluginCommand::PidLoadCurrentValues).await {
                Ok(response) => {
                    debug!(%response, "pid_getCurrentValues response");
                    let current = CurrentPidValues::from_response(&response);
                    if current.hot_end.is_none() && current.bed.is_none() {
                        warn!("Firmware reported no PID values");
                    }
                    Ok(current)
                }
                Err(e) => {
                    error!(error = %e, "Loading PID values failed");
                    self.notifier.error("Error loading PID values", e.server_message());
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Validate and dispatch an autotune run. Bed requests are sent with the
    /// bed heater index whatever the caller set.
    pub async fn start_autotune(&self, request: &PidAutotuneRequest) -> Result<(), PidError> {
        let span = create_command_span("pid_start", &self.plugin_id, &generate_correlation_id());
        async {
            let request = request.clone().normalized();
            if let Err(e) = request.validate() {
                warn!(error = %e, "Rejected PID autotune request");
                self.notifier.warning("Invalid PID autotune request", &e.to_string());
                return Err(e);
            }

            info!(heater = %request.heater, script = ?request.gcode(), "Starting PID autotune");
            match self.printer.send_command(&PluginCommand::PidStart(request.clone())).await {
                Ok(_) => {
                    self.notifier.warning(
                        "PID autotune started",
                        &format!(
                            "Tuning the <b>{}</b> at {}°C over {} cycles. Do not leave the printer unattended.",
                            request.heater, request.target_temp, request.no_cycles
                        ),
                    );
                    Ok(())
                }
                Err(e) => {
                    error!(error = %e, "Starting PID autotune failed");
                    self.notifier.error("Error on starting PID autotune", e.server_message());
                    Err(e.into())
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Per-cycle values collected so far
    pub async fn fetch_cycles(&self) -> Result<PidCycles, CommandError> {
        let span = create_command_span("pid_get_values", &self.plugin_id, &generate_correlation_id());
        async {
            match self.printer.send_command(&PluginCommand::PidGetValues).await {
                Ok(response) => {
                    debug!(%response, "pid_getValues response");
                    Ok(PidCycles::from_response(&response))
                }
                Err(e) => {
                    error!(error = %e, "Fetching PID cycles failed");
                    self.notifier.error("Error fetching PID values", e.server_message());
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    pub async fn save(&self) -> Result<PidCycles, CommandError> {
        let span = create_command_span("pid_save", &self.plugin_id, &generate_correlation_id());
        async {
            info!("Saving PID values");
            match self.printer.send_command(&PluginCommand::PidSave).await {
                Ok(response) => {
                    let cycles = PidCycles::from_response(&response);
                    self.notifier.info("Saved", "PID values have been saved to the firmware");
                    Ok(cycles)
                }
                Err(e) => {
                    error!(error = %e, "Saving PID values failed");
                    self.notifier.report_failure(&e);
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Forward a backend `{type, message}` push as a notification
    pub fn on_plugin_message(&self, message: &PluginMessage) {
        forward_message(self.notifier.as_ref(), &self.plugin_id, message);
    }

    /// Forward pushed messages until the channel closes. `None` outside a
    /// tokio runtime.
    pub fn subscribe(&self, events: &dyn EventChannel) -> Option<JoinHandle<()>> {
        let mut receiver = events.subscribe();
        let handle = tokio::runtime::Handle::try_current().ok()?;
        let notifier = Arc::clone(&self.notifier);
        let plugin_id = self.plugin_id.clone();
        Some(handle.spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(message) => forward_message(notifier.as_ref(), &plugin_id, &message),
                    Err(RecvError::Lagged(skipped)) => warn!(skipped, "PID message listener lagged behind"),
                    Err(RecvError::Closed) => break,
                }
            }
        }))
    }
}

fn forward_message(notifier: &dyn Notifier, plugin_id: &str, message: &PluginMessage) {
    if !message.is_from(plugin_id) {
        return;
    }
    let Some(text) = message.data.message.as_deref() else {
        return;
    };
    let severity = match message.data.kind.as_deref() {
        Some("error") => Severity::Error,
        Some("warning") => Severity::Warning,
        _ => Severity::Info,
    };
    notifier.notify(severity, "Calibration tools", text);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::esteps::mocks::{MockPrinterControl, RecordingNotifier};
    use crate::octoprint::{PluginEventBus, PluginEventData};
    use crate::pid::{Heater, PidValues};
    use serde_json::json;

    fn tuning() -> (PidTuning, Arc<MockPrinterControl>, Arc<RecordingNotifier>) {
        let printer = Arc::new(MockPrinterControl::new());
        let notifier = Arc::new(RecordingNotifier::new());
        (PidTuning::new(printer.clone(), notifier.clone()), printer, notifier)
    }

    fn warning_message(plugin: &str, text: &str) -> PluginMessage {
        PluginMessage {
            plugin: plugin.to_string(),
            data: PluginEventData {
                kind: Some("warning".to_string()),
                message: Some(text.to_string()),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn test_load_current_values() {
        let (tuning, printer, _) = tuning();
        printer.queue_response(
            "pid_getCurrentValues",
            Ok(json!({"data": {"hotEnd": {"P": "27.08", "I": "2.51", "D": "73.09"}, "bed": {}}})),
        );

        let current = tuning.load_current_values().await.unwrap();

        assert_eq!(current.get(Heater::HotEnd), Some(PidValues::new(27.08, 2.51, 73.09)));
        assert_eq!(current.get(Heater::Bed), None);
        assert_eq!(printer.get_executed_commands(), vec![PluginCommand::PidLoadCurrentValues]);
    }

    #[tokio::test]
    async fn test_invalid_request_is_not_sent() {
        let (tuning, printer, notifier) = tuning();
        let request = PidAutotuneRequest::new(Heater::HotEnd, 210.0).with_cycles(2);

        let result = tuning.start_autotune(&request).await;

        assert!(matches!(result, Err(PidError::TooFewCycles(2))));
        assert!(printer.get_executed_commands().is_empty());
        assert_eq!(notifier.last().unwrap().severity, Severity::Warning);
    }

    #[tokio::test]
    async fn test_bed_autotune_sends_bed_index() {
        let (tuning, printer, _) = tuning();
        let mut request = PidAutotuneRequest::new(Heater::Bed, 60.0).with_cycles(5);
        request.hot_end_index = 3;

        tuning.start_autotune(&request).await.unwrap();

        match printer.get_executed_commands().as_slice() {
            [PluginCommand::PidStart(sent)] => assert_eq!(sent.hot_end_index, -1),
            other => panic!("unexpected commands: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_start_failure_notifies_server_message() {
        let (tuning, printer, notifier) = tuning();
        printer.queue_rejection("pid_start", "Printer is busy");

        let result = tuning
            .start_autotune(&PidAutotuneRequest::new(Heater::HotEnd, 210.0))
            .await;

        assert!(matches!(result, Err(PidError::Command(_))));
        let last = notifier.last().unwrap();
        assert_eq!(last.severity, Severity::Error);
        assert_eq!(last.message, "Printer is busy");
    }

    #[tokio::test]
    async fn test_fetch_and_average_cycles() {
        let (tuning, printer, _) = tuning();
        printer.queue_response(
            "pid_getValues",
            Ok(json!({"data": {"hotEnd": [
                {"P": "1.0", "I": "1.0", "D": "1.0"},
                {"P": "1.0", "I": "1.0", "D": "1.0"},
                {"P": "20.0", "I": "2.0", "D": "60.0"},
                {"P": "22.0", "I": "4.0", "D": "80.0"}
            ], "bed": []}})),
        );

        let cycles = tuning.fetch_cycles().await.unwrap();

        assert_eq!(cycles.hot_end.len(), 4);
        assert_eq!(cycles.averaged(Heater::HotEnd), Some(PidValues::new(21.0, 3.0, 70.0)));
        assert_eq!(cycles.averaged(Heater::Bed), None);
    }

    #[tokio::test]
    async fn test_save_failure_uses_failure_reporter() {
        let (tuning, printer, notifier) = tuning();
        printer.queue_rejection("pid_save", "EEPROM disabled");

        let err = tuning.save().await.unwrap_err();

        assert_eq!(notifier.failures(), vec![err]);
    }

    #[test]
    fn test_backend_messages_become_notifications() {
        let (tuning, _, notifier) = tuning();

        tuning.on_plugin_message(&warning_message("CalibrationTools", "M304 is not supported"));
        tuning.on_plugin_message(&warning_message("OtherPlugin", "ignored"));
        tuning.on_plugin_message(&PluginMessage::with_state("CalibrationTools", "extrusion_completed"));

        let notifications = notifier.notifications();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].severity, Severity::Warning);
        assert_eq!(notifications[0].message, "M304 is not supported");
    }

    #[tokio::test]
    async fn test_subscription_forwards_pushed_messages() {
        let (tuning, _, notifier) = tuning();
        let bus = PluginEventBus::default();
        let listener = tuning.subscribe(&bus).unwrap();

        bus.publish(warning_message("CalibrationTools", "M301 is not supported"));
        for _ in 0..50 {
            if !notifier.notifications().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }

        assert_eq!(notifier.notifications().len(), 1);
        listener.abort();
    }
}
