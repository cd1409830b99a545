use std::io::IsTerminal;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::CalibrationToolsConfig;
use crate::esteps::{CalibrationWorkflow, NewSteps, WorkflowSnapshot};
use crate::notify::ConsoleNotifier;
use crate::octoprint::{OctoPrintClient, PluginEventBus, PluginMessage};
use crate::pid::PidTuning;
use crate::storage::JsonFileStore;

pub mod compute;
pub mod extrude;
pub mod load;
pub mod params;
pub mod pid;
pub mod save;
pub mod stop;
pub mod watch;

/// Everything a calibration command needs, wired from configuration
pub struct CalibrationSession {
    pub workflow: CalibrationWorkflow,
    /// Push messages; fed from frames piped on stdin
    pub events: PluginEventBus,
    pub plugin_id: String,
}

impl CalibrationSession {
    pub fn from_config(config: &CalibrationToolsConfig) -> Result<Self> {
        let client = OctoPrintClient::new(&config.octoprint)
            .context("Failed to build the OctoPrint HTTP client")?;
        let store = JsonFileStore::open(&config.storage.path)
            .with_context(|| format!("Failed to open parameter storage at {}", config.storage.path))?;

        let workflow = CalibrationWorkflow::new(Arc::new(client), Arc::new(store), Arc::new(ConsoleNotifier))
            .with_rounding(config.rounding())
            .with_plugin_id(config.octoprint.plugin_id.clone());
        workflow.set_remained_length(config.calibration.default_remained_length);

        let events = PluginEventBus::default();
        workflow.initialize(&events);

        Ok(Self {
            workflow,
            events,
            plugin_id: config.octoprint.plugin_id.clone(),
        })
    }

    /// Forward push frames piped on stdin into the session's bus. An
    /// interactive terminal is left alone.
    pub fn forward_stdin_frames(&self) -> Option<JoinHandle<std::io::Result<usize>>> {
        if std::io::stdin().is_terminal() {
            return None;
        }
        let events = self.events.clone();
        Some(tokio::spawn(forward_frames(events, BufReader::new(tokio::io::stdin()))))
    }
}

impl Drop for CalibrationSession {
    fn drop(&mut self) {
        self.workflow.shutdown();
    }
}

pub fn pid_tuning(config: &CalibrationToolsConfig) -> Result<PidTuning> {
    let client = OctoPrintClient::new(&config.octoprint)
        .context("Failed to build the OctoPrint HTTP client")?;
    Ok(PidTuning::new(Arc::new(client), Arc::new(ConsoleNotifier))
        .with_plugin_id(config.octoprint.plugin_id.clone()))
}

pub async fn with_session<F, Fut, R>(config: &CalibrationToolsConfig, f: F) -> Result<R>
where
    F: FnOnce(CalibrationSession) -> Fut,
    Fut: std::future::Future<Output = Result<R>>,
{
    println!("🔌 Using OctoPrint at {}", config.octoprint.base_url);

    match CalibrationSession::from_config(config) {
        Ok(session) => f(session).await,
        Err(e) => {
            println!("❌ {e:#}");
            Err(e)
        }
    }
}

/// Publish OctoPrint push-socket frames, one JSON frame per line, until the
/// input ends. Returns how many plugin messages reached a subscriber.
pub async fn forward_frames<R>(events: PluginEventBus, reader: R) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut delivered = 0;
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        if events.publish_frame(&line) > 0 {
            delivered += 1;
        }
    }
    debug!(delivered, "Push frame input closed");
    Ok(delivered)
}

/// Resolve once `plugin_id` reports `state`. Never resolves after the bus closes.
pub async fn wait_for_state(receiver: &mut broadcast::Receiver<PluginMessage>, plugin_id: &str, state: &str) {
    loop {
        match receiver.recv().await {
            Ok(message) if message.is_from(plugin_id) && message.state() == Some(state) => return,
            Ok(_) | Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => std::future::pending::<()>().await,
        }
    }
}

pub fn print_snapshot(snapshot: &WorkflowSnapshot) {
    let steps = snapshot.steps;
    println!("📐 Steps per mm:  X {}  Y {}  Z {}  E {}", steps.x, steps.y, steps.z, steps.e);
    println!(
        "📏 Mark length: {} mm, remained: {} mm, actually extruded: {} mm",
        snapshot.parameters.mark_length, snapshot.remained_length, snapshot.actual_extrusion
    );
    match snapshot.new_steps {
        NewSteps::Value(value) => println!("🎯 New E-steps: {value} steps/mm"),
        NewSteps::NotAvailable => {
            println!("🎯 New E-steps: {}", snapshot.new_steps);
            if !snapshot.steps_loaded {
                println!("   💡 The printer did not report any steps, check the connection and run 'calibration-tools load'");
            } else {
                println!("   💡 Nothing was extruded or E is 0, check the measured length");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::esteps::mocks::{MockPrinterControl, RecordingNotifier};
    use crate::octoprint::{EventChannel, EXTRUSION_COMPLETED};
    use crate::storage::MemoryStore;
    use std::time::Duration;

    const COMPLETED_FRAME: &str =
        r#"{"plugin": {"plugin": "CalibrationTools", "data": {"state": "extrusion_completed"}}}"#;

    #[tokio::test]
    async fn test_forward_frames_publishes_plugin_frames_only() {
        let bus = PluginEventBus::default();
        let mut receiver = bus.subscribe();
        let input = format!(
            "{{\"current\": {{\"state\": {{\"text\": \"Printing\"}}}}}}\n\nnot json\n{COMPLETED_FRAME}\n"
        );

        let delivered = forward_frames(bus.clone(), input.as_bytes()).await.unwrap();

        assert_eq!(delivered, 1);
        let message = receiver.recv().await.unwrap();
        assert_eq!(message.state(), Some(EXTRUSION_COMPLETED));
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_forwarded_completion_clears_running_extrusion() {
        let bus = PluginEventBus::default();
        let workflow = CalibrationWorkflow::new(
            Arc::new(MockPrinterControl::new()),
            Arc::new(MemoryStore::new()),
            Arc::new(RecordingNotifier::new()),
        );
        workflow.initialize(&bus);
        workflow.start_extrusion().await.unwrap();

        forward_frames(bus.clone(), COMPLETED_FRAME.as_bytes()).await.unwrap();
        for _ in 0..50 {
            if !workflow.extrusion_in_progress() {
                break;
            }
            tokio::task::yield_now().await;
        }

        assert!(!workflow.extrusion_in_progress());
        workflow.shutdown();
    }

    #[tokio::test]
    async fn test_wait_for_state_skips_other_plugins_and_states() {
        let bus = PluginEventBus::default();
        let mut receiver = bus.subscribe();
        bus.publish(PluginMessage::with_state("OtherPlugin", EXTRUSION_COMPLETED));
        bus.publish(PluginMessage::with_state("CalibrationTools", "heating"));

        let pending = tokio::time::timeout(
            Duration::from_millis(20),
            wait_for_state(&mut receiver, "CalibrationTools", EXTRUSION_COMPLETED),
        )
        .await;
        assert!(pending.is_err());

        bus.publish(PluginMessage::with_state("CalibrationTools", EXTRUSION_COMPLETED));
        tokio::time::timeout(
            Duration::from_secs(1),
            wait_for_state(&mut receiver, "CalibrationTools", EXTRUSION_COMPLETED),
        )
        .await
        .unwrap();
    }
}
