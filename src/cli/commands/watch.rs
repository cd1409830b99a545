use anyhow::Result;
use tokio::io::BufReader;
use tokio::sync::broadcast::error::RecvError;

use crate::cli::commands::{forward_frames, pid_tuning, CalibrationSession};
use crate::config::CalibrationToolsConfig;
use crate::octoprint::EventChannel;

/// Relays OctoPrint push frames (one JSON frame per line on stdin) to the
/// E-steps workflow and the PID notifications
pub struct WatchCommand {
    config: CalibrationToolsConfig,
}

impl WatchCommand {
    pub fn new(config: CalibrationToolsConfig) -> Self {
        Self { config }
    }

    pub async fn execute(&self) -> Result<()> {
        println!("👂 Reading OctoPrint push frames from stdin, Ctrl-C to quit");

        let session = CalibrationSession::from_config(&self.config)?;
        let tuning = pid_tuning(&self.config)?;
        let pid_listener = tuning.subscribe(&session.events);

        let mut messages = session.events.subscribe();
        let plugin_id = session.plugin_id.clone();
        let state_printer = tokio::spawn(async move {
            loop {
                match messages.recv().await {
                    Ok(message) if message.is_from(&plugin_id) => {
                        if let Some(state) = message.state() {
                            println!("📣 {state}");
                        }
                    }
                    Ok(_) | Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        });

        let stdin = BufReader::new(tokio::io::stdin());
        tokio::select! {
            delivered = forward_frames(session.events.clone(), stdin) => {
                println!("📭 Input closed after {} plugin messages", delivered?);
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                println!();
            }
        }

        // let the listeners drain what was already published
        tokio::task::yield_now().await;
        state_printer.abort();
        if let Some(listener) = pid_listener {
            listener.abort();
        }
        Ok(())
    }
}
