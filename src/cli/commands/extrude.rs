use anyhow::Result;

use crate::cli::commands::{wait_for_state, with_session};
use crate::config::CalibrationToolsConfig;
use crate::esteps::Dispatch;
use crate::octoprint::{EventChannel, EXTRUSION_COMPLETED};

pub struct ExtrudeCommand {
    config: CalibrationToolsConfig,
    temperature: Option<f64>,
    length: Option<f64>,
    speed: Option<f64>,
    wait: bool,
}

impl ExtrudeCommand {
    pub fn new(config: CalibrationToolsConfig) -> Self {
        Self {
            config,
            temperature: None,
            length: None,
            speed: None,
            wait: false,
        }
    }

    pub fn with_temperature(mut self, temperature: Option<f64>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_length(mut self, length: Option<f64>) -> Self {
        self.length = length;
        self
    }

    pub fn with_speed(mut self, speed: Option<f64>) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_wait(mut self, wait: bool) -> Self {
        self.wait = wait;
        self
    }

    pub async fn execute(&self) -> Result<()> {
        with_session(&self.config, |session| async move {
            let workflow = &session.workflow;
            if let Some(temperature) = self.temperature {
                workflow.set_extrude_temperature(temperature);
            }
            if let Some(length) = self.length {
                workflow.set_extrude_length(length);
            }
            if let Some(speed) = self.speed {
                workflow.set_extrude_speed(speed);
            }

            let params = workflow.parameters();
            println!(
                "🔥 Extruding {} mm at {}°C and {} mm/min",
                params.extrude_length, params.extrude_temperature, params.extrude_speed
            );

            if workflow.start_extrusion().await? == Dispatch::Ignored {
                println!("⏳ An extrusion is already in progress");
                return Ok(());
            }

            if !self.wait {
                println!();
                println!("💡 Measure the remaining length to the mark when it finishes, then run");
                println!("   'calibration-tools save --remained <mm>'");
                return Ok(());
            }

            let mut messages = session.events.subscribe();
            let forwarder = session.forward_stdin_frames();
            if forwarder.is_some() {
                println!("⏳ Extrusion running, waiting for the printer to report completion (Ctrl-C stops it)");
            } else {
                println!("⏳ Extrusion running, press Ctrl-C to stop it");
            }

            tokio::select! {
                signal = tokio::signal::ctrl_c() => {
                    signal?;
                    println!();
                    workflow.stop_extrusion().await?;
                }
                _ = wait_for_state(&mut messages, &session.plugin_id, EXTRUSION_COMPLETED) => {
                    println!("✅ Extrusion completed");
                    println!("💡 Measure the remaining length to the mark, then run 'calibration-tools save --remained <mm>'");
                }
            }

            if let Some(forwarder) = forwarder {
                forwarder.abort();
            }
            Ok(())
        })
        .await
    }
}
