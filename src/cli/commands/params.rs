use anyhow::Result;

use crate::cli::commands::CalibrationSession;
use crate::config::CalibrationToolsConfig;
use crate::esteps::ParameterKey;

pub struct ParamsCommand {
    config: CalibrationToolsConfig,
    updates: Vec<(ParameterKey, f64)>,
    reset: bool,
}

impl ParamsCommand {
    pub fn new(config: CalibrationToolsConfig) -> Self {
        Self {
            config,
            updates: Vec::new(),
            reset: false,
        }
    }

    pub fn with_value(mut self, key: ParameterKey, value: Option<f64>) -> Self {
        if let Some(value) = value {
            self.updates.push((key, value));
        }
        self
    }

    pub fn with_reset(mut self, reset: bool) -> Self {
        self.reset = reset;
        self
    }

    pub async fn execute(&self) -> Result<()> {
        // parameters live in local storage, the printer is not contacted
        let session = CalibrationSession::from_config(&self.config)?;
        let workflow = &session.workflow;

        if self.reset {
            workflow.reset_parameters();
            println!("🔄 Parameters reset to defaults");
        }
        for (key, value) in &self.updates {
            workflow.set_parameter(*key, *value);
            println!("✏️  {key} set to {value}");
        }

        let params = workflow.parameters();
        println!("🧪 Test parameters ({})", self.config.storage.path);
        println!("   🌡️  Extrude temperature: {} °C", params.extrude_temperature);
        println!("   📏 Extrude length:      {} mm", params.extrude_length);
        println!("   ⏩ Extrude speed:       {} mm/min", params.extrude_speed);
        println!("   📍 Mark length:         {} mm", params.mark_length);
        Ok(())
    }
}
