use anyhow::Result;

use crate::cli::commands::with_session;
use crate::config::CalibrationToolsConfig;

pub struct LoadCommand {
    config: CalibrationToolsConfig,
}

impl LoadCommand {
    pub fn new(config: CalibrationToolsConfig) -> Self {
        Self { config }
    }

    pub async fn execute(&self) -> Result<()> {
        println!("📥 Loading steps per mm from the printer...");
        println!();

        with_session(&self.config, |session| async move {
            let workflow = &session.workflow;
            let axes = workflow.load_steps().await?;
            println!("📐 X: {}  Y: {}  Z: {}  E: {}", axes.x, axes.y, axes.z, axes.e);
            if workflow.steps_loaded() {
                println!();
                println!("💡 Next: mark the filament {} mm above the extruder and run 'calibration-tools extrude'",
                    workflow.parameters().mark_length);
            } else {
                println!("⚠️  The printer reported no usable steps, saving stays disabled");
            }
            Ok(())
        })
        .await
    }
}
