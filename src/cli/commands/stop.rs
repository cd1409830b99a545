use anyhow::Result;

use crate::cli::commands::with_session;
use crate::config::CalibrationToolsConfig;

pub struct StopCommand {
    config: CalibrationToolsConfig,
}

impl StopCommand {
    pub fn new(config: CalibrationToolsConfig) -> Self {
        Self { config }
    }

    pub async fn execute(&self) -> Result<()> {
        println!("🛑 Stopping the test extrusion...");
        with_session(&self.config, |session| async move {
            let workflow = &session.workflow;
            // started by an earlier invocation or the web UI
            workflow.adopt_running_extrusion();
            workflow.stop_extrusion().await?;
            Ok(())
        })
        .await
    }
}
