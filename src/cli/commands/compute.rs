use anyhow::Result;

use crate::cli::commands::{print_snapshot, with_session};
use crate::config::CalibrationToolsConfig;

pub struct ComputeCommand {
    config: CalibrationToolsConfig,
    remained: f64,
}

impl ComputeCommand {
    pub fn new(config: CalibrationToolsConfig, remained: f64) -> Self {
        Self { config, remained }
    }

    pub async fn execute(&self) -> Result<()> {
        with_session(&self.config, |session| async move {
            let workflow = &session.workflow;
            workflow.load_steps().await?;
            workflow.set_remained_length(self.remained);
            println!();
            print_snapshot(&workflow.snapshot());
            Ok(())
        })
        .await
    }
}
