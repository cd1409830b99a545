use anyhow::Result;

use crate::cli::commands::{print_snapshot, with_session};
use crate::config::CalibrationToolsConfig;

pub struct SaveCommand {
    config: CalibrationToolsConfig,
    remained: f64,
    dry_run: bool,
}

impl SaveCommand {
    pub fn new(config: CalibrationToolsConfig, remained: f64) -> Self {
        Self {
            config,
            remained,
            dry_run: false,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub async fn execute(&self) -> Result<()> {
        with_session(&self.config, |session| async move {
            let workflow = &session.workflow;
            workflow.load_steps().await?;
            workflow.set_remained_length(self.remained);
            let snapshot = workflow.snapshot();
            println!();
            print_snapshot(&snapshot);

            // the reason was printed with the snapshot
            if !snapshot.new_steps.is_available() {
                println!("❌ No new E-steps value, nothing was saved");
                return Ok(());
            }
            if self.dry_run {
                println!("🔍 Dry run: {} would be written to the firmware", snapshot.new_steps);
                return Ok(());
            }

            let saved = workflow.save_steps().await?;
            println!("💾 E-steps set to {saved}");
            Ok(())
        })
        .await
    }
}
