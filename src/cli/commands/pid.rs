use anyhow::Result;

use crate::cli::commands::pid_tuning;
use crate::config::CalibrationToolsConfig;
use crate::pid::{Heater, PidAutotuneRequest, PidValues, WARMUP_CYCLES};

pub enum PidOperation {
    Current,
    Start(PidAutotuneRequest),
    Cycles,
    Save,
}

pub struct PidCommand {
    config: CalibrationToolsConfig,
    operation: PidOperation,
}

impl PidCommand {
    pub fn new(config: CalibrationToolsConfig, operation: PidOperation) -> Self {
        Self { config, operation }
    }

    pub async fn execute(&self) -> Result<()> {
        let tuning = pid_tuning(&self.config)?;

        match &self.operation {
            PidOperation::Current => {
                println!("📥 Reading PID gains from the firmware...");
                let current = tuning.load_current_values().await?;
                for heater in [Heater::HotEnd, Heater::Bed] {
                    print_gains(heater, current.get(heater));
                }
            }
            PidOperation::Start(request) => {
                for line in request.gcode() {
                    println!("   ▶️  {line}");
                }
                tuning.start_autotune(request).await?;
                println!(
                    "🔥 Autotune running: {} tuning cycles after {WARMUP_CYCLES} warm-up cycles",
                    request.tuning_cycles()
                );
                println!("💡 Check progress with 'calibration-tools pid cycles'");
            }
            PidOperation::Cycles => {
                let cycles = tuning.fetch_cycles().await?;
                for heater in [Heater::HotEnd, Heater::Bed] {
                    let values = cycles.get(heater);
                    if values.is_empty() {
                        continue;
                    }
                    println!("🔁 {heater}: {} cycles", values.len());
                    for (i, v) in values.iter().enumerate() {
                        println!("   #{}: {v}", i + 1);
                    }
                    match cycles.averaged(heater) {
                        Some(avg) => println!("   📊 Average after warm-up: {avg}"),
                        None => println!("   ⏳ Still warming up"),
                    }
                }
            }
            PidOperation::Save => {
                tuning.save().await?;
                println!("💾 PID values saved");
            }
        }
        Ok(())
    }
}

fn print_gains(heater: Heater, values: Option<PidValues>) {
    match values {
        Some(values) => println!("🌡️  {heater}: {values}"),
        None => println!("🌡️  {heater}: not reported"),
    }
}
