use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use calibration_tools::cli::commands::{
    compute::ComputeCommand, extrude::ExtrudeCommand, load::LoadCommand, params::ParamsCommand,
    pid::{PidCommand, PidOperation}, save::SaveCommand, stop::StopCommand, watch::WatchCommand,
};
use calibration_tools::cli::{Cli, Commands, PidAction};
use calibration_tools::esteps::ParameterKey;
use calibration_tools::pid::PidAutotuneRequest;
use calibration_tools::{config, init_telemetry};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config()?.clone();
    if let Err(e) = init_telemetry(&config.observability) {
        eprintln!("⚠️  Logging unavailable: {e}");
    }

    let Some(command) = cli.command else {
        // Default behavior: no subcommand - explain the calibration steps
        show_how_to_calibrate();
        return Ok(());
    };

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(async {
        match command {
            Commands::Load => LoadCommand::new(config).execute().await,
            Commands::Extrude {
                temp,
                length,
                speed,
                wait,
            } => {
                ExtrudeCommand::new(config)
                    .with_temperature(temp)
                    .with_length(length)
                    .with_speed(speed)
                    .with_wait(wait)
                    .execute()
                    .await
            }
            Commands::Stop => StopCommand::new(config).execute().await,
            Commands::Watch => WatchCommand::new(config).execute().await,
            Commands::Compute { remained } => ComputeCommand::new(config, remained).execute().await,
            Commands::Save { remained, dry_run } => {
                SaveCommand::new(config, remained)
                    .with_dry_run(dry_run)
                    .execute()
                    .await
            }
            Commands::Params {
                temp,
                length,
                speed,
                mark,
                reset,
            } => {
                ParamsCommand::new(config)
                    .with_reset(reset)
                    .with_value(ParameterKey::ExtrudeTemperature, temp)
                    .with_value(ParameterKey::ExtrudeLength, length)
                    .with_value(ParameterKey::ExtrudeSpeed, speed)
                    .with_value(ParameterKey::MarkLength, mark)
                    .execute()
                    .await
            }
            Commands::Pid { action } => {
                let operation = match action {
                    PidAction::Current => PidOperation::Current,
                    PidAction::Start {
                        heater,
                        temp,
                        fan,
                        cycles,
                        index,
                    } => PidOperation::Start(
                        PidAutotuneRequest::new(heater, temp)
                            .with_fan_speed(fan)
                            .with_cycles(cycles)
                            .with_hot_end_index(index),
                    ),
                    PidAction::Cycles => PidOperation::Cycles,
                    PidAction::Save => PidOperation::Save,
                };
                PidCommand::new(config, operation).execute().await
            }
        }
    });
    // a blocked stdin read must not keep the process alive
    runtime.shutdown_timeout(Duration::from_millis(100));
    result
}

fn show_how_to_calibrate() {
    println!("🧪 calibration-tools: E-steps calibration for OctoPrint");
    println!();
    println!("📋 Calibration steps:");
    println!("   1. calibration-tools load                  read the current steps per mm");
    println!("   2. calibration-tools params --mark 120     mark the filament 120 mm above the extruder");
    println!("   3. calibration-tools extrude --wait        heat up and extrude the test length");
    println!("   4. calibration-tools compute --remained N  N = mm left between extruder and mark");
    println!("   5. calibration-tools save --remained N     write the corrected E-steps");
    println!();
    println!("🔥 PID autotune: calibration-tools pid --help");
    println!("💡 Configure the printer in calibration-tools.toml or with CALIBRATION_TOOLS_OCTOPRINT__BASE_URL");
}
