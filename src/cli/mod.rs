use clap::{Parser, Subcommand};

pub mod commands;

use crate::pid::Heater;

#[derive(Parser)]
#[command(name = "calibration-tools")]
#[command(about = "Printer calibration helpers for OctoPrint")]
#[command(long_about = "Guided E-steps calibration and PID autotuning through the CalibrationTools \
                       OctoPrint plugin. Get started with 'calibration-tools load' to read the \
                       current steps-per-mm from your printer.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Read the current steps-per-mm of every axis from the printer
    Load,
    /// Heat the nozzle and extrude the test length
    Extrude {
        /// Extrusion temperature in °C (stored for next time)
        #[arg(long, help = "Nozzle temperature for the test extrusion")]
        temp: Option<f64>,
        /// Length to extrude in mm (stored for next time)
        #[arg(long, help = "Filament length to extrude in mm")]
        length: Option<f64>,
        /// Extrusion speed in mm/min (stored for next time)
        #[arg(long, help = "Extrusion speed in mm/min")]
        speed: Option<f64>,
        /// Keep running until the plugin reports completion or Ctrl-C stops the extrusion
        #[arg(
            long,
            help = "Wait until Ctrl-C stops the extrusion, or until completion is reported in push frames piped on stdin"
        )]
        wait: bool,
    },
    /// Abort a running test extrusion
    Stop,
    /// Compute the corrected E-steps from a measurement
    Compute {
        /// Filament length left to the mark after extrusion, in mm
        #[arg(long, help = "Measured distance from the extruder to the mark after extrusion")]
        remained: f64,
    },
    /// Compute the corrected E-steps and write them to the firmware
    Save {
        /// Filament length left to the mark after extrusion, in mm
        #[arg(long, help = "Measured distance from the extruder to the mark after extrusion")]
        remained: f64,
        /// Show what would be saved without sending it
        #[arg(long, help = "Preview the new value without saving it")]
        dry_run: bool,
    },
    /// Show or change the stored test parameters
    Params {
        #[arg(long, help = "Extrusion temperature in °C")]
        temp: Option<f64>,
        #[arg(long, help = "Extrusion length in mm")]
        length: Option<f64>,
        #[arg(long, help = "Extrusion speed in mm/min")]
        speed: Option<f64>,
        #[arg(long, help = "Distance of the filament mark from the extruder in mm")]
        mark: Option<f64>,
        /// Restore every parameter to its default
        #[arg(long, help = "Reset all parameters to their defaults", conflicts_with_all = ["temp", "length", "speed", "mark"])]
        reset: bool,
    },
    /// Relay OctoPrint push frames piped on stdin, one JSON frame per line
    Watch,
    /// PID autotuning helpers
    Pid {
        #[command(subcommand)]
        action: PidAction,
    },
}

#[derive(Subcommand)]
pub enum PidAction {
    /// Show the PID gains stored in the firmware
    Current,
    /// Start an M303 autotune run
    Start {
        /// Heater to tune: hotEnd or bed
        #[arg(long, default_value = "hotEnd")]
        heater: Heater,
        /// Target temperature in °C
        #[arg(long)]
        temp: f64,
        /// Part cooling fan speed (0-255)
        #[arg(long, default_value = "255")]
        fan: u32,
        /// Number of cycles, the first two are warm-up
        #[arg(long, default_value = "8")]
        cycles: u32,
        /// Hot-end index, ignored for the bed
        #[arg(long, default_value = "0")]
        index: i32,
    },
    /// Show the per-cycle values collected so far
    Cycles,
    /// Write the tuned values to EEPROM
    Save,
}
