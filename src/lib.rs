// Calibration Tools Library - printer calibration through OctoPrint
// This exposes the core components for testing and integration

pub mod cli;
pub mod config;
pub mod esteps;
pub mod notify;
pub mod octoprint;
pub mod pid;
pub mod rounding;
pub mod storage;
pub mod telemetry;

// Re-export key types for easy access
pub use config::{config, CalibrationToolsConfig};
pub use esteps::{CalibrationParameters, CalibrationWorkflow, NewSteps, StepperAxes, WorkflowSnapshot};
pub use notify::{ConsoleNotifier, Notifier, Severity};
pub use octoprint::{
    CommandError, EventChannel, OctoPrintClient, PluginCommand, PluginEventBus, PluginMessage,
    PrinterControl,
};
pub use pid::{PidAutotuneRequest, PidTuning, PidValues};
pub use rounding::Rounding;
pub use storage::{JsonFileStore, KeyValueStore, MemoryStore, StorageError};
pub use telemetry::{create_command_span, generate_correlation_id, init_telemetry};
