// PID autotune helper
//
// Reads the gains stored in the firmware, starts an M303 autotune through
// the plugin and collects the per-cycle results.

pub mod parser;
pub mod tuning;
pub mod types;

pub use parser::{classify_pid_line, parse_pid_line, PidLine};
pub use tuning::PidTuning;
pub use types::{
    CurrentPidValues, Heater, PidAutotuneRequest, PidCycles, PidError, PidValues, WARMUP_CYCLES,
};
