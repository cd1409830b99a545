// E-steps calibration workflow
//
// The workflow talks to the printer through `PrinterControl`, persists its
// form fields through `KeyValueStore` and reports through `Notifier`, so every
// collaborator can be swapped for a test double.

pub mod types;
pub mod workflow;

#[cfg(test)]
pub mod mocks;


pub use types::{
    CalibrationParameters, Dispatch, ExtrudeState, LoadState, NewSteps, ParameterKey, StepperAxes,
    WorkflowSnapshot, NOT_AVAILABLE,
};
pub use workflow::CalibrationWorkflow;
