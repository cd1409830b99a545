use serde::{Serialize, Serializer};

use crate::esteps::NewSteps;
use crate::pid::PidAutotuneRequest;

/// Commands understood by the CalibrationTools plugin's simple API.
///
/// Serialized as the JSON body OctoPrint expects: the command name under
/// `command`, parameters as sibling fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command")]
pub enum PluginCommand {
    #[serde(rename = "eSteps_load")]
    LoadSteps,
    #[serde(rename = "eSteps_startExtrusion", rename_all = "camelCase")]
    StartExtrusion {
        #[serde(serialize_with = "serialize_number")]
        extrude_temp: f64,
        #[serde(serialize_with = "serialize_number")]
        extrude_length: f64,
        #[serde(serialize_with = "serialize_number")]
        extrude_speed: f64,
    },
    #[serde(rename = "eSteps_stopExtrusion")]
    StopExtrusion,
    #[serde(rename = "eSteps_save")]
    SaveSteps {
        #[serde(rename = "newESteps")]
        new_e_steps: NewSteps,
    },
    #[serde(rename = "pid_getCurrentValues")]
    PidLoadCurrentValues,
    #[serde(rename = "pid_start")]
    PidStart(PidAutotuneRequest),
    #[serde(rename = "pid_getValues")]
    PidGetValues,
    #[serde(rename = "pid_save")]
    PidSave,
}

impl PluginCommand {
    /// Wire name of the command
    pub fn name(&self) -> &'static str {
        match self {
            PluginCommand::LoadSteps => "eSteps_load",
            PluginCommand::StartExtrusion { .. } => "eSteps_startExtrusion",
            PluginCommand::StopExtrusion => "eSteps_stopExtrusion",
            PluginCommand::SaveSteps { .. } => "eSteps_save",
            PluginCommand::PidLoadCurrentValues => "pid_getCurrentValues",
            PluginCommand::PidStart(_) => "pid_start",
            PluginCommand::PidGetValues => "pid_getValues",
            PluginCommand::PidSave => "pid_save",
        }
    }
}

/// Integral values go out as JSON integers (`200`, not `200.0`), the plugin
/// formats some of them straight into G-code.
pub fn serialize_number<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        serializer.serialize_i64(*value as i64)
    } else {
        serializer.serialize_f64(*value)
    }
}
