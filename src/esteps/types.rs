use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Serialize, Serializer};

pub const DEFAULT_EXTRUDE_TEMPERATURE: f64 = 200.0;
pub const DEFAULT_EXTRUDE_LENGTH: f64 = 100.0;
pub const DEFAULT_EXTRUDE_SPEED: f64 = 100.0;
pub const DEFAULT_MARK_LENGTH: f64 = 120.0;
pub const DEFAULT_REMAINED_LENGTH: f64 = 20.0;

/// Text shown and sent when no corrected value can be computed
pub const NOT_AVAILABLE: &str = "N/A";

static LEADING_INTEGER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([+-]?\d+)").expect("valid integer pattern"));
static LEADING_FLOAT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?)").expect("valid float pattern")
});

/// Steps-per-millimeter for every axis as reported by the firmware
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StepperAxes {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub e: f64,
}

impl StepperAxes {
    pub fn new(x: f64, y: f64, z: f64, e: f64) -> Self {
        Self { x, y, z, e }
    }

    /// Build axes from the `data` object of an `eSteps_load` response.
    /// Missing, null, zero or non-numeric entries become 0.
    pub fn from_response_data(data: &serde_json::Value) -> Self {
        let axis = |name: &str| -> f64 {
            data.get(name)
                .and_then(json_number)
                .filter(|value| value.is_finite())
                .unwrap_or(0.0)
        };
        Self {
            x: axis("X"),
            y: axis("Y"),
            z: axis("Z"),
            e: axis("E"),
        }
    }

    pub fn is_all_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0 && self.z == 0.0 && self.e == 0.0
    }
}

impl fmt::Display for StepperAxes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X:{} Y:{} Z:{} E:{}", self.x, self.y, self.z, self.e)
    }
}

/// Numbers and numeric strings are both accepted, the host is not strict about it
fn json_number(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// One of the four persisted test parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterKey {
    ExtrudeTemperature,
    ExtrudeLength,
    ExtrudeSpeed,
    MarkLength,
}

impl ParameterKey {
    pub const ALL: [ParameterKey; 4] = [
        ParameterKey::ExtrudeTemperature,
        ParameterKey::ExtrudeLength,
        ParameterKey::ExtrudeSpeed,
        ParameterKey::MarkLength,
    ];

    pub fn storage_key(&self) -> &'static str {
        match self {
            ParameterKey::ExtrudeTemperature => "extrudeTemp",
            ParameterKey::ExtrudeLength => "extrudeLength",
            ParameterKey::ExtrudeSpeed => "extrudeSpeed",
            ParameterKey::MarkLength => "markLength",
        }
    }

    pub fn default_value(&self) -> f64 {
        match self {
            ParameterKey::ExtrudeTemperature => DEFAULT_EXTRUDE_TEMPERATURE,
            ParameterKey::ExtrudeLength => DEFAULT_EXTRUDE_LENGTH,
            ParameterKey::ExtrudeSpeed => DEFAULT_EXTRUDE_SPEED,
            ParameterKey::MarkLength => DEFAULT_MARK_LENGTH,
        }
    }

    /// Parse a stored value. Temperature, length and speed keep only the
    /// leading integer ("205.7" reads as 205); the mark length keeps its
    /// leading decimal number. `None` when no number leads the text.
    pub fn parse_stored(&self, raw: &str) -> Option<f64> {
        let pattern = match self {
            ParameterKey::MarkLength => &*LEADING_FLOAT,
            _ => &*LEADING_INTEGER,
        };
        pattern
            .captures(raw)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .filter(|value| value.is_finite())
    }
}

impl fmt::Display for ParameterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.storage_key())
    }
}

/// Test extrusion settings, mirrored into persistent storage
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationParameters {
    pub extrude_temperature: f64,
    pub extrude_length: f64,
    pub extrude_speed: f64,
    pub mark_length: f64,
}

impl Default for CalibrationParameters {
    fn default() -> Self {
        Self {
            extrude_temperature: DEFAULT_EXTRUDE_TEMPERATURE,
            extrude_length: DEFAULT_EXTRUDE_LENGTH,
            extrude_speed: DEFAULT_EXTRUDE_SPEED,
            mark_length: DEFAULT_MARK_LENGTH,
        }
    }
}

impl CalibrationParameters {
    pub fn get(&self, key: ParameterKey) -> f64 {
        match key {
            ParameterKey::ExtrudeTemperature => self.extrude_temperature,
            ParameterKey::ExtrudeLength => self.extrude_length,
            ParameterKey::ExtrudeSpeed => self.extrude_speed,
            ParameterKey::MarkLength => self.mark_length,
        }
    }

    pub fn set(&mut self, key: ParameterKey, value: f64) {
        match key {
            ParameterKey::ExtrudeTemperature => self.extrude_temperature = value,
            ParameterKey::ExtrudeLength => self.extrude_length = value,
            ParameterKey::ExtrudeSpeed => self.extrude_speed = value,
            ParameterKey::MarkLength => self.mark_length = value,
        }
    }
}

/// Corrected E-steps value, or the "not available" sentinel
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NewSteps {
    Value(f64),
    NotAvailable,
}

impl NewSteps {
    pub fn value(&self) -> Option<f64> {
        match self {
            NewSteps::Value(v) => Some(*v),
            NewSteps::NotAvailable => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, NewSteps::Value(_))
    }
}

impl fmt::Display for NewSteps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NewSteps::Value(v) => write!(f, "{v}"),
            NewSteps::NotAvailable => f.write_str(NOT_AVAILABLE),
        }
    }
}

/// Serialized as a plain JSON number, or the string `"N/A"`
impl Serialize for NewSteps {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            NewSteps::Value(v) => crate::octoprint::commands::serialize_number(v, serializer),
            NewSteps::NotAvailable => serializer.serialize_str(NOT_AVAILABLE),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadState {
    #[default]
    Idle,
    Loading,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtrudeState {
    #[default]
    Idle,
    Extruding,
}

/// Outcome of a guarded command such as start or stop extrusion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The command was sent and the host accepted it
    Sent,
    /// The guard rejected the call, nothing was sent
    Ignored,
}

/// Point-in-time view of the whole workflow, used for display
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSnapshot {
    pub steps: StepperAxes,
    pub parameters: CalibrationParameters,
    pub remained_length: f64,
    pub actual_extrusion: f64,
    pub new_steps: NewSteps,
    pub steps_loaded: bool,
    pub load_state: LoadState,
    pub extrude_state: ExtrudeState,
}
