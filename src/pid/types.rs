use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::octoprint::commands::serialize_number;
use crate::octoprint::CommandError;

/// Cycles the firmware spends warming up before reporting usable values
pub const WARMUP_CYCLES: usize = 2;
pub const MIN_AUTOTUNE_CYCLES: u32 = 3;
pub const MAX_FAN_SPEED: u32 = 255;

/// Hot-end index the firmware expects when the bed is tuned
pub const BED_HEATER_INDEX: i32 = -1;

#[derive(Debug, Error)]
pub enum PidError {
    #[error("autotune needs at least 3 cycles, got {0}")]
    TooFewCycles(u32),
    #[error("fan speed must be between 0 and 255, got {0}")]
    FanSpeedOutOfRange(u32),
    #[error("target temperature must be above zero, got {0}")]
    InvalidTargetTemperature(f64),
    #[error("unknown heater '{0}', expected 'hotEnd' or 'bed'")]
    UnknownHeater(String),
    #[error(transparent)]
    Command(#[from] CommandError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Heater {
    #[serde(rename = "hotEnd")]
    HotEnd,
    #[serde(rename = "bed")]
    Bed,
}

impl Heater {
    /// Wire name, also the key used in PID responses
    pub fn key(&self) -> &'static str {
        match self {
            Heater::HotEnd => "hotEnd",
            Heater::Bed => "bed",
        }
    }

    /// G-code that reports (and sets) this heater's PID gains
    pub fn gcode(&self) -> &'static str {
        match self {
            Heater::HotEnd => "M301",
            Heater::Bed => "M304",
        }
    }
}

impl fmt::Display for Heater {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Heater {
    type Err = PidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hotend" | "hot-end" | "hot_end" | "extruder" => Ok(Heater::HotEnd),
            "bed" => Ok(Heater::Bed),
            other => Err(PidError::UnknownHeater(other.to_string())),
        }
    }
}

/// One set of PID gains
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PidValues {
    #[serde(rename = "P")]
    pub p: f64,
    #[serde(rename = "I")]
    pub i: f64,
    #[serde(rename = "D")]
    pub d: f64,
}

impl PidValues {
    pub fn new(p: f64, i: f64, d: f64) -> Self {
        Self { p, i, d }
    }

    /// Read `{P, I, D}` where each gain is a number or a numeric string.
    /// `None` for an empty object or when any gain is missing.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        let gain = |name: &str| -> Option<f64> {
            match value.get(name)? {
                serde_json::Value::Number(n) => n.as_f64(),
                serde_json::Value::String(s) => s.trim().parse().ok(),
                _ => None,
            }
        };
        Some(Self {
            p: gain("P")?,
            i: gain("I")?,
            d: gain("D")?,
        })
    }

    /// Mean of the tuning cycles once the warm-up cycles are dropped
    pub fn averaged(cycles: &[PidValues]) -> Option<PidValues> {
        let tuning = cycles.get(WARMUP_CYCLES..)?;
        if tuning.is_empty() {
            return None;
        }
        let n = tuning.len() as f64;
        let sum = tuning.iter().fold(PidValues::new(0.0, 0.0, 0.0), |acc, v| {
            PidValues::new(acc.p + v.p, acc.i + v.i, acc.d + v.d)
        });
        Some(PidValues::new(sum.p / n, sum.i / n, sum.d / n))
    }
}

impl fmt::Display for PidValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P:{} I:{} D:{}", self.p, self.i, self.d)
    }
}

/// Gains currently stored in the firmware. A heater the firmware did not
/// report is `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentPidValues {
    pub hot_end: Option<PidValues>,
    pub bed: Option<PidValues>,
}

impl CurrentPidValues {
    pub fn from_response(response: &serde_json::Value) -> Self {
        let data = response.get("data");
        let heater = |h: Heater| data.and_then(|d| d.get(h.key())).and_then(PidValues::from_json);
        Self {
            hot_end: heater(Heater::HotEnd),
            bed: heater(Heater::Bed),
        }
    }

    pub fn get(&self, heater: Heater) -> Option<PidValues> {
        match heater {
            Heater::HotEnd => self.hot_end,
            Heater::Bed => self.bed,
        }
    }
}

/// Per-cycle values collected by the backend during an autotune
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PidCycles {
    pub hot_end: Vec<PidValues>,
    pub bed: Vec<PidValues>,
}

impl PidCycles {
    pub fn from_response(response: &serde_json::Value) -> Self {
        let data = response.get("data");
        let heater = |h: Heater| -> Vec<PidValues> {
            data.and_then(|d| d.get(h.key()))
                .and_then(|v| v.as_array())
                .map(|cycles| cycles.iter().filter_map(PidValues::from_json).collect())
                .unwrap_or_default()
        };
        Self {
            hot_end: heater(Heater::HotEnd),
            bed: heater(Heater::Bed),
        }
    }

    pub fn get(&self, heater: Heater) -> &[PidValues] {
        match heater {
            Heater::HotEnd => &self.hot_end,
            Heater::Bed => &self.bed,
        }
    }

    pub fn averaged(&self, heater: Heater) -> Option<PidValues> {
        PidValues::averaged(self.get(heater))
    }
}

/// Parameters of a firmware PID autotune run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PidAutotuneRequest {
    pub heater: Heater,
    pub fan_speed: u32,
    pub no_cycles: u32,
    pub hot_end_index: i32,
    #[serde(serialize_with = "serialize_number")]
    pub target_temp: f64,
}

impl PidAutotuneRequest {
    pub fn new(heater: Heater, target_temp: f64) -> Self {
        Self {
            heater,
            fan_speed: MAX_FAN_SPEED,
            no_cycles: 8,
            hot_end_index: 0,
            target_temp,
        }
        .normalized()
    }

    pub fn with_fan_speed(mut self, fan_speed: u32) -> Self {
        self.fan_speed = fan_speed;
        self
    }

    pub fn with_cycles(mut self, cycles: u32) -> Self {
        self.no_cycles = cycles;
        self
    }

    pub fn with_hot_end_index(mut self, index: i32) -> Self {
        self.hot_end_index = index;
        self.normalized()
    }

    /// Bed runs always target the bed heater index
    pub fn normalized(mut self) -> Self {
        if self.heater == Heater::Bed {
            self.hot_end_index = BED_HEATER_INDEX;
        }
        self
    }

    pub fn validate(&self) -> Result<(), PidError> {
        if self.no_cycles < MIN_AUTOTUNE_CYCLES {
            return Err(PidError::TooFewCycles(self.no_cycles));
        }
        if self.fan_speed > MAX_FAN_SPEED {
            return Err(PidError::FanSpeedOutOfRange(self.fan_speed));
        }
        if !(self.target_temp.is_finite() && self.target_temp > 0.0) {
            return Err(PidError::InvalidTargetTemperature(self.target_temp));
        }
        Ok(())
    }

    /// Firmware script the backend runs for this request
    pub fn gcode(&self) -> Vec<String> {
        let request = self.clone().normalized();
        let temp = if request.target_temp.fract() == 0.0 {
            format!("{}", request.target_temp as i64)
        } else {
            format!("{}", request.target_temp)
        };
        vec![
            format!("M106 S{}", request.fan_speed),
            format!(
                "M303 C{} E{} S{} U1",
                request.no_cycles, request.hot_end_index, temp
            ),
            "M500".to_string(),
        ]
    }

    /// Cycles that produce usable values
    pub fn tuning_cycles(&self) -> u32 {
        self.no_cycles.saturating_sub(WARMUP_CYCLES as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bed_request_forces_bed_index() {
        let request = PidAutotuneRequest::new(Heater::Bed, 60.0).with_hot_end_index(2);
        assert_eq!(request.hot_end_index, BED_HEATER_INDEX);

        let hot_end = PidAutotuneRequest::new(Heater::HotEnd, 210.0).with_hot_end_index(1);
        assert_eq!(hot_end.hot_end_index, 1);
    }

    #[test]
    fn test_validation_limits() {
        let base = PidAutotuneRequest::new(Heater::HotEnd, 210.0);
        assert!(base.validate().is_ok());
        assert!(matches!(
            base.clone().with_cycles(2).validate(),
            Err(PidError::TooFewCycles(2))
        ));
        assert!(matches!(
            base.clone().with_fan_speed(256).validate(),
            Err(PidError::FanSpeedOutOfRange(256))
        ));
        let mut cold = base.clone();
        cold.target_temp = 0.0;
        assert!(matches!(cold.validate(), Err(PidError::InvalidTargetTemperature(_))));
        assert!(base.with_cycles(3).with_fan_speed(0).validate().is_ok());
    }

    #[test]
    fn test_tuning_cycles_exclude_warmup() {
        let request = PidAutotuneRequest::new(Heater::HotEnd, 210.0);
        assert_eq!(request.clone().with_cycles(8).tuning_cycles(), 6);
        assert_eq!(request.clone().with_cycles(3).tuning_cycles(), 1);
        assert_eq!(request.with_cycles(1).tuning_cycles(), 0);
    }

    #[test]
    fn test_gcode_script() {
        let request = PidAutotuneRequest::new(Heater::HotEnd, 215.0)
            .with_fan_speed(128)
            .with_cycles(5);
        assert_eq!(
            request.gcode(),
            vec!["M106 S128", "M303 C5 E0 S215 U1", "M500"]
        );

        let bed = PidAutotuneRequest::new(Heater::Bed, 62.5);
        assert_eq!(bed.gcode()[1], "M303 C8 E-1 S62.5 U1");
    }

    #[test]
    fn test_request_payload() {
        let request = PidAutotuneRequest::new(Heater::Bed, 60.0).with_cycles(5);
        let body = serde_json::to_value(crate::octoprint::PluginCommand::PidStart(request)).unwrap();
        assert_eq!(
            body,
            json!({
                "command": "pid_start",
                "heater": "bed",
                "fanSpeed": 255,
                "noCycles": 5,
                "hotEndIndex": -1,
                "targetTemp": 60
            })
        );
    }

    #[test]
    fn test_heater_from_str() {
        assert_eq!("hotEnd".parse::<Heater>().unwrap(), Heater::HotEnd);
        assert_eq!("BED".parse::<Heater>().unwrap(), Heater::Bed);
        assert!("chamber".parse::<Heater>().is_err());
    }

    #[test]
    fn test_averaged_drops_warmup_cycles() {
        let cycles = [
            PidValues::new(99.0, 99.0, 99.0),
            PidValues::new(99.0, 99.0, 99.0),
            PidValues::new(20.0, 1.0, 100.0),
            PidValues::new(30.0, 3.0, 200.0),
        ];
        assert_eq!(
            PidValues::averaged(&cycles),
            Some(PidValues::new(25.0, 2.0, 150.0))
        );
        assert_eq!(PidValues::averaged(&cycles[..2]), None);
        assert_eq!(PidValues::averaged(&[]), None);
    }

    #[test]
    fn test_current_values_accept_strings_and_empty_heaters() {
        let current = CurrentPidValues::from_response(&json!({
            "data": {"hotEnd": {"P": "27.08", "I": "2.51", "D": 73.09}, "bed": {}}
        }));
        assert_eq!(current.hot_end, Some(PidValues::new(27.08, 2.51, 73.09)));
        assert_eq!(current.bed, None);

        assert_eq!(CurrentPidValues::from_response(&json!(null)), CurrentPidValues::default());
    }

    #[test]
    fn test_cycles_from_response() {
        let cycles = PidCycles::from_response(&json!({
            "data": {"hotEnd": [{"P": "30.56", "I": "3.03", "D": "77.16"}, {"P": 1}], "bed": []}
        }));
        assert_eq!(cycles.hot_end, vec![PidValues::new(30.56, 3.03, 77.16)]);
        assert!(cycles.bed.is_empty());
    }
}
