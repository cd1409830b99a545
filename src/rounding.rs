use serde::{Deserialize, Serialize};

/// Rounding policy shared by every derived calibration value.
///
/// Values are rounded half toward positive infinity at `decimals` places, so
/// `-2.5` becomes `-2` and `873.5` becomes `874`. The same instance must be used
/// for display and for the value sent to the printer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rounding {
    pub decimals: u32,
}

impl Default for Rounding {
    fn default() -> Self {
        Self { decimals: 0 }
    }
}

impl Rounding {
    pub fn new(decimals: u32) -> Self {
        Self { decimals }
    }

    pub fn round(&self, value: f64) -> f64 {
        if !value.is_finite() {
            return value;
        }
        let factor = 10f64.powi(self.decimals as i32);
        let rounded = (value * factor + 0.5).floor() / factor;
        // Collapse -0.0 so that "0" and "-0" never disagree downstream
        if rounded == 0.0 {
            0.0
        } else {
            rounded
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rounds_to_whole_numbers_by_default() {
        let rounding = Rounding::default();
        assert_eq!(rounding.round(873.68), 874.0);
        assert_eq!(rounding.round(873.49), 873.0);
        assert_eq!(rounding.round(100.0), 100.0);
    }

    #[test]
    fn test_half_values_round_toward_positive_infinity() {
        let rounding = Rounding::default();
        assert_eq!(rounding.round(2.5), 3.0);
        assert_eq!(rounding.round(-2.5), -2.0);
        assert_eq!(rounding.round(-0.4), 0.0);
        assert!(rounding.round(-0.4).is_sign_positive());
    }

    #[test]
    fn test_configured_decimals() {
        let rounding = Rounding::new(2);
        assert_eq!(rounding.round(95.456), 95.46);
        assert_eq!(rounding.round(95.0), 95.0);
    }

    #[test]
    fn test_non_finite_values_pass_through() {
        let rounding = Rounding::default();
        assert!(rounding.round(f64::NAN).is_nan());
        assert_eq!(rounding.round(f64::INFINITY), f64::INFINITY);
    }
}
