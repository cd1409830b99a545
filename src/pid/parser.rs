// Firmware echo-line parsing for PID gains

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use super::types::{Heater, PidValues};

// Matches, with or without a `!!DEBUG:send` / `echo:` prefix:
//   Kp: 30.56 Ki: 3.03 Kd: 77.16
//   p:18.84 i:1.18 d:201.41
//   M304 P131.06 I11.79 D971.23
static PID_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)k?p:?\s?(?P<p>\d{1,4}\.\d{1,4})\s*k?i:?\s?(?P<i>\d{1,4}\.\d{1,4})\s*k?d:?\s?(?P<d>\d{1,4}\.\d{1,4})",
    )
    .expect("valid PID line pattern")
});

/// What a firmware line says about the heater being queried
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PidLine {
    /// The firmware does not know the query command
    Unsupported,
    /// Gains for the expected heater
    Values(PidValues),
    /// Gains that belong to the other heater
    Mismatch(PidValues),
    NoMatch,
}

/// Extract P/I/D from a firmware echo line
pub fn parse_pid_line(line: &str) -> Option<PidValues> {
    let caps = PID_LINE.captures(line)?;
    let gain = |name: &str| caps.name(name).and_then(|m| m.as_str().parse::<f64>().ok());
    Some(PidValues::new(gain("p")?, gain("i")?, gain("d")?))
}

/// Classify a reply to an M301/M304 query for `heater`
pub fn classify_pid_line(line: &str, heater: Heater) -> PidLine {
    if line.contains("Unknown command") {
        warn!(%heater, line, "Firmware does not support the PID query");
        return PidLine::Unsupported;
    }
    match parse_pid_line(line) {
        Some(values) if line.contains(heater.gcode()) => {
            debug!(%heater, %values, "Matched PID values");
            PidLine::Values(values)
        }
        Some(values) => {
            warn!(%heater, line, "PID values do not belong to the expected heater");
            PidLine::Mismatch(values)
        }
        None => {
            debug!(line, "No PID values in line");
            PidLine::NoMatch
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_every_echo_form() {
        let expected = PidValues::new(30.56, 3.03, 77.16);
        for line in [
            "!!DEBUG:send echo: Kp: 30.56 Ki: 3.03 Kd: 77.16",
            "!!DEBUG:send Kp: 30.56 Ki: 3.03 Kd: 77.16",
            "echo: KP:30.56 KI:3.03 KD:77.16",
            "echo: p:30.56 i:3.03 d:77.16",
            "p:30.56 i:3.03 d:77.16",
            "echo: M301 P30.56 I3.03 D77.16",
        ] {
            assert_eq!(parse_pid_line(line), Some(expected), "line: {line}");
        }

        assert_eq!(
            parse_pid_line("!!DEBUG:send M304 P131.06 I11.79 D971.23"),
            Some(PidValues::new(131.06, 11.79, 971.23))
        );
    }

    #[test]
    fn test_ignores_lines_without_gains() {
        assert_eq!(parse_pid_line("ok T:210.0 /210.0 B:60.0 /60.0"), None);
        assert_eq!(parse_pid_line("echo: M301 P30 I3 D77"), None);
    }

    #[test]
    fn test_classify_by_heater() {
        let hot_end = "echo: M301 P27.08 I2.51 D73.09";
        let bed = "echo: M304 P131.06 I11.79 D971.23";

        assert_eq!(
            classify_pid_line(hot_end, Heater::HotEnd),
            PidLine::Values(PidValues::new(27.08, 2.51, 73.09))
        );
        assert_eq!(
            classify_pid_line(hot_end, Heater::Bed),
            PidLine::Mismatch(PidValues::new(27.08, 2.51, 73.09))
        );
        assert!(matches!(classify_pid_line(bed, Heater::Bed), PidLine::Values(_)));
        assert_eq!(
            classify_pid_line("echo:Unknown command: \"M304\"", Heater::Bed),
            PidLine::Unsupported
        );
        assert_eq!(classify_pid_line("ok", Heater::HotEnd), PidLine::NoMatch);
    }
}
