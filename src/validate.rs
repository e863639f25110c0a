//! Range checks for user-supplied setpoints.

use tracing::warn;

/// Highest voltage the 2220-30-1 accepts, in volts.
pub const MAX_VOLTAGE_V: f64 = 30.0;
/// Highest current the 2220-30-1 accepts, in milliamps.
pub const MAX_CURRENT_MA: f64 = 1500.0;

/// Parse a voltage setpoint, returning `None` when it is not a finite number
/// or lies outside `0..=30` V. Out-of-range numbers are logged.
pub fn parse_voltage(text: &str) -> Option<f64> {
    let volts = parse_number(text)?;
    if !(0.0..=MAX_VOLTAGE_V).contains(&volts) {
        warn!("Voltage must be between 0 and {MAX_VOLTAGE_V}V, got {volts}");
        return None;
    }
    Some(volts)
}

/// Parse a current setpoint in milliamps, returning `None` when it is not a
/// finite number or exceeds 1500 mA. Out-of-range numbers are logged.
pub fn parse_current(text: &str) -> Option<f64> {
    let milliamps = parse_number(text)?;
    if milliamps > MAX_CURRENT_MA {
        warn!("Current must be less than 1.5A, got {milliamps}mA");
        return None;
    }
    Some(milliamps)
}

pub fn validate_voltage(text: &str) -> bool {
    parse_voltage(text).is_some()
}

pub fn validate_current(text: &str) -> bool {
    parse_current(text).is_some()
}

fn parse_number(text: &str) -> Option<f64> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voltage_accepts_values_up_to_thirty() {
        for text in ["0", "5", "12.5", " 29.999 ", "30", "3e1"] {
            assert!(validate_voltage(text), "{text:?} should be accepted");
        }
    }

    #[test]
    fn voltage_rejects_out_of_range_and_garbage() {
        for text in ["30.01", "100", "-1", "", "none", "5V", "nan", "inf"] {
            assert!(!validate_voltage(text), "{text:?} should be rejected");
        }
    }

    #[test]
    fn current_threshold_is_in_milliamps() {
        assert!(validate_current("1500"));
        assert!(validate_current("250.5"));
        assert!(!validate_current("1500.1"));
        assert!(!validate_current("1.5A"));
        assert!(!validate_current("none"));
    }

    #[test]
    fn parse_returns_the_number() {
        assert_eq!(parse_voltage("12.5"), Some(12.5));
        assert_eq!(parse_current(" 100 "), Some(100.0));
        assert_eq!(parse_current("2000"), None);
    }
}
