//! Human interval strings (`"30m"`, `"1h"`) used by scheduled strategies.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Parse `<integer><s|m|h|d>` into milliseconds.
pub fn parse_interval_ms(input: &str) -> Result<u64> {
    let input = input.trim();
    let invalid = || EngineError::InvalidInterval(input.to_string());

    let unit = input.chars().last().ok_or_else(invalid)?;
    let digits = &input[..input.len() - unit.len_utf8()];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let value: u64 = digits.parse().map_err(|_| invalid())?;

    let unit_ms: u64 = match unit {
        's' => 1_000,
        'm' => 60_000,
        'h' => 3_600_000,
        'd' => 86_400_000,
        _ => return Err(invalid()),
    };

    value.checked_mul(unit_ms).ok_or_else(invalid)
}

/// A validated interval that remembers how it was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Interval {
    raw: String,
    millis: u64,
}

impl Interval {
    pub fn from_secs(secs: u64) -> Self {
        Self {
            raw: format!("{secs}s"),
            millis: secs * 1_000,
        }
    }

    pub fn as_millis(&self) -> u64 {
        self.millis
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.millis)
    }
}

impl TryFrom<String> for Interval {
    type Error = EngineError;

    fn try_from(raw: String) -> Result<Self> {
        let millis = parse_interval_ms(&raw)?;
        Ok(Self { raw, millis })
    }
}

impl From<Interval> for String {
    fn from(interval: Interval) -> Self {
        interval.raw
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_units() {
        assert_eq!(parse_interval_ms("1h").unwrap(), 3_600_000);
        assert_eq!(parse_interval_ms("30m").unwrap(), 1_800_000);
        assert_eq!(parse_interval_ms("10s").unwrap(), 10_000);
        assert_eq!(parse_interval_ms("2d").unwrap(), 172_800_000);
    }

    #[test]
    fn test_parse_rejects_bad_formats() {
        for bad in ["abc", "", "h", "10", "10x", "-5m", "1.5h", "5 m"] {
            assert!(
                matches!(parse_interval_ms(bad), Err(EngineError::InvalidInterval(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_interval_deserializes_from_string() {
        let interval: Interval = serde_json::from_str("\"15m\"").unwrap();
        assert_eq!(interval.as_duration(), Duration::from_secs(900));
        assert_eq!(interval.to_string(), "15m");

        let bad: std::result::Result<Interval, _> = serde_json::from_str("\"soon\"");
        assert!(bad.is_err());
    }
}
