//! Human-readable durations for config values: "3s", "500ms", "2m", "1d".

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{de, Deserialize, Deserializer, Serializer};

const UNITS: &[(&str, u64)] = &[
    ("ms", 1),
    ("s", 1_000),
    ("m", 60 * 1_000),
    ("h", 60 * 60 * 1_000),
    ("d", 24 * 60 * 60 * 1_000),
];

/// Parse a duration string made of a whole number and a unit suffix.
///
/// Supported units are `ms`, `s`, `m`, `h` and `d`. Input is case-insensitive
/// and surrounding whitespace is ignored.
///
/// ```
/// use cubewatch::duration::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("3s").unwrap(), Duration::from_secs(3));
/// assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
/// assert_eq!(parse_duration("1d").unwrap(), Duration::from_secs(86_400));
/// ```
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim().to_ascii_lowercase();
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .context("Duration must end with ms, s, m, h, or d")?;
    let (num, unit) = s.split_at(split);

    let per_unit = UNITS
        .iter()
        .find(|(suffix, _)| *suffix == unit.trim())
        .map(|(_, millis)| *millis)
        .with_context(|| format!("Unknown duration unit {unit:?}"))?;

    let num: u64 = num.parse().context("Invalid number in duration")?;
    let millis = num.checked_mul(per_unit).context("Duration is too large")?;

    Ok(Duration::from_millis(millis))
}

/// Format a duration with the largest unit that divides it evenly.
pub fn format_duration(d: Duration) -> String {
    let millis = d.as_millis().min(u128::from(u64::MAX)) as u64;
    if millis == 0 {
        return "0s".to_string();
    }

    UNITS
        .iter()
        .rev()
        .find(|(_, per_unit)| millis % per_unit == 0)
        .map(|(suffix, per_unit)| format!("{}{suffix}", millis / per_unit))
        .unwrap_or_else(|| format!("{millis}ms"))
}

/// Serde deserializer for duration strings.
///
/// Use with `#[serde(deserialize_with = "deserialize_duration")]`.
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_duration(&s).map_err(de::Error::custom)
}

/// Serde serializer matching [`deserialize_duration`].
pub fn serialize_duration<S>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_duration(*d))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_unit() {
        assert_eq!(parse_duration("750ms").unwrap(), Duration::from_millis(750));
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("5M").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration(" 1h ").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("10d").unwrap(), Duration::from_secs(864_000));
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("3w").is_err());
        assert!(parse_duration("-3s").is_err());
        assert!(parse_duration("99999999999999999999d").is_err());
    }

    #[test]
    fn formats_with_largest_even_unit() {
        assert_eq!(format_duration(Duration::from_secs(86_400)), "1d");
        assert_eq!(format_duration(Duration::from_secs(90)), "90s");
        assert_eq!(format_duration(Duration::from_millis(1_500)), "1500ms");
        assert_eq!(format_duration(Duration::from_secs(120)), "2m");
        assert_eq!(format_duration(Duration::ZERO), "0s");
    }
}
