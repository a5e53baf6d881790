//! Calendar-day arithmetic in a configurable zone.
//!
//! Rebalancing timestamps arrive as Unix milliseconds and are compared against
//! a target day, so every conversion goes through one [`CalendarZone`].

use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// Compact day format used for target dates and report file names.
pub const COMPACT_DATE_FORMAT: &str = "%Y%m%d";

/// Zone used to truncate instants to calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CalendarZone {
    /// The host's local time zone.
    #[default]
    Local,
    Utc,
    Named(Tz),
}

impl CalendarZone {
    /// Wall-clock time of an instant in this zone.
    pub fn naive_of(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        match self {
            CalendarZone::Local => instant.with_timezone(&chrono::Local).naive_local(),
            CalendarZone::Utc => instant.naive_utc(),
            CalendarZone::Named(tz) => instant.with_timezone(tz).naive_local(),
        }
    }

    pub fn date_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        self.naive_of(instant).date()
    }

    /// Wall-clock time of a Unix millisecond timestamp, `None` if out of range.
    pub fn naive_of_millis(&self, millis: i64) -> Option<NaiveDateTime> {
        DateTime::<Utc>::from_timestamp_millis(millis).map(|instant| self.naive_of(instant))
    }

    pub fn date_of_millis(&self, millis: i64) -> Option<NaiveDate> {
        self.naive_of_millis(millis).map(|naive| naive.date())
    }

    /// Instant for a wall-clock time in this zone.
    ///
    /// Ambiguous times (DST fold) resolve to the earlier instant; times that
    /// do not exist (DST gap) return `None`.
    pub fn to_utc(&self, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
        match self {
            CalendarZone::Local => chrono::Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc)),
            CalendarZone::Utc => Some(naive.and_utc()),
            CalendarZone::Named(tz) => tz
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

impl fmt::Display for CalendarZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalendarZone::Local => f.write_str("local"),
            CalendarZone::Utc => f.write_str("utc"),
            CalendarZone::Named(tz) => f.write_str(tz.name()),
        }
    }
}

impl FromStr for CalendarZone {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "" | "local" => Ok(CalendarZone::Local),
            "utc" => Ok(CalendarZone::Utc),
            _ => trimmed
                .parse::<Tz>()
                .map(CalendarZone::Named)
                .map_err(|e| anyhow::anyhow!("Unknown time zone {trimmed:?}: {e}")),
        }
    }
}

impl Serialize for CalendarZone {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CalendarZone {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Parse a target day given as `YYYYMMDD` (or `YYYY-MM-DD`).
pub fn parse_target_date(s: &str) -> Result<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, COMPACT_DATE_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .with_context(|| format!("Invalid date {s:?}: expected YYYYMMDD"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_zone_names() {
        assert_eq!("local".parse::<CalendarZone>().unwrap(), CalendarZone::Local);
        assert_eq!("UTC".parse::<CalendarZone>().unwrap(), CalendarZone::Utc);
        assert_eq!(
            "Asia/Shanghai".parse::<CalendarZone>().unwrap(),
            CalendarZone::Named(chrono_tz::Asia::Shanghai)
        );
        assert!("Mars/Olympus".parse::<CalendarZone>().is_err());
    }

    #[test]
    fn millis_truncate_to_zone_day() {
        // 2024-06-03 17:30 UTC
        let millis = 1_717_435_800_000;
        assert_eq!(
            CalendarZone::Utc.date_of_millis(millis),
            NaiveDate::from_ymd_opt(2024, 6, 3)
        );
        assert_eq!(
            CalendarZone::Named(chrono_tz::Asia::Shanghai).date_of_millis(millis),
            NaiveDate::from_ymd_opt(2024, 6, 4)
        );
    }

    #[test]
    fn parse_target_date_accepts_compact_and_dashed() {
        let expected = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        assert_eq!(parse_target_date("20240603").unwrap(), expected);
        assert_eq!(parse_target_date("2024-06-03").unwrap(), expected);
        assert!(parse_target_date("2024/06/03").is_err());
    }
}
