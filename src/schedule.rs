//! Daily run times.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};

use crate::calendar::CalendarZone;
use crate::config::ScheduleConfig;

/// Days scanned ahead before giving up; covers a weekend plus DST gaps.
const LOOKAHEAD_DAYS: i64 = 8;

pub fn is_weekday(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Whether `date` is a day the schedule runs on.
pub fn runs_on(schedule: &ScheduleConfig, date: NaiveDate) -> bool {
    !schedule.weekdays_only || is_weekday(date)
}

/// First scheduled instant strictly after `now`.
///
/// Days where `run_at` falls into a DST gap are skipped. `None` only when no
/// run time exists in the lookahead window.
pub fn next_run_after(
    now: DateTime<Utc>,
    schedule: &ScheduleConfig,
    zone: &CalendarZone,
) -> Option<DateTime<Utc>> {
    let today = zone.date_of(now);
    (0..=LOOKAHEAD_DAYS)
        .map(|offset| today + Duration::days(offset))
        .filter(|date| runs_on(schedule, *date))
        .filter_map(|date| zone.to_utc(date.and_time(schedule.run_at)))
        .find(|candidate| *candidate > now)
}
