//! Calendar recurrence specification
//!
//! [`CalendarSpec`] describes when a tariff timing or a scheduled action is
//! active: candidate years, months, month days and weekdays, plus a
//! time-of-day window. An empty spec matches every instant. Specs are built
//! once at load time and never mutated by resolution; deferred start times
//! (`*asap`, `+<duration>`) are materialized into a new, pinned spec before
//! scheduling.

use crate::error::AppError;
use crate::AppResult;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel start time meaning "now plus a configured short delay"
pub const ASAP: &str = "*asap";

/// How far ahead `next_occurrence` searches when no candidate years are
/// given. Specs whose next match lies beyond the horizon resolve to none.
const SEARCH_HORIZON_YEARS: i32 = 5;

/// Recurrence descriptor over years, months, month days, weekdays and a
/// time-of-day window
///
/// Empty fields are wildcards: a spec with every field empty matches every
/// instant. Weekdays are numbered 0 (Sunday) through 6 (Saturday).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalendarSpec {
    /// Candidate years (empty = any)
    #[serde(default)]
    pub years: Vec<i32>,

    /// Candidate months, 1..=12 (empty = any)
    #[serde(default)]
    pub months: Vec<u32>,

    /// Candidate month days, 1..=31 (empty = any)
    #[serde(default)]
    pub month_days: Vec<u32>,

    /// Candidate weekdays, 0 = Sunday .. 6 = Saturday (empty = any)
    #[serde(default)]
    pub week_days: Vec<u32>,

    /// Start of the daily active window as "HH:MM:SS"; also accepts the
    /// deferred forms `*asap` and `+<duration>` (empty = start of day)
    #[serde(default)]
    pub start_time: String,

    /// End of the daily active window as "HH:MM:SS", exclusive
    /// (empty = open-ended)
    #[serde(default)]
    pub end_time: String,
}

impl CalendarSpec {
    /// Spec that matches every instant
    pub fn always() -> Self {
        Self::default()
    }

    /// True when every field is empty, i.e. continuous coverage
    pub fn is_always(&self) -> bool {
        self.years.is_empty()
            && self.months.is_empty()
            && self.month_days.is_empty()
            && self.week_days.is_empty()
            && self.start_time.is_empty()
            && self.end_time.is_empty()
    }

    /// True when the start time is deferred (`*asap` or `+<duration>`) and
    /// must be materialized before resolution
    pub fn is_deferred(&self) -> bool {
        self.start_time == ASAP || self.start_time.starts_with('+')
    }

    /// True when no date field constrains the spec
    pub fn is_date_unbound(&self) -> bool {
        self.years.is_empty() && self.months.is_empty() && self.month_days.is_empty()
    }

    /// Whether the spec is active at `t`
    ///
    /// Every non-empty field must accept the instant. An unparseable time
    /// string (including a still-deferred start time) never matches.
    pub fn matches(&self, t: DateTime<Utc>) -> bool {
        if !self.years.is_empty() && !self.years.contains(&t.year()) {
            return false;
        }
        if !self.months.is_empty() && !self.months.contains(&t.month()) {
            return false;
        }
        if !self.month_days.is_empty() && !self.month_days.contains(&t.day()) {
            return false;
        }
        if !self.week_days.is_empty()
            && !self.week_days.contains(&t.weekday().num_days_from_sunday())
        {
            return false;
        }
        let tod = t.time();
        if !self.start_time.is_empty() {
            match parse_time_of_day(&self.start_time) {
                Some(start) if tod >= start => {}
                _ => return false,
            }
        }
        if !self.end_time.is_empty() {
            match parse_time_of_day(&self.end_time) {
                Some(end) if tod < end => {}
                _ => return false,
            }
        }
        true
    }

    /// Next instant strictly after `after` at which the spec becomes active,
    /// or `None` when no such instant exists within the search horizon
    ///
    /// Walks candidate dates coarse-to-fine (year, month, day), re-validates
    /// the weekday for each candidate and attaches the start time-of-day.
    /// Deferred start times resolve to `None`; callers materialize them
    /// first via [`CalendarSpec::materialized`].
    pub fn next_occurrence(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.is_deferred() {
            return None;
        }
        let start_tod = if self.start_time.is_empty() {
            NaiveTime::MIN
        } else {
            parse_time_of_day(&self.start_time)?
        };

        let first_year = after.year();
        let last_year = if self.years.is_empty() {
            first_year + SEARCH_HORIZON_YEARS
        } else {
            *self.years.iter().max()?
        };

        for year in first_year..=last_year {
            if !self.years.is_empty() && !self.years.contains(&year) {
                continue;
            }
            for month in 1..=12u32 {
                if !self.months.is_empty() && !self.months.contains(&month) {
                    continue;
                }
                for day in 1..=31u32 {
                    if !self.month_days.is_empty() && !self.month_days.contains(&day) {
                        continue;
                    }
                    let Some(date) = NaiveDate::from_ymd_opt(year, month, day) else {
                        continue;
                    };
                    if !self.week_days.is_empty()
                        && !self
                            .week_days
                            .contains(&date.weekday().num_days_from_sunday())
                    {
                        continue;
                    }
                    let candidate = date.and_time(start_tod).and_utc();
                    if candidate > after {
                        return Some(candidate);
                    }
                }
            }
        }
        None
    }

    /// Resolve a deferred start time into a new spec pinned to a concrete
    /// date and time
    ///
    /// `*asap` becomes `now + asap_delay`; `+<duration>` becomes `now`
    /// plus the parsed offset. The returned spec carries the full pinned
    /// date, which makes it one-time: once the instant has passed,
    /// [`CalendarSpec::next_occurrence`] yields `None`. A non-deferred spec
    /// is returned unchanged.
    pub fn materialized(&self, now: DateTime<Utc>, asap_delay: Duration) -> AppResult<CalendarSpec> {
        let delay = if self.start_time == ASAP {
            asap_delay
        } else if let Some(offset) = self.start_time.strip_prefix('+') {
            parse_offset(offset)?
        } else {
            return Ok(self.clone());
        };
        let at = now + delay;
        Ok(CalendarSpec {
            years: vec![at.year()],
            months: vec![at.month()],
            month_days: vec![at.day()],
            week_days: Vec::new(),
            start_time: at.format("%H:%M:%S").to_string(),
            end_time: String::new(),
        })
    }

    /// Validate field ranges and time formats
    ///
    /// Deferred start times are accepted; they are validated again after
    /// materialization.
    pub fn validate(&self) -> AppResult<()> {
        if let Some(m) = self.months.iter().find(|m| **m < 1 || **m > 12) {
            return Err(AppError::InvalidCalendar(format!("month out of range: {}", m)));
        }
        if let Some(d) = self.month_days.iter().find(|d| **d < 1 || **d > 31) {
            return Err(AppError::InvalidCalendar(format!(
                "month day out of range: {}",
                d
            )));
        }
        if let Some(w) = self.week_days.iter().find(|w| **w > 6) {
            return Err(AppError::InvalidCalendar(format!(
                "weekday out of range: {}",
                w
            )));
        }
        if !self.start_time.is_empty() && !self.is_deferred() {
            parse_time_of_day(&self.start_time)
                .ok_or_else(|| AppError::InvalidCalendar(self.start_time.clone()))?;
        }
        if let Some(offset) = self.start_time.strip_prefix('+') {
            parse_offset(offset)?;
        }
        if !self.end_time.is_empty() {
            parse_time_of_day(&self.end_time)
                .ok_or_else(|| AppError::InvalidCalendar(self.end_time.clone()))?;
        }
        Ok(())
    }
}

/// Parse an "HH:MM:SS" 24-hour time-of-day string
pub fn parse_time_of_day(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M:%S").ok()
}

/// Parse a duration offset of the form "30s", "5m" or "1h"
pub fn parse_offset(s: &str) -> AppResult<Duration> {
    let (digits, unit) = s.split_at(s.len().saturating_sub(1));
    let value: i64 = digits
        .parse()
        .map_err(|_| AppError::InvalidCalendar(format!("+{}", s)))?;
    match unit {
        "s" => Ok(Duration::seconds(value)),
        "m" => Ok(Duration::minutes(value)),
        "h" => Ok(Duration::hours(value)),
        _ => Err(AppError::InvalidCalendar(format!("+{}", s))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_empty_spec_matches_everything() {
        let spec = CalendarSpec::always();
        assert!(spec.is_always());
        assert!(spec.matches(utc(2024, 1, 1, 0, 0, 0)));
        assert!(spec.matches(utc(2031, 12, 31, 23, 59, 59)));
    }

    #[test]
    fn test_matches_weekday_and_window() {
        // Mon-Fri 09:00-18:00
        let spec = CalendarSpec {
            week_days: vec![1, 2, 3, 4, 5],
            start_time: "09:00:00".to_string(),
            end_time: "18:00:00".to_string(),
            ..Default::default()
        };
        // 2024-01-02 is a Tuesday
        assert!(spec.matches(utc(2024, 1, 2, 10, 0, 0)));
        assert!(spec.matches(utc(2024, 1, 2, 9, 0, 0)));
        // end is exclusive
        assert!(!spec.matches(utc(2024, 1, 2, 18, 0, 0)));
        assert!(!spec.matches(utc(2024, 1, 2, 8, 59, 59)));
        // 2024-01-06 is a Saturday
        assert!(!spec.matches(utc(2024, 1, 6, 10, 0, 0)));
    }

    #[test]
    fn test_matches_month_and_day() {
        let spec = CalendarSpec {
            months: vec![12],
            month_days: vec![25],
            ..Default::default()
        };
        assert!(spec.matches(utc(2024, 12, 25, 12, 0, 0)));
        assert!(!spec.matches(utc(2024, 12, 24, 12, 0, 0)));
        assert!(!spec.matches(utc(2024, 11, 25, 12, 0, 0)));
    }

    #[test]
    fn test_next_occurrence_strictly_after() {
        let spec = CalendarSpec {
            start_time: "09:00:00".to_string(),
            ..Default::default()
        };
        let after = utc(2024, 1, 2, 9, 0, 0);
        let next = spec.next_occurrence(after).unwrap();
        assert!(next > after);
        assert_eq!(next, utc(2024, 1, 3, 9, 0, 0));

        let before = utc(2024, 1, 2, 8, 0, 0);
        assert_eq!(spec.next_occurrence(before).unwrap(), utc(2024, 1, 2, 9, 0, 0));
    }

    #[test]
    fn test_next_occurrence_weekday_rollover() {
        // Mondays at 08:30
        let spec = CalendarSpec {
            week_days: vec![1],
            start_time: "08:30:00".to_string(),
            ..Default::default()
        };
        // 2024-01-05 is a Friday; next Monday is 2024-01-08
        let next = spec.next_occurrence(utc(2024, 1, 5, 12, 0, 0)).unwrap();
        assert_eq!(next, utc(2024, 1, 8, 8, 30, 0));
    }

    #[test]
    fn test_next_occurrence_year_rollover() {
        let spec = CalendarSpec {
            months: vec![1],
            month_days: vec![1],
            ..Default::default()
        };
        let next = spec.next_occurrence(utc(2024, 6, 15, 0, 0, 0)).unwrap();
        assert_eq!(next, utc(2025, 1, 1, 0, 0, 0));
    }

    #[test]
    fn test_next_occurrence_exhausted_years() {
        let spec = CalendarSpec {
            years: vec![2020],
            ..Default::default()
        };
        assert_eq!(spec.next_occurrence(utc(2024, 1, 1, 0, 0, 0)), None);
    }

    #[test]
    fn test_next_occurrence_bad_time_yields_none() {
        let spec = CalendarSpec {
            start_time: "25:99:00".to_string(),
            ..Default::default()
        };
        assert_eq!(spec.next_occurrence(utc(2024, 1, 1, 0, 0, 0)), None);
        assert!(!spec.matches(utc(2024, 1, 1, 0, 0, 0)));
    }

    #[test]
    fn test_materialized_asap_is_one_time() {
        let spec = CalendarSpec {
            start_time: ASAP.to_string(),
            ..Default::default()
        };
        assert!(spec.is_deferred());
        assert_eq!(spec.next_occurrence(utc(2024, 1, 1, 0, 0, 0)), None);

        let now = utc(2024, 3, 10, 12, 0, 0);
        let pinned = spec.materialized(now, Duration::seconds(10)).unwrap();
        // the source spec is untouched
        assert_eq!(spec.start_time, ASAP);
        assert_eq!(pinned.years, vec![2024]);
        assert_eq!(pinned.months, vec![3]);
        assert_eq!(pinned.month_days, vec![10]);
        assert_eq!(pinned.start_time, "12:00:10");

        let fire_at = pinned.next_occurrence(now).unwrap();
        assert_eq!(fire_at, utc(2024, 3, 10, 12, 0, 10));
        // consumed: nothing after the pinned instant
        assert_eq!(pinned.next_occurrence(fire_at), None);
    }

    #[test]
    fn test_materialized_plus_offset() {
        let spec = CalendarSpec {
            start_time: "+5m".to_string(),
            ..Default::default()
        };
        let now = utc(2024, 3, 10, 23, 58, 0);
        let pinned = spec.materialized(now, Duration::seconds(10)).unwrap();
        // rolls over midnight into the next day
        assert_eq!(pinned.month_days, vec![11]);
        assert_eq!(pinned.start_time, "00:03:00");
    }

    #[test]
    fn test_materialized_noop_for_concrete_spec() {
        let spec = CalendarSpec {
            start_time: "09:00:00".to_string(),
            ..Default::default()
        };
        let out = spec
            .materialized(utc(2024, 1, 1, 0, 0, 0), Duration::seconds(10))
            .unwrap();
        assert_eq!(out, spec);
    }

    #[test]
    fn test_validate() {
        assert!(CalendarSpec::always().validate().is_ok());
        assert!(CalendarSpec {
            start_time: ASAP.to_string(),
            ..Default::default()
        }
        .validate()
        .is_ok());
        assert!(CalendarSpec {
            months: vec![13],
            ..Default::default()
        }
        .validate()
        .is_err());
        assert!(CalendarSpec {
            end_time: "24:00:61".to_string(),
            ..Default::default()
        }
        .validate()
        .is_err());
        assert!(CalendarSpec {
            start_time: "+5x".to_string(),
            ..Default::default()
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_parse_offset() {
        assert_eq!(parse_offset("30s").unwrap(), Duration::seconds(30));
        assert_eq!(parse_offset("5m").unwrap(), Duration::minutes(5));
        assert_eq!(parse_offset("1h").unwrap(), Duration::hours(1));
        assert!(parse_offset("abc").is_err());
        assert!(parse_offset("").is_err());
    }
}
