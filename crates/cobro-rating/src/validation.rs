//! Tariff sanity checks
//!
//! Load-time lint pass over rating plans. Each check returns the first
//! offending destination group, or `None` when the plan is sane; findings
//! are warnings for the operator, not hard failures.

use chrono::NaiveTime;
use cobro_core::models::{parse_time_of_day, RateInterval, RatingPlan};
use tracing::debug;

const SECONDS_PER_DAY: i64 = 86_400;

/// First destination group whose date-unbound intervals leave a daily gap
///
/// Date-pinned intervals (specific years, months or month days) are
/// overlays rather than base coverage; a group made only of such intervals
/// is exempt from the continuity check.
pub fn first_discontinuous(plan: &RatingPlan) -> Option<String> {
    for (destination, intervals) in &plan.destination_rates {
        let base: Vec<&RateInterval> = intervals
            .iter()
            .filter(|i| i.calendar.is_date_unbound())
            .collect();
        if base.is_empty() {
            debug!(
                plan = %plan.id,
                %destination,
                "only date-pinned intervals, skipping continuity check"
            );
            continue;
        }
        for weekday in 0..=6u32 {
            if !covers_whole_day(&base, weekday) {
                return Some(destination.clone());
            }
        }
    }
    None
}

fn covers_whole_day(intervals: &[&RateInterval], weekday: u32) -> bool {
    let mut windows: Vec<(i64, i64)> = intervals
        .iter()
        .filter(|i| {
            i.calendar.week_days.is_empty() || i.calendar.week_days.contains(&weekday)
        })
        .filter_map(|i| {
            let start = window_second(&i.calendar.start_time, 0)?;
            let end = window_second(&i.calendar.end_time, SECONDS_PER_DAY)?;
            Some((start, end))
        })
        .collect();
    windows.sort();

    let mut covered_until = 0;
    for (start, end) in windows {
        if start > covered_until {
            return false;
        }
        covered_until = covered_until.max(end);
    }
    covered_until >= SECONDS_PER_DAY
}

fn window_second(time: &str, default: i64) -> Option<i64> {
    if time.is_empty() {
        return Some(default);
    }
    let tod = parse_time_of_day(time)?;
    Some((tod - NaiveTime::MIN).num_seconds())
}

/// First destination group containing a malformed rate slot
///
/// A sane slot has positive unit and increment sizes, an increment that
/// divides the unit, and slots ordered by start offset.
pub fn first_unsane_rate(plan: &RatingPlan) -> Option<String> {
    for (destination, intervals) in &plan.destination_rates {
        for interval in intervals {
            let mut last_offset = i64::MIN;
            for slot in &interval.slots {
                if slot.rate_unit_secs <= 0
                    || slot.rate_increment_secs <= 0
                    || slot.rate_unit_secs % slot.rate_increment_secs != 0
                    || slot.start_offset_secs < last_offset
                {
                    return Some(destination.clone());
                }
                last_offset = slot.start_offset_secs;
            }
        }
    }
    None
}

/// First destination group holding two intervals with an identical calendar
///
/// Duplicates are merged when plans are assembled through
/// [`RatingPlan::add_rate_interval`]; this catches data deserialized
/// straight into the plan.
pub fn first_unsane_timing(plan: &RatingPlan) -> Option<String> {
    for (destination, intervals) in &plan.destination_rates {
        for (i, interval) in intervals.iter().enumerate() {
            if intervals[i + 1..]
                .iter()
                .any(|other| other.calendar == interval.calendar)
            {
                return Some(destination.clone());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use cobro_core::models::{CalendarSpec, RateSlot};
    use rust_decimal_macros::dec;

    fn slot(unit: i64, increment: i64) -> RateSlot {
        RateSlot {
            start_offset_secs: 0,
            unit_price: dec!(0.10),
            rate_unit_secs: unit,
            rate_increment_secs: increment,
        }
    }

    fn interval(calendar: CalendarSpec) -> RateInterval {
        RateInterval {
            calendar,
            weight: 10.0,
            slots: vec![slot(60, 6)],
        }
    }

    #[test]
    fn test_always_interval_is_continuous() {
        let mut plan = RatingPlan::new("RP");
        plan.add_rate_interval("51", interval(CalendarSpec::always()));
        assert_eq!(first_discontinuous(&plan), None);
    }

    #[test]
    fn test_complementary_windows_are_continuous() {
        let mut plan = RatingPlan::new("RP");
        plan.add_rate_interval(
            "51",
            interval(CalendarSpec {
                start_time: "00:00:00".to_string(),
                end_time: "12:00:00".to_string(),
                ..Default::default()
            }),
        );
        plan.add_rate_interval(
            "51",
            interval(CalendarSpec {
                start_time: "12:00:00".to_string(),
                ..Default::default()
            }),
        );
        assert_eq!(first_discontinuous(&plan), None);
    }

    #[test]
    fn test_daily_gap_is_flagged() {
        let mut plan = RatingPlan::new("RP");
        plan.add_rate_interval(
            "51",
            interval(CalendarSpec {
                start_time: "09:00:00".to_string(),
                end_time: "18:00:00".to_string(),
                ..Default::default()
            }),
        );
        assert_eq!(first_discontinuous(&plan).as_deref(), Some("51"));
    }

    #[test]
    fn test_weekday_gap_is_flagged() {
        let mut plan = RatingPlan::new("RP");
        // weekdays covered, weekend not
        plan.add_rate_interval(
            "51",
            interval(CalendarSpec {
                week_days: vec![1, 2, 3, 4, 5],
                ..Default::default()
            }),
        );
        assert_eq!(first_discontinuous(&plan).as_deref(), Some("51"));
    }

    #[test]
    fn test_date_pinned_group_is_exempt() {
        let mut plan = RatingPlan::new("RP");
        plan.add_rate_interval(
            "51",
            interval(CalendarSpec {
                months: vec![12],
                month_days: vec![25],
                ..Default::default()
            }),
        );
        assert_eq!(first_discontinuous(&plan), None);
    }

    #[test]
    fn test_unsane_rate_detection() {
        let mut plan = RatingPlan::new("RP");
        plan.add_rate_interval("51", interval(CalendarSpec::always()));
        assert_eq!(first_unsane_rate(&plan), None);

        let mut bad = interval(CalendarSpec {
            start_time: "09:00:00".to_string(),
            ..Default::default()
        });
        // increment does not divide the unit
        bad.slots = vec![slot(60, 7)];
        plan.add_rate_interval("51", bad);
        assert_eq!(first_unsane_rate(&plan).as_deref(), Some("51"));
    }

    #[test]
    fn test_unsane_timing_detects_raw_duplicates() {
        let mut plan = RatingPlan::new("RP");
        // bypass add_rate_interval the way deserialized data does
        plan.destination_rates.insert(
            "51".to_string(),
            vec![interval(CalendarSpec::always()), interval(CalendarSpec::always())],
        );
        assert_eq!(first_unsane_timing(&plan).as_deref(), Some("51"));
    }
}
