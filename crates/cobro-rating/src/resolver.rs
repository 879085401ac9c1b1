//! Rating resolution
//!
//! [`RatingResolver`] maps a call descriptor onto rated segments: the call
//! window is first split at rating plan activation boundaries, then at the
//! time-of-day boundaries of the candidate rate intervals, and each piece
//! is bound to the interval set active over it. Uncovered pieces recurse
//! into the activation's fallback keys; a missing profile retries once
//! with the wildcard subject.

use chrono::{DateTime, NaiveTime, Utc};
use cobro_core::error::AppError;
use cobro_core::models::{
    any_subject_key, parse_time_of_day, CalendarSpec, CallDescriptor, RateInterval, RatingInfo,
    RatingPlanActivation,
};
use cobro_core::traits::TariffStore;
use cobro_core::AppResult;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Hard cap on produced segments per call; exceeding it means the tariff
/// data is pathological
const MAX_SEGMENTS: usize = 4096;

/// A rated segment: the resolved rating info plus its computed cost
#[derive(Debug, Clone, Serialize)]
pub struct RatedSegment {
    pub cost: Decimal,
    pub info: RatingInfo,
}

/// Full cost breakdown of a call
#[derive(Debug, Clone, Serialize)]
pub struct CallCost {
    pub total: Decimal,
    pub segments: Vec<RatedSegment>,
}

/// Resolves call descriptors against the tariff store
pub struct RatingResolver<T: TariffStore> {
    tariffs: Arc<T>,
}

impl<T: TariffStore> RatingResolver<T> {
    pub fn new(tariffs: Arc<T>) -> Self {
        Self { tariffs }
    }

    /// Resolve the call window into rating segments, ordered by start
    ///
    /// Sub-ranges no profile covers are simply absent from the result;
    /// [`RatingResolver::resolve_cost`] turns such gaps into an error.
    #[instrument(skip(self), fields(subject = %cd.subject, destination = %cd.destination))]
    pub fn resolve(&self, cd: &CallDescriptor) -> AppResult<Vec<RatingInfo>> {
        if cd.end <= cd.start {
            return Ok(Vec::new());
        }
        let mut visited = HashSet::new();
        let mut out = Vec::new();
        self.resolve_key(cd, &cd.profile_key(), cd.start, cd.end, &mut visited, &mut out)?;
        out.sort_by_key(|segment| segment.start);
        Ok(out)
    }

    /// Resolve and price the call
    ///
    /// Every instant of the call must be covered by a segment; a gap is a
    /// [`AppError::RateNotFound`], distinct from a zero-cost result.
    #[instrument(skip(self), fields(subject = %cd.subject, destination = %cd.destination))]
    pub fn resolve_cost(&self, cd: &CallDescriptor) -> AppResult<CallCost> {
        let infos = self.resolve(cd)?;
        let mut cursor = cd.start;
        let mut total = Decimal::ZERO;
        let mut segments = Vec::with_capacity(infos.len());
        for info in infos {
            if info.start > cursor {
                return Err(self.not_found(cd, cursor, info.start));
            }
            let interval = pick_rate_interval(&info.rate_intervals)
                .ok_or_else(|| self.not_found(cd, info.start, info.end))?;
            let from = (info.start - cd.start).num_seconds();
            let to = (info.end - cd.start).num_seconds();
            let cost = interval.cost_between(from, to);
            total += cost;
            cursor = cursor.max(info.end);
            segments.push(RatedSegment { cost, info });
        }
        if cursor < cd.end {
            return Err(self.not_found(cd, cursor, cd.end));
        }
        Ok(CallCost { total, segments })
    }

    fn not_found(&self, cd: &CallDescriptor, from: DateTime<Utc>, to: DateTime<Utc>) -> AppError {
        AppError::RateNotFound(format!(
            "{} -> {} over {}..{}",
            cd.profile_key(),
            cd.destination,
            from,
            to
        ))
    }

    /// Resolve one profile key over `[from, to)`
    ///
    /// The visited set tracks the current recursion chain only: a key is
    /// removed on the way out so sibling sub-ranges may consult it again,
    /// while a fallback loop within one chain terminates immediately.
    fn resolve_key(
        &self,
        cd: &CallDescriptor,
        key: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        visited: &mut HashSet<String>,
        out: &mut Vec<RatingInfo>,
    ) -> AppResult<()> {
        if from >= to {
            return Ok(());
        }
        if !visited.insert(key.to_string()) {
            debug!(key, "fallback cycle detected, stopping recursion");
            return Ok(());
        }
        let result = self.resolve_key_inner(cd, key, from, to, visited, out);
        visited.remove(key);
        result
    }

    fn resolve_key_inner(
        &self,
        cd: &CallDescriptor,
        key: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        visited: &mut HashSet<String>,
        out: &mut Vec<RatingInfo>,
    ) -> AppResult<()> {
        let Some(profile) = self.tariffs.rating_profile(key) else {
            if let Some(wildcard) = any_subject_key(key) {
                debug!(key, wildcard = %wildcard, "profile missing, retrying wildcard subject");
                return self.resolve_key(cd, &wildcard, from, to, visited, out);
            }
            return Ok(());
        };

        // walk activations newest-first, shrinking the upper bound as each
        // older activation takes over the range before its successor
        let mut upper = to;
        for activation in profile.activations_before(to) {
            if upper <= from {
                break;
            }
            let lo = activation.activation_time.max(from);
            if lo < upper {
                self.cover_segment(cd, activation, lo, upper, visited, out)?;
            }
            upper = upper.min(activation.activation_time);
        }
        Ok(())
    }

    /// Bind `[from, to)` to the activation's plan, splitting at interval
    /// time-of-day boundaries and recursing into fallbacks for any piece
    /// the plan does not cover
    fn cover_segment(
        &self,
        cd: &CallDescriptor,
        activation: &RatingPlanActivation,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        visited: &mut HashSet<String>,
        out: &mut Vec<RatingInfo>,
    ) -> AppResult<()> {
        let Some(plan) = self.tariffs.rating_plan(&activation.rating_plan_id) else {
            debug!(plan = %activation.rating_plan_id, "rating plan missing, using fallbacks");
            return self.fallback(cd, activation, from, to, visited, out);
        };
        let Some((matched, intervals)) = plan.rate_intervals_for(&cd.destination) else {
            return self.fallback(cd, activation, from, to, visited, out);
        };

        let mut t = from;
        while t < to {
            if out.len() >= MAX_SEGMENTS {
                return Err(AppError::Internal(format!(
                    "segment limit exceeded resolving {}",
                    cd.profile_key()
                )));
            }
            let boundary = next_boundary(intervals, t, to);
            let active: Vec<&RateInterval> =
                intervals.iter().filter(|i| i.calendar.matches(t)).collect();
            if active.is_empty() {
                self.fallback(cd, activation, t, boundary, visited, out)?;
            } else {
                let top = active
                    .iter()
                    .map(|i| i.weight)
                    .fold(f64::NEG_INFINITY, f64::max);
                let ties: Vec<RateInterval> = active
                    .into_iter()
                    .filter(|i| i.weight == top)
                    .cloned()
                    .collect();
                out.push(RatingInfo {
                    start: t,
                    end: boundary,
                    rating_plan_id: plan.id.clone(),
                    matched_destination: matched.to_string(),
                    rate_intervals: ties,
                });
            }
            t = boundary;
        }
        Ok(())
    }

    /// Try the activation's fallback keys in order; the first key that
    /// produces segments wins the sub-range
    fn fallback(
        &self,
        cd: &CallDescriptor,
        activation: &RatingPlanActivation,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        visited: &mut HashSet<String>,
        out: &mut Vec<RatingInfo>,
    ) -> AppResult<()> {
        for key in &activation.fallback_keys {
            let before = out.len();
            self.resolve_key(cd, key, from, to, visited, out)?;
            if out.len() > before {
                return Ok(());
            }
        }
        Ok(())
    }
}

/// Pick the effective interval from a tie set: highest weight, then the
/// more constrained calendar, then configured order
pub fn pick_rate_interval(intervals: &[RateInterval]) -> Option<&RateInterval> {
    let mut best: Option<&RateInterval> = None;
    for candidate in intervals {
        let better = match best {
            None => true,
            Some(current) => {
                candidate.weight > current.weight
                    || (candidate.weight == current.weight
                        && specificity(&candidate.calendar) > specificity(&current.calendar))
            }
        };
        if better {
            best = Some(candidate);
        }
    }
    best
}

fn specificity(spec: &CalendarSpec) -> u32 {
    let mut score = 0;
    if !spec.years.is_empty() {
        score += 1;
    }
    if !spec.months.is_empty() {
        score += 1;
    }
    if !spec.month_days.is_empty() {
        score += 1;
    }
    if !spec.week_days.is_empty() {
        score += 1;
    }
    if !spec.start_time.is_empty() {
        score += 1;
    }
    if !spec.end_time.is_empty() {
        score += 1;
    }
    score
}

/// Earliest instant after `t` at which some interval may change state:
/// any interval's start or end time-of-day today, else the next midnight,
/// clamped to `to`
fn next_boundary(intervals: &[RateInterval], t: DateTime<Utc>, to: DateTime<Utc>) -> DateTime<Utc> {
    let mut boundary = t
        .date_naive()
        .succ_opt()
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
        .unwrap_or(to);
    for interval in intervals {
        for time in [&interval.calendar.start_time, &interval.calendar.end_time] {
            if time.is_empty() {
                continue;
            }
            if let Some(tod) = parse_time_of_day(time) {
                let candidate = t.date_naive().and_time(tod).and_utc();
                if candidate > t && candidate < boundary {
                    boundary = candidate;
                }
            }
        }
    }
    boundary.min(to)
}
