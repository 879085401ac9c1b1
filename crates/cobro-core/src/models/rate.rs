//! Rate intervals and rating plans
//!
//! A [`RateInterval`] prices call time while its [`CalendarSpec`] is active;
//! a [`RatingPlan`] maps destination prefix groups to ordered interval
//! lists, resolved by longest prefix match with an `*any` fallback group.

use crate::models::calendar::CalendarSpec;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Catch-all destination group consulted when no prefix matches
pub const ANY_DESTINATION: &str = "*any";

/// A single pricing slot within a rate interval
///
/// Slots are ordered by `start_offset_secs`; each slot prices the span of
/// the call from its offset up to the next slot's offset (or the end of the
/// call), rounding the billed span up to `rate_increment_secs` and charging
/// `unit_price` per `rate_unit_secs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateSlot {
    /// Seconds into the call at which this slot starts pricing
    pub start_offset_secs: i64,

    /// Price per rate unit
    pub unit_price: Decimal,

    /// Seconds per priced unit (e.g. 60 for per-minute pricing)
    pub rate_unit_secs: i64,

    /// Billing increment in seconds; billed spans round up to a multiple
    pub rate_increment_secs: i64,
}

/// A priced interval of time with a tie-breaking weight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateInterval {
    pub calendar: CalendarSpec,
    pub weight: f64,
    pub slots: Vec<RateSlot>,
}

impl RateInterval {
    /// Cost of the call span `[from_secs, to_secs)`, offsets relative to
    /// the start of the call
    pub fn cost_between(&self, from_secs: i64, to_secs: i64) -> Decimal {
        let mut total = Decimal::ZERO;
        for (i, slot) in self.slots.iter().enumerate() {
            let slot_end = self
                .slots
                .get(i + 1)
                .map(|next| next.start_offset_secs)
                .unwrap_or(i64::MAX);
            let lo = slot.start_offset_secs.max(from_secs);
            let hi = slot_end.min(to_secs);
            if hi <= lo {
                continue;
            }
            let increment = slot.rate_increment_secs.max(1);
            let billed = (hi - lo + increment - 1) / increment * increment;
            let unit = slot.rate_unit_secs.max(1);
            total += slot.unit_price * Decimal::from(billed) / Decimal::from(unit);
        }
        total
    }

    /// Cost of a call of `duration_secs` starting at offset zero
    #[inline]
    pub fn cost_for(&self, duration_secs: i64) -> Decimal {
        self.cost_between(0, duration_secs)
    }
}

/// Named collection of destination group to rate interval mappings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RatingPlan {
    pub id: String,

    /// Destination prefix group -> ordered rate intervals
    #[serde(default)]
    pub destination_rates: HashMap<String, Vec<RateInterval>>,
}

impl RatingPlan {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            destination_rates: HashMap::new(),
        }
    }

    /// Attach a rate interval to a destination group
    ///
    /// Two intervals with an identical calendar inside one group are
    /// duplicates: the incoming slots are merged into the existing interval
    /// instead of stacking a second entry.
    pub fn add_rate_interval(&mut self, destination: &str, interval: RateInterval) {
        let list = self
            .destination_rates
            .entry(destination.to_string())
            .or_default();
        if let Some(existing) = list
            .iter_mut()
            .find(|existing| existing.calendar == interval.calendar)
        {
            debug!(
                plan = %self.id,
                destination,
                "merging duplicate rate interval calendar"
            );
            existing.slots.extend(interval.slots);
            existing
                .slots
                .sort_by_key(|slot| slot.start_offset_secs);
        } else {
            list.push(interval);
        }
    }

    /// Rate intervals for a destination, by longest prefix match
    ///
    /// Tries the normalized destination, then progressively shorter
    /// prefixes, then the `*any` group. Returns the matched group key
    /// alongside the intervals.
    pub fn rate_intervals_for(&self, destination: &str) -> Option<(&str, &[RateInterval])> {
        let normalized = normalize_destination(destination);
        for len in (1..=normalized.len()).rev() {
            if let Some((key, list)) = self.destination_rates.get_key_value(&normalized[..len]) {
                return Some((key.as_str(), list.as_slice()));
            }
        }
        self.destination_rates
            .get_key_value(ANY_DESTINATION)
            .map(|(key, list)| (key.as_str(), list.as_slice()))
    }
}

/// Normalize a dialed destination for prefix matching
pub fn normalize_destination(destination: &str) -> String {
    destination.chars().filter(|c| c.is_ascii_digit()).collect()
}
