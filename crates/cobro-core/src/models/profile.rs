//! Rating profiles and plan activations
//!
//! A [`RatingProfile`] is the per (tenant, category, subject) timeline of
//! [`RatingPlanActivation`]s. Activations are consulted most-recent-first;
//! an activation later than the query instant is never selected. Each
//! activation carries the fallback keys to consult when its plan leaves a
//! sub-range uncovered.

use crate::models::rate::RateInterval;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Wildcard subject used as the last-resort profile lookup
pub const ANY_SUBJECT: &str = "*any";

/// Binds a rating plan to a profile starting at an activation time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingPlanActivation {
    pub activation_time: DateTime<Utc>,
    pub rating_plan_id: String,

    /// Alternate profile keys consulted, in order, when the plan leaves a
    /// sub-range uncovered
    #[serde(default)]
    pub fallback_keys: Vec<String>,

    #[serde(default)]
    pub weight: f64,
}

/// Timeline of rating plan activations for one (tenant, category, subject)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingProfile {
    /// Lookup key, "tenant:category:subject"
    pub key: String,

    pub activations: Vec<RatingPlanActivation>,
}

impl RatingProfile {
    /// Activations usable for a query ending at `end`, most recent first
    pub fn activations_before(&self, end: DateTime<Utc>) -> Vec<&RatingPlanActivation> {
        let mut out: Vec<&RatingPlanActivation> = self
            .activations
            .iter()
            .filter(|a| a.activation_time < end)
            .collect();
        out.sort_by_key(|a| std::cmp::Reverse(a.activation_time));
        out
    }
}

/// Compose the profile lookup key for a (tenant, category, subject) triple
pub fn profile_key(tenant: &str, category: &str, subject: &str) -> String {
    format!("{}:{}:{}", tenant, category, subject)
}

/// Derive the `*any`-subject variant of a profile key, when distinct
pub fn any_subject_key(key: &str) -> Option<String> {
    let (prefix, subject) = key.rsplit_once(':')?;
    if subject == ANY_SUBJECT {
        return None;
    }
    Some(format!("{}:{}", prefix, ANY_SUBJECT))
}

/// A rated event: who calls what, and over which time window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallDescriptor {
    pub tenant: String,
    pub category: String,
    pub subject: String,
    pub destination: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl CallDescriptor {
    pub fn profile_key(&self) -> String {
        profile_key(&self.tenant, &self.category, &self.subject)
    }

    pub fn duration_secs(&self) -> i64 {
        (self.end - self.start).num_seconds()
    }
}

/// One resolved sub-range of a call bound to a rating plan and the rate
/// intervals applicable over that sub-range
///
/// `rate_intervals` holds the full weight-tie set; secondary tie-breaking
/// is the caller's business rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingInfo {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub rating_plan_id: String,
    pub matched_destination: String,
    pub rate_intervals: Vec<RateInterval>,
}

impl RatingInfo {
    pub fn duration_secs(&self) -> i64 {
        (self.end - self.start).num_seconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, 0, 0, 0).unwrap()
    }

    fn activation(at: DateTime<Utc>, plan: &str) -> RatingPlanActivation {
        RatingPlanActivation {
            activation_time: at,
            rating_plan_id: plan.to_string(),
            fallback_keys: vec![],
            weight: 10.0,
        }
    }

    #[test]
    fn test_activations_before_sorted_desc() {
        let profile = RatingProfile {
            key: profile_key("cgrates.org", "call", "1001"),
            activations: vec![
                activation(utc(2024, 1, 1), "RP_OLD"),
                activation(utc(2024, 6, 1), "RP_NEW"),
                activation(utc(2025, 1, 1), "RP_FUTURE"),
            ],
        };
        let got = profile.activations_before(utc(2024, 7, 1));
        let ids: Vec<&str> = got.iter().map(|a| a.rating_plan_id.as_str()).collect();
        assert_eq!(ids, vec!["RP_NEW", "RP_OLD"]);
    }

    #[test]
    fn test_any_subject_key() {
        assert_eq!(
            any_subject_key("cgrates.org:call:1001").as_deref(),
            Some("cgrates.org:call:*any")
        );
        assert_eq!(any_subject_key("cgrates.org:call:*any"), None);
        assert_eq!(any_subject_key("nodelimiter"), None);
    }
}
