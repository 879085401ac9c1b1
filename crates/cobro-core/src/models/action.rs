//! Actions, scheduled timings and balance triggers
//!
//! An [`Action`] is one step of a named action set. An [`ActionTiming`]
//! binds an action set to a [`CalendarSpec`] and a set of target accounts;
//! the scheduler fires it at each occurrence. An [`ActionTrigger`] fires an
//! action set when an account balance crosses a threshold.

use crate::models::account::BalanceFilter;
use crate::models::calendar::CalendarSpec;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;

/// Account filter token: only enabled accounts
pub const FILTER_ENABLED: &str = "*enabled";

/// Account filter token: only disabled accounts
pub const FILTER_DISABLED: &str = "*disabled";

/// Account filter prefix: accounts holding at least one balance of a type,
/// written `*has_balance:<type>`
pub const FILTER_HAS_BALANCE: &str = "*has_balance:";

/// One step of an action set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Action {
    pub id: String,

    /// Built-in function identifier, e.g. `*topup` or `*disable_account`
    pub action_type: String,

    /// Optional account filter expression; an action whose filter rejects
    /// the account is skipped without error
    #[serde(default)]
    pub filter: String,

    /// Balances the action applies to
    #[serde(default)]
    pub balance_filter: BalanceFilter,

    /// Units credited or debited by balance-mutating actions
    #[serde(default)]
    pub units: Decimal,

    /// Expiration applied by top-up actions: empty or `*unlimited` for
    /// none, `+<duration>` relative to fire time, or an RFC 3339 instant
    #[serde(default)]
    pub expiration_string: String,

    /// Execution priority inside the set; higher weight runs first
    #[serde(default)]
    pub weight: f64,
}

impl Action {
    /// Evaluate the account filter expression
    ///
    /// Supported tokens: empty (always applies), `*enabled`, `*disabled`
    /// and `*has_balance:<type>`. An unrecognized expression rejects the
    /// account so that typos fail closed.
    pub fn applies_to(&self, account: &crate::models::account::Account) -> bool {
        if self.filter.is_empty() {
            return true;
        }
        if self.filter == FILTER_ENABLED {
            return !account.disabled;
        }
        if self.filter == FILTER_DISABLED {
            return account.disabled;
        }
        if let Some(balance_type) = self.filter.strip_prefix(FILTER_HAS_BALANCE) {
            return !account.balances_of(balance_type).is_empty();
        }
        tracing::warn!(action = %self.id, filter = %self.filter, "unrecognized action filter");
        false
    }
}

/// Sort actions into execution order: weight descending, equal weights
/// keep their configured order
pub fn sort_actions_by_weight(actions: &mut [Action]) {
    actions.sort_by(|a, b| b.weight.partial_cmp(&a.weight).unwrap_or(Ordering::Equal));
}

/// Binds an action set to a recurrence and a set of target accounts
///
/// The next fire time is computed lazily from the calendar and cached;
/// any calendar change goes through [`ActionTiming::set_calendar`] so the
/// cache is invalidated with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionTiming {
    pub uuid: Uuid,

    calendar: CalendarSpec,

    /// Scheduling priority among timings due at the same instant; higher
    /// weight fires first
    #[serde(default)]
    pub weight: f64,

    /// Action set executed at each occurrence
    pub actions_id: String,

    /// Target account ids
    #[serde(default)]
    pub account_ids: Vec<String>,

    #[serde(skip)]
    cached_next_run: Option<DateTime<Utc>>,
}

impl ActionTiming {
    pub fn new(calendar: CalendarSpec, weight: f64, actions_id: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            calendar,
            weight,
            actions_id: actions_id.into(),
            account_ids: Vec::new(),
            cached_next_run: None,
        }
    }

    pub fn calendar(&self) -> &CalendarSpec {
        &self.calendar
    }

    /// Replace the calendar and drop the cached fire time
    pub fn set_calendar(&mut self, calendar: CalendarSpec) {
        self.calendar = calendar;
        self.cached_next_run = None;
    }

    /// Next fire time strictly after `now`, cached until invalidated
    ///
    /// The cached value is reused only while it still lies in the future
    /// relative to `now`.
    pub fn next_run(&mut self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if let Some(cached) = self.cached_next_run {
            if cached > now {
                return Some(cached);
            }
        }
        let next = self.calendar.next_occurrence(now);
        self.cached_next_run = next;
        next
    }

    /// Drop the cached fire time so the next call recomputes it
    pub fn invalidate_next_run(&mut self) {
        self.cached_next_run = None;
    }

    /// Cached fire time, if one has been computed
    pub fn scheduled_at(&self) -> Option<DateTime<Utc>> {
        self.cached_next_run
    }
}

/// Threshold direction and subject for an action trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThresholdType {
    /// Fires when the matching balance total falls to or below the value
    #[serde(rename = "*min_balance")]
    MinBalance,

    /// Fires when the matching balance total rises to or above the value
    #[serde(rename = "*max_balance")]
    MaxBalance,

    /// Fires when the event counter for the balance type falls to or
    /// below the value
    #[serde(rename = "*min_event_counter")]
    MinEventCounter,

    /// Fires when the event counter for the balance type rises to or
    /// above the value
    #[serde(rename = "*max_event_counter")]
    MaxEventCounter,

    /// Fires when any matching balance has expired
    #[serde(rename = "*balance_expired")]
    BalanceExpired,
}

/// Fires an action set when an account balance crosses a threshold
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionTrigger {
    pub id: String,

    /// Stable identity used in fired-trigger events; distinct from `id`
    /// so operators can rename triggers without breaking correlation
    pub unique_id: String,

    pub threshold_type: ThresholdType,
    pub threshold_value: Decimal,

    /// A recurrent trigger re-arms after firing; a one-shot trigger stays
    /// executed until reset
    #[serde(default)]
    pub recurrent: bool,

    /// Minimum seconds between consecutive firings of a recurrent trigger
    #[serde(default)]
    pub min_sleep_secs: i64,

    /// Trigger is inert before this instant
    #[serde(default)]
    pub activation_date: Option<DateTime<Utc>>,

    /// Trigger is inert at and after this instant
    #[serde(default)]
    pub expiration_date: Option<DateTime<Utc>>,

    /// Balances the threshold is evaluated against
    #[serde(default)]
    pub balance_filter: BalanceFilter,

    /// Action set executed when the trigger fires
    pub actions_id: String,

    #[serde(default)]
    pub executed: bool,

    #[serde(default)]
    pub last_execution_time: Option<DateTime<Utc>>,
}

impl ActionTrigger {
    /// Whether the trigger is inside its activation window at `now`
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        if let Some(activation) = self.activation_date {
            if now < activation {
                return false;
            }
        }
        if let Some(expiration) = self.expiration_date {
            if now >= expiration {
                return false;
            }
        }
        true
    }

    /// Whether a recurrent trigger is still inside its debounce window
    pub fn in_sleep(&self, now: DateTime<Utc>) -> bool {
        if self.min_sleep_secs <= 0 {
            return false;
        }
        match self.last_execution_time {
            Some(last) => (now - last).num_seconds() < self.min_sleep_secs,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::account::{Account, Balance, BALANCE_MONETARY};
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn utc(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_action_filter_grammar() {
        let mut account = Account::new("1001");
        account.balances.insert(
            BALANCE_MONETARY.to_string(),
            vec![Balance {
                value: dec!(5),
                ..Default::default()
            }],
        );

        let mut action = Action::default();
        assert!(action.applies_to(&account));

        action.filter = FILTER_ENABLED.to_string();
        assert!(action.applies_to(&account));
        account.disabled = true;
        assert!(!action.applies_to(&account));

        action.filter = FILTER_DISABLED.to_string();
        assert!(action.applies_to(&account));

        action.filter = "*has_balance:*monetary".to_string();
        assert!(action.applies_to(&account));
        action.filter = "*has_balance:*voice".to_string();
        assert!(!action.applies_to(&account));

        // unknown expressions fail closed
        action.filter = "*bogus".to_string();
        assert!(!action.applies_to(&account));
    }

    #[test]
    fn test_sort_actions_stable_weight_desc() {
        let mut actions = vec![
            Action {
                id: "a".to_string(),
                weight: 5.0,
                ..Default::default()
            },
            Action {
                id: "b".to_string(),
                weight: 20.0,
                ..Default::default()
            },
            Action {
                id: "c".to_string(),
                weight: 5.0,
                ..Default::default()
            },
        ];
        sort_actions_by_weight(&mut actions);
        let ids: Vec<&str> = actions.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_timing_caches_next_run() {
        let spec = CalendarSpec {
            start_time: "09:00:00".to_string(),
            ..Default::default()
        };
        let mut timing = ActionTiming::new(spec, 10.0, "TOPUP_SET");
        let now = utc(2024, 1, 2, 8);
        let first = timing.next_run(now).unwrap();
        assert_eq!(first, utc(2024, 1, 2, 9));
        assert_eq!(timing.scheduled_at(), Some(first));

        // cached value survives repeat queries before the fire time
        assert_eq!(timing.next_run(utc(2024, 1, 2, 8)), Some(first));
        // once passed, the next occurrence is recomputed
        assert_eq!(timing.next_run(first), Some(utc(2024, 1, 3, 9)));
    }

    #[test]
    fn test_set_calendar_invalidates_cache() {
        let mut timing = ActionTiming::new(
            CalendarSpec {
                start_time: "09:00:00".to_string(),
                ..Default::default()
            },
            10.0,
            "SET",
        );
        let now = utc(2024, 1, 2, 8);
        timing.next_run(now);
        timing.set_calendar(CalendarSpec {
            start_time: "15:00:00".to_string(),
            ..Default::default()
        });
        assert_eq!(timing.scheduled_at(), None);
        assert_eq!(timing.next_run(now), Some(utc(2024, 1, 2, 15)));
    }

    #[test]
    fn test_trigger_activation_window() {
        let now = utc(2024, 6, 1, 12);
        let mut trigger = ActionTrigger {
            id: "low".to_string(),
            unique_id: "low-1".to_string(),
            threshold_type: ThresholdType::MinBalance,
            threshold_value: dec!(2),
            recurrent: false,
            min_sleep_secs: 0,
            activation_date: None,
            expiration_date: None,
            balance_filter: BalanceFilter::for_type(BALANCE_MONETARY),
            actions_id: "WARN".to_string(),
            executed: false,
            last_execution_time: None,
        };
        assert!(trigger.is_active_at(now));

        trigger.activation_date = Some(now + Duration::days(1));
        assert!(!trigger.is_active_at(now));

        trigger.activation_date = None;
        trigger.expiration_date = Some(now);
        assert!(!trigger.is_active_at(now));
    }

    #[test]
    fn test_trigger_sleep_window() {
        let now = utc(2024, 6, 1, 12);
        let mut trigger = ActionTrigger {
            id: "low".to_string(),
            unique_id: "low-1".to_string(),
            threshold_type: ThresholdType::MinBalance,
            threshold_value: dec!(2),
            recurrent: true,
            min_sleep_secs: 300,
            activation_date: None,
            expiration_date: None,
            balance_filter: BalanceFilter::for_type(BALANCE_MONETARY),
            actions_id: "WARN".to_string(),
            executed: false,
            last_execution_time: Some(now - Duration::seconds(60)),
        };
        assert!(trigger.in_sleep(now));

        trigger.last_execution_time = Some(now - Duration::seconds(301));
        assert!(!trigger.in_sleep(now));

        trigger.last_execution_time = None;
        assert!(!trigger.in_sleep(now));
    }
}
