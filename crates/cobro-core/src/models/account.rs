//! Accounts and balances
//!
//! An [`Account`] owns typed balance lists and the action triggers attached
//! to it. Balance consumption order is always a deterministic sort by
//! weight descending with a stable secondary order.

use crate::models::action::ActionTrigger;
use crate::models::rate::normalize_destination;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use uuid::Uuid;

/// Monetary balance type
pub const BALANCE_MONETARY: &str = "*monetary";

/// Voice-minutes balance type
pub const BALANCE_VOICE: &str = "*voice";

/// A single consumable unit pool within an account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balance {
    /// Unique, immutable identity
    pub uuid: Uuid,

    /// Operator-assigned identifier (not necessarily unique)
    pub id: String,

    pub value: Decimal,

    /// Consumption priority; higher weight is consumed first
    pub weight: f64,

    pub expiration_date: Option<DateTime<Utc>>,

    /// Shared group pools this balance participates in
    #[serde(default)]
    pub shared_group_ids: Vec<String>,

    /// Destination prefixes this balance is restricted to (empty = any)
    #[serde(default)]
    pub destination_prefixes: Vec<String>,

    /// Subject used when rating consumption from this balance
    #[serde(default)]
    pub rating_subject: String,
}

impl Balance {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date.map_or(false, |exp| exp <= now)
    }

    /// Whether this balance may serve the given destination
    pub fn matches_destination(&self, destination: &str) -> bool {
        if self.destination_prefixes.is_empty() {
            return true;
        }
        let normalized = normalize_destination(destination);
        self.destination_prefixes
            .iter()
            .any(|p| normalized.starts_with(p.as_str()))
    }
}

impl Default for Balance {
    fn default() -> Self {
        Self {
            uuid: Uuid::new_v4(),
            id: String::new(),
            value: Decimal::ZERO,
            weight: 0.0,
            expiration_date: None,
            shared_group_ids: Vec::new(),
            destination_prefixes: Vec::new(),
            rating_subject: String::new(),
        }
    }
}

/// Selector for the balances an action or debit applies to
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BalanceFilter {
    /// Balance type the filter addresses (e.g. `*monetary`)
    pub balance_type: String,

    /// Restrict to a specific balance id
    #[serde(default)]
    pub balance_id: Option<String>,

    /// Restrict to balances serving this destination prefix
    #[serde(default)]
    pub destination_prefix: Option<String>,

    /// Restrict to balances in this shared group
    #[serde(default)]
    pub shared_group: Option<String>,

    /// Expiration applied by top-up actions (resolved from the action's
    /// expiration string at fire time)
    #[serde(default)]
    pub expiration_date: Option<DateTime<Utc>>,
}

impl BalanceFilter {
    pub fn for_type(balance_type: impl Into<String>) -> Self {
        Self {
            balance_type: balance_type.into(),
            ..Default::default()
        }
    }

    /// Whether a balance passes the id / destination / shared-group parts
    /// of the filter (the type is matched by the owning list)
    pub fn matches(&self, balance: &Balance) -> bool {
        if let Some(id) = &self.balance_id {
            if &balance.id != id {
                return false;
            }
        }
        if let Some(prefix) = &self.destination_prefix {
            if !balance.matches_destination(prefix) {
                return false;
            }
        }
        if let Some(group) = &self.shared_group {
            if !balance.shared_group_ids.contains(group) {
                return false;
            }
        }
        true
    }
}

/// Customer account: typed balance lists plus attached action triggers
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Account {
    pub id: String,

    /// Balance type -> balances, consumed in weight-descending order
    #[serde(default)]
    pub balances: HashMap<String, Vec<Balance>>,

    #[serde(default)]
    pub action_triggers: Vec<ActionTrigger>,

    #[serde(default)]
    pub disabled: bool,
}

impl Account {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Balances of one type; empty when the type is absent
    pub fn balances_of(&self, balance_type: &str) -> &[Balance] {
        self.balances
            .get(balance_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Sort every balance list into consumption order: weight descending,
    /// equal weights keep their existing relative order
    pub fn sort_balances(&mut self) {
        for list in self.balances.values_mut() {
            list.sort_by(|a, b| {
                b.weight
                    .partial_cmp(&a.weight)
                    .unwrap_or(Ordering::Equal)
            });
        }
    }

    /// Sum of unexpired balances matching the filter
    pub fn balance_total(&self, filter: &BalanceFilter, now: DateTime<Utc>) -> Decimal {
        self.balances_of(&filter.balance_type)
            .iter()
            .filter(|b| !b.is_expired(now) && filter.matches(b))
            .map(|b| b.value)
            .sum()
    }

    /// First unexpired balance matching the filter, creating one when none
    /// exists
    pub fn balance_mut_or_create(&mut self, filter: &BalanceFilter) -> &mut Balance {
        self.sort_balances();
        let list = self
            .balances
            .entry(filter.balance_type.clone())
            .or_default();
        let pos = list.iter().position(|b| filter.matches(b));
        match pos {
            Some(idx) => &mut list[idx],
            None => {
                list.push(Balance {
                    id: filter.balance_id.clone().unwrap_or_default(),
                    shared_group_ids: filter.shared_group.clone().into_iter().collect(),
                    ..Default::default()
                });
                let last = list.len() - 1;
                &mut list[last]
            }
        }
    }

    /// Debit `units` across matching balances in consumption order
    ///
    /// When the matching pool runs dry the remainder is taken from the
    /// first matching balance (created if necessary), which may go
    /// negative.
    pub fn debit(&mut self, filter: &BalanceFilter, units: Decimal, now: DateTime<Utc>) {
        self.sort_balances();
        let mut remaining = units;
        if let Some(list) = self.balances.get_mut(&filter.balance_type) {
            for balance in list
                .iter_mut()
                .filter(|b| !b.is_expired(now) && filter.matches(b))
            {
                if remaining <= Decimal::ZERO {
                    return;
                }
                let take = balance.value.min(remaining).max(Decimal::ZERO);
                balance.value -= take;
                remaining -= take;
            }
        }
        if remaining > Decimal::ZERO {
            let balance = self.balance_mut_or_create(filter);
            balance.value -= remaining;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn balance(id: &str, value: Decimal, weight: f64) -> Balance {
        Balance {
            id: id.to_string(),
            value,
            weight,
            ..Default::default()
        }
    }

    #[test]
    fn test_sort_balances_weight_desc_stable() {
        let mut account = Account::new("1001");
        account.balances.insert(
            BALANCE_MONETARY.to_string(),
            vec![
                balance("a", dec!(1), 5.0),
                balance("b", dec!(2), 20.0),
                balance("c", dec!(3), 5.0),
            ],
        );
        account.sort_balances();
        let ids: Vec<&str> = account.balances_of(BALANCE_MONETARY)
            .iter()
            .map(|b| b.id.as_str())
            .collect();
        // equal weights keep insertion order
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_debit_consumes_in_weight_order() {
        let mut account = Account::new("1001");
        account.balances.insert(
            BALANCE_MONETARY.to_string(),
            vec![
                balance("low", dec!(5), 1.0),
                balance("high", dec!(3), 10.0),
            ],
        );
        account.debit(&BalanceFilter::for_type(BALANCE_MONETARY), dec!(4), Utc::now());

        let list = account.balances_of(BALANCE_MONETARY);
        let high = list.iter().find(|b| b.id == "high").unwrap();
        let low = list.iter().find(|b| b.id == "low").unwrap();
        assert_eq!(high.value, dec!(0));
        assert_eq!(low.value, dec!(4));
    }

    #[test]
    fn test_debit_beyond_pool_goes_negative() {
        let mut account = Account::new("1001");
        account.balances.insert(
            BALANCE_MONETARY.to_string(),
            vec![balance("only", dec!(2), 1.0)],
        );
        account.debit(&BalanceFilter::for_type(BALANCE_MONETARY), dec!(5), Utc::now());
        let only = &account.balances_of(BALANCE_MONETARY)[0];
        assert_eq!(only.value, dec!(-3));
    }

    #[test]
    fn test_balance_total_skips_expired() {
        let now = Utc::now();
        let mut expired = balance("old", dec!(10), 1.0);
        expired.expiration_date = Some(now - chrono::Duration::hours(1));
        let mut account = Account::new("1001");
        account.balances.insert(
            BALANCE_MONETARY.to_string(),
            vec![expired, balance("fresh", dec!(4), 1.0)],
        );
        assert_eq!(
            account.balance_total(&BalanceFilter::for_type(BALANCE_MONETARY), now),
            dec!(4)
        );
    }

    #[test]
    fn test_balance_destination_match() {
        let mut b = balance("dest", dec!(1), 1.0);
        b.destination_prefixes = vec!["51".to_string()];
        assert!(b.matches_destination("51999888777"));
        assert!(!b.matches_destination("44207"));

        let open = balance("open", dec!(1), 1.0);
        assert!(open.matches_destination("anything"));
    }

    #[test]
    fn test_balance_mut_or_create() {
        let mut account = Account::new("1001");
        let filter = BalanceFilter {
            balance_type: BALANCE_MONETARY.to_string(),
            balance_id: Some("bonus".to_string()),
            ..Default::default()
        };
        account.balance_mut_or_create(&filter).value = dec!(7);
        assert_eq!(account.balances_of(BALANCE_MONETARY).len(), 1);
        assert_eq!(account.balances_of(BALANCE_MONETARY)[0].id, "bonus");
        // second call finds the same balance
        account.balance_mut_or_create(&filter).value += dec!(1);
        assert_eq!(account.balances_of(BALANCE_MONETARY)[0].value, dec!(8));
    }
}
