//! JSON bootstrap loading
//!
//! A bootstrap document seeds the in-memory stores at startup with rating
//! plans, profiles, accounts, action sets, shared groups and the scheduled
//! timings to arm.

use crate::memory::{MemoryAccountStore, MemoryTariffStore};
use cobro_core::models::{
    Account, Action, ActionTiming, CalendarSpec, RatingPlan, RatingProfile, SharedGroup,
};
use cobro_core::traits::AccountStore;
use cobro_core::AppResult;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// Declarative form of an [`ActionTiming`]; the uuid and fire-time cache
/// are created when the timing is armed
#[derive(Debug, Clone, Deserialize)]
pub struct TimingSpec {
    #[serde(default)]
    pub calendar: CalendarSpec,

    #[serde(default)]
    pub weight: f64,

    pub actions_id: String,

    #[serde(default)]
    pub account_ids: Vec<String>,
}

impl TimingSpec {
    pub fn into_timing(self) -> ActionTiming {
        let mut timing = ActionTiming::new(self.calendar, self.weight, self.actions_id);
        timing.account_ids = self.account_ids;
        timing
    }
}

/// Root of a bootstrap document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BootstrapData {
    #[serde(default)]
    pub rating_plans: Vec<RatingPlan>,

    #[serde(default)]
    pub rating_profiles: Vec<RatingProfile>,

    #[serde(default)]
    pub accounts: Vec<Account>,

    #[serde(default)]
    pub action_sets: HashMap<String, Vec<Action>>,

    #[serde(default)]
    pub shared_groups: Vec<SharedGroup>,

    #[serde(default)]
    pub action_timings: Vec<TimingSpec>,
}

/// Read and parse a bootstrap document
pub fn load(path: impl AsRef<Path>) -> AppResult<BootstrapData> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Seed the stores from a bootstrap document; returns the timings to arm
pub async fn apply(
    data: BootstrapData,
    tariffs: &MemoryTariffStore,
    accounts: &MemoryAccountStore,
) -> AppResult<Vec<ActionTiming>> {
    info!(
        rating_plans = data.rating_plans.len(),
        rating_profiles = data.rating_profiles.len(),
        accounts = data.accounts.len(),
        action_sets = data.action_sets.len(),
        shared_groups = data.shared_groups.len(),
        action_timings = data.action_timings.len(),
        "applying bootstrap data"
    );
    for plan in data.rating_plans {
        tariffs.set_rating_plan(plan);
    }
    for profile in data.rating_profiles {
        tariffs.set_rating_profile(profile);
    }
    for mut account in data.accounts {
        account.sort_balances();
        accounts.set_account(account).await?;
    }
    for (id, actions) in data.action_sets {
        accounts.set_action_set(id, actions);
    }
    for group in data.shared_groups {
        accounts.set_shared_group(group);
    }
    Ok(data
        .action_timings
        .into_iter()
        .map(TimingSpec::into_timing)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cobro_core::models::BALANCE_MONETARY;
    use cobro_core::traits::TariffStore;
    use rust_decimal_macros::dec;

    const DOC: &str = r#"{
        "rating_plans": [
            {"id": "RP_NAT", "destination_rates": {"51": [
                {"calendar": {}, "weight": 10.0, "slots": [
                    {"start_offset_secs": 0, "unit_price": "0.10",
                     "rate_unit_secs": 60, "rate_increment_secs": 6}
                ]}
            ]}}
        ],
        "rating_profiles": [
            {"key": "cgrates.org:call:1001", "activations": [
                {"activation_time": "2024-01-01T00:00:00Z", "rating_plan_id": "RP_NAT"}
            ]}
        ],
        "accounts": [
            {"id": "1001", "balances": {"*monetary": [
                {"uuid": "5f0c1c74-3b3f-4cb5-9e09-5f2f0e6f8a01", "id": "main",
                 "value": "10", "weight": 10.0, "expiration_date": null}
            ]}}
        ],
        "action_sets": {
            "TOPUP_SET": [
                {"id": "monthly", "action_type": "*topup",
                 "balance_filter": {"balance_type": "*monetary"},
                 "units": "5", "weight": 10.0}
            ]
        },
        "action_timings": [
            {"calendar": {"month_days": [1], "start_time": "00:00:00"},
             "weight": 10.0, "actions_id": "TOPUP_SET", "account_ids": ["1001"]}
        ]
    }"#;

    #[tokio::test]
    async fn test_apply_seeds_stores() {
        let data: BootstrapData = serde_json::from_str(DOC).unwrap();
        let tariffs = MemoryTariffStore::new();
        let accounts = MemoryAccountStore::new();
        let timings = apply(data, &tariffs, &accounts).await.unwrap();

        assert!(tariffs.rating_plan("RP_NAT").is_some());
        assert!(tariffs.rating_profile("cgrates.org:call:1001").is_some());

        let account = accounts.account("1001").await.unwrap().unwrap();
        assert_eq!(account.balances_of(BALANCE_MONETARY)[0].value, dec!(10));

        let set = accounts.action_set("TOPUP_SET").await.unwrap().unwrap();
        assert_eq!(set[0].action_type, "*topup");

        assert_eq!(timings.len(), 1);
        assert_eq!(timings[0].actions_id, "TOPUP_SET");
        assert_eq!(timings[0].account_ids, vec!["1001"]);
    }

    #[test]
    fn test_malformed_document_is_a_serialization_error() {
        let err = serde_json::from_str::<BootstrapData>("{\"accounts\": 42}").unwrap_err();
        let app: cobro_core::AppError = err.into();
        assert_eq!(app.error_code(), "serialization_error");
    }
}
