//! In-memory store implementations
//!
//! Tariff data is read-mostly: plans and profiles are held behind `Arc` so
//! lookups hand out cheap shared snapshots. Account data is mutable and
//! cloned on read, so callers work on private copies and commit whole
//! accounts back.

use async_trait::async_trait;
use cobro_core::models::{Account, Action, RatingPlan, RatingProfile, SharedGroup};
use cobro_core::traits::{AccountStore, TariffStore};
use cobro_core::AppResult;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// In-memory rating plan and profile store
#[derive(Default)]
pub struct MemoryTariffStore {
    plans: RwLock<HashMap<String, Arc<RatingPlan>>>,
    profiles: RwLock<HashMap<String, Arc<RatingProfile>>>,
}

impl MemoryTariffStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_rating_plan(&self, plan: RatingPlan) {
        self.plans.write().insert(plan.id.clone(), Arc::new(plan));
    }

    pub fn set_rating_profile(&self, profile: RatingProfile) {
        self.profiles
            .write()
            .insert(profile.key.clone(), Arc::new(profile));
    }

    pub fn rating_plan_ids(&self) -> Vec<String> {
        self.plans.read().keys().cloned().collect()
    }
}

impl TariffStore for MemoryTariffStore {
    fn rating_plan(&self, id: &str) -> Option<Arc<RatingPlan>> {
        self.plans.read().get(id).cloned()
    }

    fn rating_profile(&self, key: &str) -> Option<Arc<RatingProfile>> {
        self.profiles.read().get(key).cloned()
    }
}

/// In-memory account, action set and shared group store
#[derive(Default)]
pub struct MemoryAccountStore {
    accounts: RwLock<HashMap<String, Account>>,
    action_sets: RwLock<HashMap<String, Vec<Action>>>,
    shared_groups: RwLock<HashMap<String, SharedGroup>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_action_set(&self, id: impl Into<String>, actions: Vec<Action>) {
        self.action_sets.write().insert(id.into(), actions);
    }

    pub fn set_shared_group(&self, group: SharedGroup) {
        self.shared_groups.write().insert(group.id.clone(), group);
    }

    pub fn account_ids(&self) -> Vec<String> {
        self.accounts.read().keys().cloned().collect()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn account(&self, id: &str) -> AppResult<Option<Account>> {
        Ok(self.accounts.read().get(id).cloned())
    }

    async fn set_account(&self, account: Account) -> AppResult<()> {
        self.accounts.write().insert(account.id.clone(), account);
        Ok(())
    }

    async fn remove_account(&self, id: &str) -> AppResult<()> {
        self.accounts.write().remove(id);
        Ok(())
    }

    async fn action_set(&self, id: &str) -> AppResult<Option<Vec<Action>>> {
        Ok(self.action_sets.read().get(id).cloned())
    }

    async fn shared_group(&self, id: &str) -> AppResult<Option<SharedGroup>> {
        Ok(self.shared_groups.read().get(id).cloned())
    }
}
