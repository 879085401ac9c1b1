//! Shared balance pooling
//!
//! [`SharedBalancePool`] assembles the debit candidates for a shared
//! group: every unexpired balance tagged with the group across its member
//! accounts, ordered by the sharing strategy configured for the
//! requesting member.

use chrono::{DateTime, Utc};
use cobro_core::error::AppError;
use cobro_core::models::{Balance, BalanceFilter, SharedGroup, SharingStrategy};
use cobro_core::traits::AccountStore;
use cobro_core::AppResult;
use rand::seq::SliceRandom;
use std::sync::Arc;
use tracing::{instrument, warn};

/// A pooled balance together with the account owning it
#[derive(Debug, Clone)]
pub struct PooledBalance {
    pub account_id: String,
    pub balance: Balance,
}

/// Collects and orders shared-group balances
pub struct SharedBalancePool<S: AccountStore> {
    store: Arc<S>,
}

impl<S: AccountStore> SharedBalancePool<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Debit candidates for `requester`, ordered by the member's strategy
    ///
    /// Membership is read at call time; members missing or disabled are
    /// skipped with a warning. Only balances explicitly tagged with the
    /// group participate.
    #[instrument(skip(self, filter), fields(group = %group_id, requester))]
    pub async fn ordered_balances(
        &self,
        group_id: &str,
        requester: &str,
        filter: &BalanceFilter,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<PooledBalance>> {
        let group = self
            .store
            .shared_group(group_id)
            .await?
            .ok_or_else(|| AppError::SharedGroupNotFound(group_id.to_string()))?;
        let mut pool = self.collect(&group, filter, now).await?;
        select_order(group.strategy_for(requester), &mut pool, requester);
        Ok(pool)
    }

    async fn collect(
        &self,
        group: &SharedGroup,
        filter: &BalanceFilter,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<PooledBalance>> {
        let mut pool = Vec::new();
        for member_id in &group.member_ids {
            let Some(account) = self.store.account(member_id).await? else {
                warn!(member = %member_id, group = %group.id, "shared group member missing");
                continue;
            };
            if account.disabled {
                warn!(member = %member_id, group = %group.id, "shared group member disabled");
                continue;
            }
            for balance in account.balances_of(&filter.balance_type) {
                if balance.is_expired(now) {
                    continue;
                }
                if !balance.shared_group_ids.contains(&group.id) {
                    continue;
                }
                if !filter.matches(balance) {
                    continue;
                }
                pool.push(PooledBalance {
                    account_id: member_id.clone(),
                    balance: balance.clone(),
                });
            }
        }
        Ok(pool)
    }
}

/// Order a pool in place according to the strategy
pub fn select_order(strategy: SharingStrategy, pool: &mut Vec<PooledBalance>, requester: &str) {
    match strategy {
        SharingStrategy::Lowest | SharingStrategy::MineLowest => {
            pool.sort_by(|a, b| a.balance.value.cmp(&b.balance.value));
        }
        SharingStrategy::Highest | SharingStrategy::MineHighest => {
            pool.sort_by(|a, b| b.balance.value.cmp(&a.balance.value));
        }
        SharingStrategy::Random | SharingStrategy::MineRandom => {
            pool.shuffle(&mut rand::thread_rng());
        }
    }
    if strategy.is_mine_first() {
        // stable partition keeps the base ordering within each half
        pool.sort_by_key(|p| p.account_id != requester);
    }
}
