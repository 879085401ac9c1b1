//! Shared balance groups
//!
//! A [`SharedGroup`] pools balances across member accounts. Each member
//! (or the `*any` wildcard) is assigned a [`SharingStrategy`] that orders
//! the pooled balances when that member debits from the pool.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Wildcard member key carrying the group default strategy
pub const ANY_MEMBER: &str = "*any";

/// Consumption ordering over a shared balance pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SharingStrategy {
    /// Smallest balance value first
    #[serde(rename = "*lowest")]
    Lowest,

    /// Largest balance value first
    #[serde(rename = "*highest")]
    Highest,

    /// Uniform random order
    #[serde(rename = "*random")]
    Random,

    /// Requester's own balances first, then the rest by smallest value
    #[serde(rename = "*mine_lowest")]
    MineLowest,

    /// Requester's own balances first, then the rest by largest value
    #[serde(rename = "*mine_highest")]
    MineHighest,

    /// Requester's own balances first, then the rest in random order
    #[default]
    #[serde(rename = "*mine_random")]
    MineRandom,
}

impl SharingStrategy {
    /// Parse a strategy token; unrecognized tokens fall back to the
    /// default `*mine_random`
    pub fn from_str(s: &str) -> Self {
        match s {
            "*lowest" => SharingStrategy::Lowest,
            "*highest" => SharingStrategy::Highest,
            "*random" => SharingStrategy::Random,
            "*mine_lowest" => SharingStrategy::MineLowest,
            "*mine_highest" => SharingStrategy::MineHighest,
            "*mine_random" => SharingStrategy::MineRandom,
            other => {
                tracing::warn!(strategy = other, "unknown sharing strategy, using *mine_random");
                SharingStrategy::MineRandom
            }
        }
    }

    /// Whether the requester's own balances are moved to the front
    pub fn is_mine_first(&self) -> bool {
        matches!(
            self,
            SharingStrategy::MineLowest
                | SharingStrategy::MineHighest
                | SharingStrategy::MineRandom
        )
    }
}

/// A balance pool shared across member accounts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SharedGroup {
    pub id: String,

    /// Accounts whose tagged balances participate in the pool
    #[serde(default)]
    pub member_ids: Vec<String>,

    /// Member id (or `*any`) -> sharing strategy
    #[serde(default)]
    pub strategies: HashMap<String, SharingStrategy>,
}

impl SharedGroup {
    /// Strategy for a member: exact entry, then the `*any` entry, then
    /// the default
    pub fn strategy_for(&self, member_id: &str) -> SharingStrategy {
        self.strategies
            .get(member_id)
            .or_else(|| self.strategies.get(ANY_MEMBER))
            .copied()
            .unwrap_or_default()
    }
}
