//! Storage and observer traits
//!
//! Seams between the engine and its backing stores. Tariff data is
//! read-mostly and served synchronously from shared snapshots; account
//! data goes through an async store so a persistent backend can sit behind
//! the same trait.

use crate::models::{Account, Action, RatingPlan, RatingProfile, SharedGroup};
use crate::AppResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Read access to rating plans and profiles
pub trait TariffStore: Send + Sync {
    fn rating_plan(&self, id: &str) -> Option<Arc<RatingPlan>>;

    /// Profile by its "tenant:category:subject" key
    fn rating_profile(&self, key: &str) -> Option<Arc<RatingProfile>>;
}

/// Read/write access to accounts, action sets and shared groups
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn account(&self, id: &str) -> AppResult<Option<Account>>;

    async fn set_account(&self, account: Account) -> AppResult<()>;

    async fn remove_account(&self, id: &str) -> AppResult<()>;

    /// Named ordered action set
    async fn action_set(&self, id: &str) -> AppResult<Option<Vec<Action>>>;

    async fn shared_group(&self, id: &str) -> AppResult<Option<SharedGroup>>;
}

/// Event name carried by every fired-trigger notification
pub const ACTION_TRIGGER_FIRED: &str = "ACTION_TRIGGER_FIRED";

/// Notification emitted after a trigger fires and its action set commits
#[derive(Debug, Clone, Serialize)]
pub struct TriggerFiredEvent {
    /// Always [`ACTION_TRIGGER_FIRED`]
    pub event_name: &'static str,

    /// Stable trigger identity for correlation
    pub unique_id: String,

    pub id: String,

    pub action_set_id: String,
}

/// Consumer of engine notifications
pub trait EventSink: Send + Sync {
    fn trigger_fired(&self, event: &TriggerFiredEvent);
}

/// Which engine path executed an action set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionSource {
    Scheduler,
    Trigger,
}

impl fmt::Display for ExecutionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionSource::Scheduler => write!(f, "scheduler"),
            ExecutionSource::Trigger => write!(f, "trigger"),
        }
    }
}

/// One committed action-set execution against one account
#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub source: ExecutionSource,

    /// Timing uuid or trigger unique id, depending on the source
    pub entity_id: String,

    pub actions_id: String,

    pub account_id: String,

    pub at: DateTime<Utc>,
}

/// Consumer of execution audit records
pub trait AuditSink: Send + Sync {
    fn record(&self, record: &AuditRecord);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_source_display() {
        assert_eq!(ExecutionSource::Scheduler.to_string(), "scheduler");
        assert_eq!(ExecutionSource::Trigger.to_string(), "trigger");
    }

    #[test]
    fn test_trigger_event_serializes() {
        let event = TriggerFiredEvent {
            event_name: ACTION_TRIGGER_FIRED,
            unique_id: "low-1".to_string(),
            id: "low".to_string(),
            action_set_id: "WARN".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_name"], "ACTION_TRIGGER_FIRED");
        assert_eq!(json["action_set_id"], "WARN");
    }
}
