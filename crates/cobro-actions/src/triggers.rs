//! Balance threshold triggers
//!
//! [`TriggerEvaluator`] re-checks an account's triggers after a balance
//! event. Each firing runs its action set transactionally on a scratch
//! copy of the account: on failure the account keeps its prior balances
//! and the trigger is re-armed.

use crate::guardian::Guardian;
use crate::registry::{apply_actions, prepare_actions, ActionOutcome, ActionRegistry};
use chrono::{DateTime, Utc};
use cobro_core::error::AppError;
use cobro_core::models::{Account, ActionTrigger, ThresholdType};
use cobro_core::traits::{
    AccountStore, AuditRecord, AuditSink, EventSink, ExecutionSource, TriggerFiredEvent,
    ACTION_TRIGGER_FIRED,
};
use cobro_core::AppResult;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Usage counters accompanying a balance event, keyed by balance type
#[derive(Debug, Clone, Default)]
pub struct StatsContext {
    counters: HashMap<String, Decimal>,
}

impl StatsContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, balance_type: impl Into<String>, units: Decimal) {
        *self.counters.entry(balance_type.into()).or_default() += units;
    }

    pub fn counter(&self, balance_type: &str) -> Decimal {
        self.counters
            .get(balance_type)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }
}

enum TriggerCheck {
    Fired,
    Skipped,
    /// Account deleted by the action set; evaluation stops
    Removed,
}

/// Evaluates account triggers after balance events
pub struct TriggerEvaluator<S: AccountStore> {
    store: Arc<S>,
    registry: Arc<ActionRegistry>,
    guardian: Arc<Guardian>,
    events: Arc<dyn EventSink>,
    audit: Arc<dyn AuditSink>,
    guard_timeout: Duration,
}

impl<S: AccountStore> TriggerEvaluator<S> {
    pub fn new(
        store: Arc<S>,
        registry: Arc<ActionRegistry>,
        guardian: Arc<Guardian>,
        events: Arc<dyn EventSink>,
        audit: Arc<dyn AuditSink>,
        guard_timeout: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            guardian,
            events,
            audit,
            guard_timeout,
        }
    }

    /// Re-check every trigger on the account; returns how many fired
    ///
    /// Runs under the account guard so it cannot interleave with a
    /// scheduled action on the same account. Trigger state changes are
    /// persisted even when an action set fails, so a failed one-shot
    /// trigger stays armed.
    #[instrument(skip(self, stats), fields(account = %account_id))]
    pub async fn on_account_event(
        &self,
        account_id: &str,
        stats: &StatsContext,
        now: DateTime<Utc>,
    ) -> AppResult<usize> {
        self.guardian
            .guard_timed(account_id, self.guard_timeout, || async {
                let Some(mut account) = self.store.account(account_id).await? else {
                    return Err(AppError::AccountNotFound(account_id.to_string()));
                };
                if account.disabled {
                    return Err(AppError::AccountDisabled(account_id.to_string()));
                }

                let mut fired = 0;
                for idx in 0..account.action_triggers.len() {
                    match self.evaluate(&mut account, idx, stats, now).await {
                        Ok(TriggerCheck::Fired) => fired += 1,
                        Ok(TriggerCheck::Skipped) => {}
                        Ok(TriggerCheck::Removed) => return Ok(fired + 1),
                        Err(e) => {
                            // keep the re-armed trigger state
                            self.store.set_account(account).await?;
                            return Err(e);
                        }
                    }
                }
                self.store.set_account(account).await?;
                Ok(fired)
            })
            .await
    }

    async fn evaluate(
        &self,
        account: &mut Account,
        idx: usize,
        stats: &StatsContext,
        now: DateTime<Utc>,
    ) -> AppResult<TriggerCheck> {
        let trigger = account.action_triggers[idx].clone();
        if !trigger.is_active_at(now) {
            return Ok(TriggerCheck::Skipped);
        }
        if trigger.executed && !trigger.recurrent {
            return Ok(TriggerCheck::Skipped);
        }
        if trigger.in_sleep(now) {
            debug!(trigger = %trigger.id, "trigger in sleep window");
            return Ok(TriggerCheck::Skipped);
        }
        if !threshold_reached(account, &trigger, stats, now) {
            return Ok(TriggerCheck::Skipped);
        }

        // mark before running so a reentrant evaluation cannot double-fire
        {
            let state = &mut account.action_triggers[idx];
            state.executed = true;
            state.last_execution_time = Some(now);
        }

        let mut actions = match self.store.action_set(&trigger.actions_id).await {
            Ok(Some(actions)) => actions,
            Ok(None) => {
                let e = AppError::ActionSetNotFound(trigger.actions_id.clone());
                return Err(self.rearm(account, idx, e));
            }
            Err(e) => return Err(self.rearm(account, idx, e)),
        };
        if let Err(e) = prepare_actions(&mut actions, now) {
            return Err(self.rearm(account, idx, e));
        }

        let mut scratch = account.clone();
        match apply_actions(&self.registry, &mut scratch, &actions, now) {
            Err(e) => Err(self.rearm(account, idx, e)),
            Ok(ActionOutcome::RemoveAccount) => {
                if let Err(e) = self.store.remove_account(&account.id).await {
                    return Err(self.rearm(account, idx, e));
                }
                self.notify(&trigger, &account.id, now);
                Ok(TriggerCheck::Removed)
            }
            Ok(ActionOutcome::Applied) => {
                *account = scratch;
                if trigger.recurrent {
                    account.action_triggers[idx].executed = false;
                }
                self.notify(&trigger, &account.id, now);
                Ok(TriggerCheck::Fired)
            }
        }
    }

    /// Re-arm the trigger after a failed execution and pass the error on
    fn rearm(&self, account: &mut Account, idx: usize, e: AppError) -> AppError {
        warn!(
            trigger = %account.action_triggers[idx].id,
            error = %e,
            error_code = e.error_code(),
            "trigger action set failed, re-arming"
        );
        account.action_triggers[idx].executed = false;
        e
    }

    fn notify(&self, trigger: &ActionTrigger, account_id: &str, now: DateTime<Utc>) {
        self.events.trigger_fired(&TriggerFiredEvent {
            event_name: ACTION_TRIGGER_FIRED,
            unique_id: trigger.unique_id.clone(),
            id: trigger.id.clone(),
            action_set_id: trigger.actions_id.clone(),
        });
        self.audit.record(&AuditRecord {
            source: ExecutionSource::Trigger,
            entity_id: trigger.unique_id.clone(),
            actions_id: trigger.actions_id.clone(),
            account_id: account_id.to_string(),
            at: now,
        });
    }
}

fn threshold_reached(
    account: &Account,
    trigger: &ActionTrigger,
    stats: &StatsContext,
    now: DateTime<Utc>,
) -> bool {
    match trigger.threshold_type {
        ThresholdType::MinBalance => {
            account.balance_total(&trigger.balance_filter, now) <= trigger.threshold_value
        }
        ThresholdType::MaxBalance => {
            account.balance_total(&trigger.balance_filter, now) >= trigger.threshold_value
        }
        ThresholdType::MinEventCounter => {
            stats.counter(&trigger.balance_filter.balance_type) <= trigger.threshold_value
        }
        ThresholdType::MaxEventCounter => {
            stats.counter(&trigger.balance_filter.balance_type) >= trigger.threshold_value
        }
        ThresholdType::BalanceExpired => account
            .balances_of(&trigger.balance_filter.balance_type)
            .iter()
            .any(|b| trigger.balance_filter.matches(b) && b.is_expired(now)),
    }
}
