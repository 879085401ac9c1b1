//! Action timing scheduler
//!
//! [`ActionScheduler`] holds the armed [`ActionTiming`]s, sleeps until the
//! earliest fire time, and executes due timings in order. Per-account
//! execution goes through the [`Guardian`] so a scheduled run never races
//! a trigger firing on the same account.

use crate::guardian::Guardian;
use crate::registry::{apply_actions, prepare_actions, ActionOutcome, ActionRegistry};
use chrono::{DateTime, Utc};
use cobro_core::config::ChargingConfig;
use cobro_core::error::AppError;
use cobro_core::models::ActionTiming;
use cobro_core::traits::{AccountStore, AuditRecord, AuditSink, ExecutionSource};
use cobro_core::AppResult;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::Notify;
use tracing::{debug, error, info, instrument, warn};

/// Tunables lifted from [`ChargingConfig`]
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Offset applied when materializing an `*asap` start time
    pub asap_delay: chrono::Duration,

    /// Wait bound for the per-account guard
    pub guard_timeout: StdDuration,
}

impl SchedulerOptions {
    pub fn from_config(config: &ChargingConfig) -> Self {
        Self {
            asap_delay: chrono::Duration::seconds(config.scheduler.asap_delay_secs as i64),
            guard_timeout: StdDuration::from_secs(config.actions.guard_timeout_secs),
        }
    }
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self::from_config(&ChargingConfig::default())
    }
}

enum AccountRun {
    Executed,
    Skipped,
}

/// Fires action timings at their calendar occurrences
pub struct ActionScheduler<S: AccountStore> {
    store: Arc<S>,
    registry: Arc<ActionRegistry>,
    guardian: Arc<Guardian>,
    audit: Arc<dyn AuditSink>,
    options: SchedulerOptions,
    timings: Mutex<Vec<ActionTiming>>,
    wakeup: Notify,
}

impl<S: AccountStore> ActionScheduler<S> {
    pub fn new(
        store: Arc<S>,
        registry: Arc<ActionRegistry>,
        guardian: Arc<Guardian>,
        audit: Arc<dyn AuditSink>,
        options: SchedulerOptions,
    ) -> Self {
        Self {
            store,
            registry,
            guardian,
            audit,
            options,
            timings: Mutex::new(Vec::new()),
            wakeup: Notify::new(),
        }
    }

    /// Arm a timing
    ///
    /// Deferred start times are materialized against the current instant,
    /// which makes them one-time. A timing whose calendar never fires
    /// again is dropped with a warning rather than held forever.
    pub fn schedule(&self, mut timing: ActionTiming) -> AppResult<()> {
        timing.calendar().validate()?;
        let now = Utc::now();
        if timing.calendar().is_deferred() {
            let pinned = timing.calendar().materialized(now, self.options.asap_delay)?;
            timing.set_calendar(pinned);
        }
        match timing.next_run(now) {
            Some(at) => {
                debug!(uuid = %timing.uuid, actions_id = %timing.actions_id, fire_at = %at, "timing armed");
                self.timings.lock().push(timing);
                self.wakeup.notify_one();
                Ok(())
            }
            None => {
                warn!(uuid = %timing.uuid, actions_id = %timing.actions_id, "timing never fires, dropping");
                Ok(())
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.timings.lock().len()
    }

    /// Serve timings until the surrounding task is dropped
    pub async fn run(&self) {
        info!("action scheduler started");
        loop {
            let now = Utc::now();
            if self.dispatch_due(now).await > 0 {
                continue;
            }
            match self.peek_next(now) {
                None => self.wakeup.notified().await,
                Some(at) => {
                    let wait = (at - now).to_std().unwrap_or(StdDuration::ZERO);
                    tokio::select! {
                        _ = tokio::time::sleep(wait) => {}
                        _ = self.wakeup.notified() => {}
                    }
                }
            }
        }
    }

    /// Earliest armed fire time after `now`
    fn peek_next(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut timings = self.timings.lock();
        timings
            .iter_mut()
            .filter_map(|t| t.scheduled_at().or_else(|| t.next_run(now)))
            .min()
    }

    /// Fire every timing whose computed fire time is at or before `now`;
    /// returns the number fired
    ///
    /// Due timings fire in fire-time order, ties broken by weight
    /// descending. A recurring timing is re-armed afterwards unless its
    /// run hit a configuration error.
    pub async fn dispatch_due(&self, now: DateTime<Utc>) -> usize {
        let due = self.take_due(now);
        let fired = due.len();
        for mut timing in due {
            let reschedule = self.execute_timing(&timing, now).await;
            timing.invalidate_next_run();
            if !reschedule {
                warn!(uuid = %timing.uuid, actions_id = %timing.actions_id, "timing disabled after configuration failure");
            } else if timing.next_run(now).is_some() {
                self.timings.lock().push(timing);
            } else {
                info!(uuid = %timing.uuid, actions_id = %timing.actions_id, "timing exhausted, retiring");
            }
        }
        if fired > 0 {
            self.guardian.purge_idle();
        }
        fired
    }

    fn take_due(&self, now: DateTime<Utc>) -> Vec<ActionTiming> {
        let mut timings = self.timings.lock();
        let mut due: Vec<(DateTime<Utc>, ActionTiming)> = Vec::new();
        let mut keep = Vec::with_capacity(timings.len());
        for mut timing in timings.drain(..) {
            // the cached fire time decides dueness; recompute only when the
            // timing was never primed
            match timing.scheduled_at().or_else(|| timing.next_run(now)) {
                Some(at) if at <= now => due.push((at, timing)),
                Some(_) => keep.push(timing),
                None => {
                    info!(uuid = %timing.uuid, "timing exhausted, retiring");
                }
            }
        }
        *timings = keep;
        due.sort_by(|a, b| {
            a.0.cmp(&b.0).then(
                b.1.weight
                    .partial_cmp(&a.1.weight)
                    .unwrap_or(Ordering::Equal),
            )
        });
        due.into_iter().map(|(_, timing)| timing).collect()
    }

    /// Run the timing's action set against every target account
    ///
    /// Returns whether the timing may be rescheduled. A missing action set
    /// or an unknown action type is a configuration failure: the batch
    /// stops and the timing is disabled. Per-account failures are logged
    /// and isolated; the batch continues.
    #[instrument(skip(self, timing), fields(uuid = %timing.uuid, actions_id = %timing.actions_id))]
    async fn execute_timing(&self, timing: &ActionTiming, now: DateTime<Utc>) -> bool {
        let mut actions = match self.store.action_set(&timing.actions_id).await {
            Ok(Some(actions)) => actions,
            Ok(None) => {
                error!(
                    error_code = AppError::ActionSetNotFound(timing.actions_id.clone()).error_code(),
                    "action set missing, disabling timing"
                );
                return false;
            }
            Err(e) => {
                error!(error = %e, error_code = e.error_code(), "action set load failed, will retry");
                return true;
            }
        };
        if let Err(e) = prepare_actions(&mut actions, now) {
            error!(error = %e, error_code = e.error_code(), "action set preparation failed, disabling timing");
            return false;
        }

        for account_id in &timing.account_ids {
            let result = self
                .guardian
                .guard_timed(account_id, self.options.guard_timeout, || async {
                    self.run_for_account(account_id, &actions, now).await
                })
                .await;
            match result {
                Ok(AccountRun::Executed) => {
                    self.audit.record(&AuditRecord {
                        source: ExecutionSource::Scheduler,
                        entity_id: timing.uuid.to_string(),
                        actions_id: timing.actions_id.clone(),
                        account_id: account_id.clone(),
                        at: now,
                    });
                }
                Ok(AccountRun::Skipped) => {}
                Err(e) if e.is_configuration() => {
                    error!(account = %account_id, error = %e, error_code = e.error_code(), "configuration error, aborting batch");
                    return false;
                }
                Err(e) => {
                    error!(account = %account_id, error = %e, error_code = e.error_code(), "account execution failed");
                }
            }
        }
        true
    }

    async fn run_for_account(
        &self,
        account_id: &str,
        actions: &[cobro_core::models::Action],
        now: DateTime<Utc>,
    ) -> AppResult<AccountRun> {
        let Some(mut account) = self.store.account(account_id).await? else {
            warn!(account = %account_id, "scheduled account missing, skipping");
            return Ok(AccountRun::Skipped);
        };
        if account.disabled {
            warn!(account = %account.id, "scheduled account disabled, skipping");
            return Ok(AccountRun::Skipped);
        }
        match apply_actions(&self.registry, &mut account, actions, now)? {
            ActionOutcome::RemoveAccount => {
                self.store.remove_account(account_id).await?;
            }
            ActionOutcome::Applied => {
                self.store.set_account(account).await?;
            }
        }
        Ok(AccountRun::Executed)
    }
}
