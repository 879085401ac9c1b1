//! Built-in action functions
//!
//! Every action step names a function by its `*`-prefixed type. The
//! registry maps those names to implementations; an unregistered type is a
//! configuration error that aborts the whole action set.

use chrono::{DateTime, Utc};
use cobro_core::error::AppError;
use cobro_core::models::{parse_offset, sort_actions_by_weight, Account, Action};
use cobro_core::AppResult;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

pub const ACTION_LOG: &str = "*log";
pub const ACTION_TOPUP: &str = "*topup";
pub const ACTION_TOPUP_RESET: &str = "*topup_reset";
pub const ACTION_DEBIT: &str = "*debit";
pub const ACTION_DEBIT_RESET: &str = "*debit_reset";
pub const ACTION_RESET_TRIGGERS: &str = "*reset_triggers";
pub const ACTION_ENABLE_ACCOUNT: &str = "*enable_account";
pub const ACTION_DISABLE_ACCOUNT: &str = "*disable_account";
pub const ACTION_REMOVE_ACCOUNT: &str = "*remove_account";

/// Expiration token meaning "never expires"
pub const UNLIMITED: &str = "*unlimited";

/// What an action did to the account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Account mutated (or untouched) in place
    Applied,

    /// Account must be deleted; no further actions run
    RemoveAccount,
}

/// One executable action function
pub trait ActionFunction: Send + Sync {
    fn execute(
        &self,
        account: &mut Account,
        action: &Action,
        now: DateTime<Utc>,
    ) -> AppResult<ActionOutcome>;
}

/// Maps action type names to their implementations
#[derive(Default)]
pub struct ActionRegistry {
    functions: HashMap<String, Arc<dyn ActionFunction>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with every built-in function
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(ACTION_LOG, Arc::new(LogAction));
        registry.register(ACTION_TOPUP, Arc::new(TopUpAction { reset: false }));
        registry.register(ACTION_TOPUP_RESET, Arc::new(TopUpAction { reset: true }));
        registry.register(ACTION_DEBIT, Arc::new(DebitAction { reset: false }));
        registry.register(ACTION_DEBIT_RESET, Arc::new(DebitAction { reset: true }));
        registry.register(ACTION_RESET_TRIGGERS, Arc::new(ResetTriggersAction));
        registry.register(ACTION_ENABLE_ACCOUNT, Arc::new(SetDisabledAction(false)));
        registry.register(ACTION_DISABLE_ACCOUNT, Arc::new(SetDisabledAction(true)));
        registry.register(ACTION_REMOVE_ACCOUNT, Arc::new(RemoveAccountAction));
        registry
    }

    pub fn register(&mut self, action_type: impl Into<String>, function: Arc<dyn ActionFunction>) {
        self.functions.insert(action_type.into(), function);
    }

    pub fn get(&self, action_type: &str) -> Option<Arc<dyn ActionFunction>> {
        self.functions.get(action_type).cloned()
    }
}

/// Sort a set into execution order and resolve expiration strings against
/// the fire time
pub fn prepare_actions(actions: &mut Vec<Action>, now: DateTime<Utc>) -> AppResult<()> {
    sort_actions_by_weight(actions);
    for action in actions.iter_mut() {
        action.balance_filter.expiration_date = resolve_expiration(&action.expiration_string, now)?;
    }
    Ok(())
}

/// Run a prepared action set against an account copy
///
/// Actions whose filter rejects the account are skipped silently. An
/// unknown action type aborts the set; the caller discards the copy.
pub fn apply_actions(
    registry: &ActionRegistry,
    account: &mut Account,
    actions: &[Action],
    now: DateTime<Utc>,
) -> AppResult<ActionOutcome> {
    for action in actions {
        if !action.applies_to(account) {
            debug!(action = %action.id, account = %account.id, "action filter rejected account");
            continue;
        }
        let function = registry
            .get(&action.action_type)
            .ok_or_else(|| AppError::UnknownActionType(action.action_type.clone()))?;
        if let ActionOutcome::RemoveAccount = function.execute(account, action, now)? {
            return Ok(ActionOutcome::RemoveAccount);
        }
    }
    Ok(ActionOutcome::Applied)
}

/// Resolve an expiration string at fire time
///
/// Empty or `*unlimited` means no expiration, `+<duration>` is relative to
/// `now`, anything else must be an RFC 3339 instant.
pub fn resolve_expiration(s: &str, now: DateTime<Utc>) -> AppResult<Option<DateTime<Utc>>> {
    if s.is_empty() || s == UNLIMITED {
        return Ok(None);
    }
    if let Some(offset) = s.strip_prefix('+') {
        return Ok(Some(now + parse_offset(offset)?));
    }
    DateTime::parse_from_rfc3339(s)
        .map(|dt| Some(dt.with_timezone(&Utc)))
        .map_err(|_| AppError::Config(format!("bad expiration string: {}", s)))
}

struct LogAction;

impl ActionFunction for LogAction {
    fn execute(
        &self,
        account: &mut Account,
        _action: &Action,
        _now: DateTime<Utc>,
    ) -> AppResult<ActionOutcome> {
        let snapshot = serde_json::to_string(&account.balances)?;
        info!(account = %account.id, disabled = account.disabled, balances = %snapshot, "account snapshot");
        Ok(ActionOutcome::Applied)
    }
}

struct TopUpAction {
    reset: bool,
}

impl ActionFunction for TopUpAction {
    fn execute(
        &self,
        account: &mut Account,
        action: &Action,
        _now: DateTime<Utc>,
    ) -> AppResult<ActionOutcome> {
        let balance = account.balance_mut_or_create(&action.balance_filter);
        if self.reset {
            balance.value = action.units;
        } else {
            balance.value += action.units;
        }
        if let Some(expiration) = action.balance_filter.expiration_date {
            balance.expiration_date = Some(expiration);
        }
        Ok(ActionOutcome::Applied)
    }
}

struct DebitAction {
    reset: bool,
}

impl ActionFunction for DebitAction {
    fn execute(
        &self,
        account: &mut Account,
        action: &Action,
        now: DateTime<Utc>,
    ) -> AppResult<ActionOutcome> {
        if self.reset {
            account.balance_mut_or_create(&action.balance_filter).value = Decimal::ZERO;
        }
        account.debit(&action.balance_filter, action.units, now);
        Ok(ActionOutcome::Applied)
    }
}

struct ResetTriggersAction;

impl ActionFunction for ResetTriggersAction {
    fn execute(
        &self,
        account: &mut Account,
        _action: &Action,
        _now: DateTime<Utc>,
    ) -> AppResult<ActionOutcome> {
        for trigger in &mut account.action_triggers {
            trigger.executed = false;
        }
        Ok(ActionOutcome::Applied)
    }
}

struct SetDisabledAction(bool);

impl ActionFunction for SetDisabledAction {
    fn execute(
        &self,
        account: &mut Account,
        _action: &Action,
        _now: DateTime<Utc>,
    ) -> AppResult<ActionOutcome> {
        account.disabled = self.0;
        Ok(ActionOutcome::Applied)
    }
}

struct RemoveAccountAction;

impl ActionFunction for RemoveAccountAction {
    fn execute(
        &self,
        _account: &mut Account,
        _action: &Action,
        _now: DateTime<Utc>,
    ) -> AppResult<ActionOutcome> {
        Ok(ActionOutcome::RemoveAccount)
    }
}
