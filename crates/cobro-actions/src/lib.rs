//! Action execution for the CobroCharging engine
//!
//! Scheduled action timings, balance threshold triggers, the built-in
//! action functions they run, per-account guarded execution, and shared
//! balance pooling.

pub mod balances;
pub mod guardian;
pub mod registry;
pub mod scheduler;
pub mod sinks;
pub mod triggers;

pub use balances::{select_order, PooledBalance, SharedBalancePool};
pub use guardian::Guardian;
pub use registry::{
    apply_actions, prepare_actions, resolve_expiration, ActionFunction, ActionOutcome,
    ActionRegistry,
};
pub use scheduler::{ActionScheduler, SchedulerOptions};
pub use sinks::{TracingAuditSink, TracingEventSink};
pub use triggers::{StatsContext, TriggerEvaluator};
