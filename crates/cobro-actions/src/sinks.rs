//! Tracing-backed event and audit sinks
//!
//! Default sink implementations that publish engine notifications as
//! structured log records on dedicated targets, so operators can route
//! them independently of the engine's own logging.

use cobro_core::traits::{AuditRecord, AuditSink, EventSink, TriggerFiredEvent};
use tracing::info;

/// Emits fired-trigger events on the `cobro::events` target
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn trigger_fired(&self, event: &TriggerFiredEvent) {
        match serde_json::to_string(event) {
            Ok(payload) => info!(target: "cobro::events", %payload, "trigger fired"),
            Err(e) => info!(
                target: "cobro::events",
                unique_id = %event.unique_id,
                error = %e,
                "trigger fired (payload serialization failed)"
            ),
        }
    }
}

/// Emits execution audit records on the `cobro::audit` target
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: &AuditRecord) {
        info!(
            target: "cobro::audit",
            source = %record.source,
            entity_id = %record.entity_id,
            actions_id = %record.actions_id,
            account_id = %record.account_id,
            at = %record.at,
            "action set executed"
        );
    }
}
