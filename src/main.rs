//! CobroCharging engine daemon
//!
//! Loads configuration and the optional bootstrap document, lints the
//! tariff data, arms the scheduled action timings, and serves them until
//! shutdown.

use cobro_actions::{
    ActionRegistry, ActionScheduler, Guardian, SchedulerOptions, TracingAuditSink,
};
use cobro_core::traits::TariffStore;
use cobro_core::ChargingConfig;
use cobro_rating::{first_discontinuous, first_unsane_rate, first_unsane_timing};
use cobro_store::{MemoryAccountStore, MemoryTariffStore};
use std::env;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging
fn init_tracing() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "cobro_charging={},cobro_core={},cobro_rating={},cobro_actions={},cobro_store={},cobro={}",
            log_level, log_level, log_level, log_level, log_level, log_level
        ))
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .init();
}

/// Warn about tariff data a resolver would stumble over
fn lint_tariffs(tariffs: &MemoryTariffStore) {
    for id in tariffs.rating_plan_ids() {
        let Some(plan) = tariffs.rating_plan(&id) else {
            continue;
        };
        if let Some(destination) = first_discontinuous(&plan) {
            warn!(plan = %id, %destination, "rate intervals leave uncovered time");
        }
        if let Some(destination) = first_unsane_rate(&plan) {
            warn!(plan = %id, %destination, "malformed rate slots");
        }
        if let Some(destination) = first_unsane_timing(&plan) {
            warn!(plan = %id, %destination, "duplicate rate interval calendars");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_tracing();

    info!("Starting CobroCharging engine v{}", env!("CARGO_PKG_VERSION"));

    let config = ChargingConfig::load()?;

    let tariffs = Arc::new(MemoryTariffStore::new());
    let accounts = Arc::new(MemoryAccountStore::new());

    let timings = match &config.engine.bootstrap_path {
        Some(path) => {
            info!(%path, "loading bootstrap document");
            let data = cobro_store::load(path)?;
            cobro_store::apply(data, &tariffs, &accounts).await?
        }
        None => {
            warn!("no bootstrap document configured, starting empty");
            Vec::new()
        }
    };

    lint_tariffs(&tariffs);

    let registry = Arc::new(ActionRegistry::with_builtins());
    let guardian = Arc::new(Guardian::new());
    let scheduler = Arc::new(ActionScheduler::new(
        accounts.clone(),
        registry,
        guardian,
        Arc::new(TracingAuditSink),
        SchedulerOptions::from_config(&config),
    ));

    for timing in timings {
        if let Err(e) = scheduler.schedule(timing) {
            warn!(error = %e, "dropping invalid bootstrap timing");
        }
    }
    info!(pending = scheduler.pending(), "action timings armed");

    let runner = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run().await })
    };

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    runner.abort();

    Ok(())
}
