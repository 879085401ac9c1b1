//! Core domain types for the CobroCharging engine
//!
//! Calendar recurrence, rating plans and profiles, accounts and balances,
//! actions and triggers, shared groups, plus the storage traits and error
//! type shared by every other crate in the workspace.

pub mod config;
pub mod error;
pub mod models;
pub mod traits;

pub use config::ChargingConfig;
pub use error::AppError;

/// Result alias used across the engine
pub type AppResult<T> = Result<T, AppError>;
