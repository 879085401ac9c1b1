//! Unified error handling for CobroCharging
//!
//! One error type for the whole engine. Variants are grouped by the
//! propagation policy that applies to them: configuration errors abort only
//! the affected action-set execution, transient data errors are isolated to
//! the account being processed, and an uncovered rating range is an explicit
//! signal distinguishable from a zero-cost result.

use thiserror::Error;

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    // ==================== Storage Errors ====================
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // ==================== Configuration Errors ====================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid calendar spec: {0}")]
    InvalidCalendar(String),

    #[error("Unknown action type: {0}")]
    UnknownActionType(String),

    #[error("Action set not found: {0}")]
    ActionSetNotFound(String),

    // ==================== Rating Errors ====================
    #[error("No rate found for: {0}")]
    RateNotFound(String),

    // ==================== Account Errors ====================
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Account disabled: {0}")]
    AccountDisabled(String),

    #[error("Shared group not found: {0}")]
    SharedGroupNotFound(String),

    // ==================== Execution Errors ====================
    #[error("Transaction failed: {0}")]
    Transaction(String),

    #[error("Guard timed out for key: {0}")]
    GuardTimeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns the stable error code used in structured log records
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Storage(_) => "storage_error",
            AppError::Serialization(_) => "serialization_error",
            AppError::Config(_) => "config_error",
            AppError::InvalidCalendar(_) => "invalid_calendar",
            AppError::UnknownActionType(_) => "unknown_action_type",
            AppError::ActionSetNotFound(_) => "action_set_not_found",
            AppError::RateNotFound(_) => "rate_not_found",
            AppError::AccountNotFound(_) => "account_not_found",
            AppError::AccountDisabled(_) => "account_disabled",
            AppError::SharedGroupNotFound(_) => "shared_group_not_found",
            AppError::Transaction(_) => "transaction_failed",
            AppError::GuardTimeout(_) => "guard_timeout",
            AppError::Internal(_) => "internal_error",
        }
    }

    /// True for errors caused by bad configuration data. These abort the
    /// affected action-set execution and are never retried.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            AppError::Config(_)
                | AppError::InvalidCalendar(_)
                | AppError::UnknownActionType(_)
                | AppError::ActionSetNotFound(_)
        )
    }
}

// ==================== From implementations ====================

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}
