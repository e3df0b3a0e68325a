//! Error types for the VM storage planner
//!
//! Provides structured error types for the capacity ledger, the placement
//! engine, the reservation manager and the external collaborators.

use thiserror::Error;

/// Unified error type for the planner
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid pool name pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    // =========================================================================
    // Ledger Errors
    // =========================================================================
    #[error("Host not found: {host}")]
    HostNotFound { host: String },

    #[error("Storage pool not found: {host}/{pool}")]
    PoolNotFound { host: String, pool: String },

    // =========================================================================
    // Placement Errors
    // =========================================================================
    #[error("VM {vm} does not fit on host {host}: {reason}")]
    Infeasible {
        vm: String,
        host: String,
        reason: String,
    },

    // =========================================================================
    // Collaborator Errors
    // =========================================================================
    #[error("Volume provisioning failed for {path}: {reason}")]
    Provisioning { path: String, reason: String },

    #[error("Inventory error: {0}")]
    Inventory(String),

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// What the caller should do with a failed operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Drop the host for the rest of the batch and keep planning
    DropHost,
    /// Retry the operation; compensation has already been attempted
    Retry,
    /// Fatal to the call
    Abort,
}

impl Error {
    /// Determine what action to take for this error
    pub fn action(&self) -> ErrorAction {
        match self {
            Error::Infeasible { .. } => ErrorAction::DropHost,

            Error::Provisioning { .. } | Error::Inventory(_) | Error::Io(_) => ErrorAction::Retry,

            Error::Configuration(_)
            | Error::InvalidPattern { .. }
            | Error::HostNotFound { .. }
            | Error::PoolNotFound { .. }
            | Error::JsonParse(_)
            | Error::YamlParse(_)
            | Error::Internal(_) => ErrorAction::Abort,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self.action(), ErrorAction::Retry)
    }

    /// Check if this error only rules out a single host
    pub fn is_infeasible(&self) -> bool {
        matches!(self.action(), ErrorAction::DropHost)
    }
}

/// Compile a glob-style pool name pattern
pub fn compile_pattern(pattern: &str) -> Result<glob::Pattern> {
    glob::Pattern::new(pattern).map_err(|e| Error::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.msg.to_string(),
    })
}

/// Result type alias for the planner
pub type Result<T> = std::result::Result<T, Error>;
