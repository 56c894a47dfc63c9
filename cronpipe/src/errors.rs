//! Error types for the orchestrator.
//!
//! Stage failures are deliberately a separate type from orchestrator
//! failures: a [`StageError`] is recorded in the ledger and drives skip
//! propagation, while an [`OrchestratorError`] aborts the invocation.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

use crate::core::StageName;

/// The main error type for orchestration operations.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The lock store failed.
    #[error("{0}")]
    Lock(#[from] LockError),

    /// The run ledger failed.
    #[error("{0}")]
    Ledger(#[from] LedgerError),

    /// A detached run task panicked or was cancelled.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised by a lock store backend.
#[derive(Debug, Clone, Error)]
pub enum LockError {
    /// The backing store could not be reached or rejected the command.
    #[error("Lock store error for '{key}': {message}")]
    Store {
        /// The lock key involved.
        key: String,
        /// Backend message.
        message: String,
    },

    /// A TTL of zero seconds, or one the store cannot represent, was requested.
    #[error("Invalid lock TTL for '{key}': must be at least one second and representable by the store")]
    InvalidTtl {
        /// The lock key involved.
        key: String,
    },
}

impl LockError {
    /// Creates a store error.
    #[must_use]
    pub fn store(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Store {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Errors raised by a run ledger backend.
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    /// The referenced run does not exist.
    #[error("Pipeline run not found: {0}")]
    RunNotFound(Uuid),

    /// The run already reached a terminal status.
    #[error("Pipeline run {run_id} is already finalized as '{status}'")]
    RunFinalized {
        /// The run identifier.
        run_id: Uuid,
        /// The terminal status already stored.
        status: String,
    },

    /// The backing store failed.
    #[error("Ledger storage error: {0}")]
    Storage(String),

    /// A stored value could not be decoded.
    #[error("Ledger decode error: {0}")]
    Decode(String),
}

/// A fatal failure raised by a stage.
///
/// Stages report per-item problems inside their result instead; this type
/// is reserved for failures that abort the stage.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct StageError {
    /// The error message recorded in the ledger.
    pub message: String,
    /// Additional context.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, String>,
}

impl StageError {
    /// Creates a new stage error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: HashMap::new(),
        }
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Error used when the registry has no implementation for a stage.
    #[must_use]
    pub fn not_registered(stage: StageName) -> Self {
        Self::new(format!("no stage registered for '{stage}'"))
            .with_context_entry("stage", stage.as_str())
    }

    /// Error used when a stage panicked instead of returning.
    #[must_use]
    pub fn panicked(stage: StageName, detail: &str) -> Self {
        Self::new(format!("stage '{stage}' panicked: {detail}"))
            .with_context_entry("stage", stage.as_str())
    }
}

impl From<anyhow::Error> for StageError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// Errors related to configuration loading.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// A required value is missing or empty.
    #[error("Missing required configuration: {0}")]
    Missing(&'static str),

    /// A value could not be parsed.
    #[error("Invalid value for {name}: {value}")]
    Invalid {
        /// The setting name.
        name: &'static str,
        /// The offending value.
        value: String,
    },
}
