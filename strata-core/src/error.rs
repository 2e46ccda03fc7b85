//! Error types for STRATA operations

use crate::{ColumnId, OperationId, OperationKind};
use std::collections::BTreeSet;
use thiserror::Error;

/// Validation errors for records and log mutations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Operation {operation_id} declares columns as both input and output: {columns:?}")]
    OverlappingColumns {
        operation_id: OperationId,
        columns: BTreeSet<ColumnId>,
    },

    #[error("Operation {operation_id} is already recorded in the history")]
    DuplicateOperation { operation_id: OperationId },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to parse configuration: {reason}")]
    ParseFailed { reason: String },
}

/// Errors raised while re-executing an operation's effect.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReplayError {
    #[error("No replayer registered for operation kind {kind}")]
    NoReplayer { kind: OperationKind },

    #[error("Replay of {kind} operation {operation_id} rejected parameters: {reason}")]
    Rejected {
        operation_id: OperationId,
        kind: OperationKind,
        reason: String,
    },
}

/// Errors raised by the compaction commit step.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompactionError {
    #[error("History changed since snapshot: expected fingerprint {expected}, found {found}")]
    StaleSnapshot { expected: String, found: String },

    #[error("Failed to encode history for fingerprinting: {reason}")]
    FingerprintFailed { reason: String },
}

/// Master error type for all STRATA errors.
#[derive(Debug, Clone, Error)]
pub enum StrataError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Replay error: {0}")]
    Replay(#[from] ReplayError),

    #[error("Compaction error: {0}")]
    Compaction(#[from] CompactionError),
}

/// Result type alias for STRATA operations.
pub type StrataResult<T> = Result<T, StrataError>;

// =============================================================================
// TESTS
// =============================================================================
