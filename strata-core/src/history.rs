//! Session-owned operation history.
//!
//! The log only grows through [`HistoryLog::append`] during normal editing.
//! The single other mutation is a wholesale [`HistoryLog::replace`], used when
//! a compacted history is committed, and [`HistoryLog::restore`] to roll back
//! to a [`HistorySnapshot`].

use crate::{
    compute_content_hash, CompactionError, ContentHash, OperationId, OperationRecord,
    SessionId, StrataResult, Timestamp, ValidationError,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Ordered, append-only sequence of recorded operations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryLog {
    operations: Vec<OperationRecord>,
}

impl HistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a log from an already ordered sequence.
    pub fn from_operations(operations: Vec<OperationRecord>) -> StrataResult<Self> {
        check_sequence(&operations)?;
        Ok(Self { operations })
    }

    /// Record a new operation at the end of the log.
    pub fn append(&mut self, record: OperationRecord) -> StrataResult<()> {
        record.validate()?;
        if self.contains(&record.operation_id) {
            return Err(ValidationError::DuplicateOperation {
                operation_id: record.operation_id,
            }
            .into());
        }
        self.operations.push(record);
        Ok(())
    }

    pub fn operations(&self) -> &[OperationRecord] {
        &self.operations
    }

    pub fn iter(&self) -> impl Iterator<Item = &OperationRecord> {
        self.operations.iter()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn get(&self, operation_id: &OperationId) -> Option<&OperationRecord> {
        self.operations
            .iter()
            .find(|op| &op.operation_id == operation_id)
    }

    pub fn contains(&self, operation_id: &OperationId) -> bool {
        self.get(operation_id).is_some()
    }

    /// SHA-256 over the canonical JSON encoding of the log.
    pub fn fingerprint(&self) -> StrataResult<ContentHash> {
        let encoded = serde_json::to_vec(&self.operations).map_err(|e| {
            CompactionError::FingerprintFailed {
                reason: e.to_string(),
            }
        })?;
        Ok(compute_content_hash(&encoded))
    }

    /// Capture the current state as a rollback target.
    pub fn snapshot(&self) -> StrataResult<HistorySnapshot> {
        Ok(HistorySnapshot {
            fingerprint: self.fingerprint()?,
            operations: self.operations.clone(),
            taken_at: Utc::now(),
        })
    }

    /// Roll the log back to `snapshot`.
    pub fn restore(&mut self, snapshot: &HistorySnapshot) {
        tracing::debug!(
            from_len = self.operations.len(),
            to_len = snapshot.operations.len(),
            "Restoring history snapshot"
        );
        self.operations = snapshot.operations.clone();
    }

    /// Swap in a whole new sequence.
    ///
    /// The sequence is checked before the swap; on error the log is untouched.
    pub fn replace(&mut self, operations: Vec<OperationRecord>) -> StrataResult<()> {
        check_sequence(&operations)?;
        tracing::debug!(
            from_len = self.operations.len(),
            to_len = operations.len(),
            "Replacing history"
        );
        self.operations = operations;
        Ok(())
    }
}

fn check_sequence(operations: &[OperationRecord]) -> StrataResult<()> {
    let mut seen = HashSet::with_capacity(operations.len());
    for op in operations {
        op.validate()?;
        if !seen.insert(op.operation_id) {
            return Err(ValidationError::DuplicateOperation {
                operation_id: op.operation_id,
            }
            .into());
        }
    }
    Ok(())
}

/// Point-in-time copy of a history log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySnapshot {
    pub operations: Vec<OperationRecord>,
    pub fingerprint: ContentHash,
    pub taken_at: Timestamp,
}

impl HistorySnapshot {
    pub fn fingerprint_hex(&self) -> String {
        hex::encode(self.fingerprint)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// One editing session and the history it owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: SessionId,
    history: HistoryLog,
}

impl Session {
    pub fn new() -> Self {
        Self {
            session_id: SessionId::now_v7(),
            history: HistoryLog::new(),
        }
    }

    pub fn with_history(history: HistoryLog) -> Self {
        Self {
            session_id: SessionId::now_v7(),
            history,
        }
    }

    /// Record an operation in this session's history.
    pub fn record(&mut self, record: OperationRecord) -> StrataResult<()> {
        self.history.append(record)
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut HistoryLog {
        &mut self.history
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
