//! STRATA Core - Operation History Types
//!
//! Data types shared by every STRATA crate: recorded operations, the live
//! schema seam, the session-owned history log, errors and configuration.
//! Graph algorithms and the compaction engine live in `strata-lineage`.

mod config;
mod enums;
mod error;
mod history;
mod identity;
mod operation;
mod replay;
mod schema;

pub use config::CompactionConfig;
pub use enums::{ColumnKind, ColumnKindParseError, OperationKind, OperationTags};
pub use error::{
    CompactionError, ConfigError, ReplayError, StrataError, StrataResult, ValidationError,
};
pub use history::{HistoryLog, HistorySnapshot, Session};
pub use identity::{
    compute_content_hash, ColumnId, ContentHash, OperationId, SessionId, Timestamp, WorksheetId,
};
pub use operation::{OperationRecord, Parameters};
pub use replay::{ReplayRegistry, Replayer};
pub use schema::{Schema, SchemaColumn, SchemaInspector};

// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================
