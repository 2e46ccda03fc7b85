//! STRATA Lineage - Graph Analysis and History Compaction
//!
//! Works on the operation history recorded by `strata-core`:
//!
//! ```text
//!   HistoryLog ─▶ candidate ─▶ Consolidator ─▶ LineageGraph ─▶ BackwardResolver
//!                                                    │
//!                                                    ▼
//!                       Session ◀── commit ◀── CompletenessChecker
//! ```
//!
//! [`Compactor`] ties the passes together. Everything except
//! [`Compactor::commit`] works on copies; a candidate that fails the
//! completeness check never reaches the session.

mod compactor;
mod completeness;
mod consolidate;
mod graph;
mod resolve;

pub use compactor::{
    CandidateScope, CommitOutcome, CompactionOutcome, CompactionResult, Compactor,
    FallbackReason,
};
pub use completeness::{CompletenessChecker, CompletenessReport, DependencyGap};
pub use consolidate::{
    AbsorbedEdit, Consolidation, ConsolidationReport, Consolidator, MalformedMerge,
};
pub use graph::{LineageGraph, NodeIndex};
pub use resolve::{BackwardResolver, ResolvedSources, TerminalSet};

// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================
