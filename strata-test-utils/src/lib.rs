//! STRATA Test Utilities
//!
//! Shared test infrastructure for the STRATA workspace:
//! - Proptest generators for records, parameters and histories
//! - Mock replayers that record or reject merges
//! - Fixtures for the standard compaction scenarios
//! - Custom assertions for STRATA results

// Re-export core types for convenience
pub use strata_core::{
    ColumnId, ColumnKind, CompactionConfig, CompactionError, ConfigError, HistoryLog,
    OperationId, OperationKind, OperationRecord, OperationTags, Parameters, ReplayError,
    ReplayRegistry, Replayer, Schema, SchemaInspector, Session, StrataError, StrataResult,
    ValidationError, WorksheetId,
};

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

// ============================================================================
// MOCK REPLAYERS
// ============================================================================

/// One call seen by a [`RecordingReplayer`].
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayCall {
    pub operation_id: OperationId,
    pub kind: OperationKind,
    pub parameters: Parameters,
}

/// Replayer that accepts everything and remembers what it was asked to do.
///
/// Clones share the call log, so keep one handle and register another.
#[derive(Debug, Clone, Default)]
pub struct RecordingReplayer {
    calls: Arc<Mutex<Vec<ReplayCall>>>,
}

impl RecordingReplayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<ReplayCall> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|calls| calls.len()).unwrap_or(0)
    }
}

impl Replayer for RecordingReplayer {
    fn replay(&self, record: &OperationRecord, parameters: &Parameters) -> Result<(), ReplayError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(ReplayCall {
                operation_id: record.operation_id,
                kind: record.kind.clone(),
                parameters: parameters.clone(),
            });
        }
        Ok(())
    }
}

/// Replayer that rejects any parameter set whose `transformationCode`
/// contains a marker string.
#[derive(Debug, Clone)]
pub struct RejectingReplayer {
    marker: String,
}

impl RejectingReplayer {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }
}

impl Replayer for RejectingReplayer {
    fn replay(&self, record: &OperationRecord, parameters: &Parameters) -> Result<(), ReplayError> {
        match parameters.get_str(fixtures::CODE_KEY) {
            Some(code) if code.contains(&self.marker) => Err(ReplayError::Rejected {
                operation_id: record.operation_id,
                kind: record.kind.clone(),
                reason: format!("transformation code contains {:?}", self.marker),
            }),
            _ => Ok(()),
        }
    }
}

/// Registry whose fallback accepts every replay.
pub fn accepting_registry() -> ReplayRegistry {
    ReplayRegistry::new().with_fallback(RecordingReplayer::new())
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for STRATA records and histories.

    use super::*;
    use proptest::prelude::*;

    /// Column ids `c0..c{pool}`; a small pool makes producers collide.
    pub fn arb_column_id(pool: u8) -> impl Strategy<Value = ColumnId> {
        (0..pool.max(1)).prop_map(|c| ColumnId::new(format!("c{}", c)))
    }

    pub fn arb_column_kind() -> impl Strategy<Value = ColumnKind> {
        prop_oneof![Just(ColumnKind::Regular), Just(ColumnKind::Derived)]
    }

    pub fn arb_operation_kind() -> impl Strategy<Value = OperationKind> {
        prop_oneof![
            Just(OperationKind::ImportColumn),
            Just(OperationKind::Fold),
            Just(OperationKind::Glue),
            Just(OperationKind::GroupBy),
            Just(OperationKind::SubmitTransform),
            Just(OperationKind::SubmitEditTransform),
            Just(OperationKind::SetSemanticType),
            Just(OperationKind::SetMetaProperty),
            "[A-Z][a-z]{3,8}".prop_map(OperationKind::Custom),
        ]
    }

    pub fn arb_parameters() -> impl Strategy<Value = Parameters> {
        prop::collection::btree_map("[a-e]", "[a-z]{0,6}", 0..5).prop_map(|entries| {
            entries
                .into_iter()
                .fold(Parameters::new(), |params, (k, v)| params.with(k, v))
        })
    }

    /// A valid record over a pool of `pool` column ids.
    pub fn arb_operation(pool: u8) -> impl Strategy<Value = OperationRecord> {
        (
            arb_operation_kind(),
            prop::collection::btree_set(arb_column_id(pool), 0..3),
            prop::collection::btree_set(arb_column_id(pool), 0..3),
            arb_parameters(),
        )
            .prop_map(|(kind, inputs, outputs, parameters)| {
                let outputs: BTreeSet<ColumnId> = outputs.difference(&inputs).cloned().collect();
                OperationRecord::new(kind, OperationTags::TRANSFORMATION, WorksheetId::from("WS1"))
                    .with_inputs(inputs)
                    .with_outputs(outputs)
                    .with_parameters(parameters)
            })
    }

    /// A history of up to `max_len` valid records with distinct ids.
    pub fn arb_history(max_len: usize) -> impl Strategy<Value = Vec<OperationRecord>> {
        prop::collection::vec(arb_operation(8), 0..=max_len)
    }

    /// Schema covering `c0..c{pool}` with arbitrary kinds.
    pub fn arb_schema(pool: u8) -> impl Strategy<Value = Schema> {
        prop::collection::vec(arb_column_kind(), pool as usize).prop_map(|kinds| {
            let mut schema = Schema::new();
            for (c, kind) in kinds.into_iter().enumerate() {
                let id = format!("c{}", c);
                // Ids are distinct by construction.
                let _ = schema.add_column(id.as_str(), id.as_str(), kind);
            }
            schema
        })
    }

    /// `SubmitTransform` followed by 1..5 edits over the same outputs.
    pub fn arb_edit_chain() -> impl Strategy<Value = Vec<OperationRecord>> {
        prop::collection::vec("[a-z]{1,6}", 2..=6).prop_map(|codes| {
            codes
                .into_iter()
                .enumerate()
                .map(|(i, code)| {
                    let kind = if i == 0 {
                        OperationKind::SubmitTransform
                    } else {
                        OperationKind::SubmitEditTransform
                    };
                    fixtures::transform(kind, "c1", "x", &code)
                })
                .collect()
        })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built histories and schemas for common scenarios.

    use super::*;

    /// Parameter key holding a transformation's source code.
    pub const CODE_KEY: &str = "transformationCode";

    /// Default worksheet used by the fixtures.
    pub const WORKSHEET: &str = "WS1";

    /// Record in the fixture worksheet.
    pub fn record(
        kind: OperationKind,
        tags: OperationTags,
        inputs: &[&str],
        outputs: &[&str],
    ) -> OperationRecord {
        OperationRecord::new(kind, tags, WorksheetId::from(WORKSHEET))
            .with_inputs(inputs.iter().copied())
            .with_outputs(outputs.iter().copied())
    }

    /// Transformation (or edit) reading `input` and writing `output`.
    pub fn transform(kind: OperationKind, input: &str, output: &str, code: &str) -> OperationRecord {
        record(kind, OperationTags::TRANSFORMATION, &[input], &[output])
            .with_parameters(Parameters::new().with(CODE_KEY, code))
    }

    /// Schema built from `(id, kind)` pairs; names equal ids.
    pub fn schema(columns: &[(&str, ColumnKind)]) -> Schema {
        let mut schema = Schema::new();
        for (id, kind) in columns {
            // Fixture ids are unique.
            let _ = schema.add_column(*id, *id, *kind);
        }
        schema
    }

    /// Session whose history is exactly `operations`.
    pub fn session_with(operations: Vec<OperationRecord>) -> StrataResult<Session> {
        Ok(Session::with_history(HistoryLog::from_operations(operations)?))
    }

    /// Import, fold and semantic type assignment over four columns.
    pub struct EndToEnd {
        pub schema: Schema,
        pub import: OperationRecord,
        pub fold: OperationRecord,
        pub set_semantic_type: OperationRecord,
    }

    impl EndToEnd {
        pub fn new() -> Self {
            Self {
                schema: schema(&[
                    ("c1", ColumnKind::Regular),
                    ("c2", ColumnKind::Regular),
                    ("c3", ColumnKind::Regular),
                    ("c4", ColumnKind::Derived),
                ]),
                import: record(
                    OperationKind::ImportColumn,
                    OperationTags::IMPORT | OperationTags::TRANSFORMATION,
                    &[],
                    &["c1", "c2"],
                ),
                fold: record(
                    OperationKind::Fold,
                    OperationTags::TRANSFORMATION,
                    &["c2"],
                    &["c3", "c4"],
                ),
                set_semantic_type: record(
                    OperationKind::SetSemanticType,
                    OperationTags::MODELING,
                    &["c3"],
                    &[],
                )
                .with_parameters(Parameters::new().with("type", "schema:name")),
            }
        }

        pub fn operations(&self) -> Vec<OperationRecord> {
            vec![
                self.import.clone(),
                self.fold.clone(),
                self.set_semantic_type.clone(),
            ]
        }
    }

    impl Default for EndToEnd {
        fn default() -> Self {
            Self::new()
        }
    }

    /// `Base(P1), Edit(P2), Edit(P3)` over output `x`.
    ///
    /// P1 carries an extra `hNodeId` key and P2 an extra `note` key, so a
    /// correct merge keeps the first and drops the second.
    pub fn edit_chain() -> Vec<OperationRecord> {
        vec![
            transform(OperationKind::SubmitTransform, "c1", "x", "p1")
                .with_parameters(Parameters::new().with(CODE_KEY, "p1").with("hNodeId", "c1")),
            transform(OperationKind::SubmitEditTransform, "c1", "x", "p2")
                .with_parameters(Parameters::new().with(CODE_KEY, "p2").with("note", "draft")),
            transform(OperationKind::SubmitEditTransform, "c1", "x", "p3"),
        ]
    }

    /// Layered diamond history: every layer of `width` transforms reads all
    /// outputs of the layer below.
    pub fn diamond_history(layers: usize, width: usize) -> (Schema, Vec<OperationRecord>) {
        let mut schema = Schema::new();
        let mut operations = Vec::with_capacity(layers * width + 1);

        let roots: Vec<String> = (0..width).map(|w| format!("l0w{}", w)).collect();
        for id in &roots {
            let _ = schema.add_column(id.as_str(), id.as_str(), ColumnKind::Regular);
        }
        operations.push(
            OperationRecord::new(
                OperationKind::ImportColumn,
                OperationTags::TRANSFORMATION,
                WorksheetId::from(WORKSHEET),
            )
            .with_outputs(roots.iter().cloned()),
        );

        let mut below = roots;
        for layer in 1..=layers {
            let mut current = Vec::with_capacity(width);
            for w in 0..width {
                let id = format!("l{}w{}", layer, w);
                let _ = schema.add_column(id.as_str(), id.as_str(), ColumnKind::Regular);
                operations.push(
                    OperationRecord::new(
                        OperationKind::SubmitTransform,
                        OperationTags::TRANSFORMATION,
                        WorksheetId::from(WORKSHEET),
                    )
                    .with_inputs(below.iter().cloned())
                    .with_outputs([id.clone()]),
                );
                current.push(id);
            }
            below = current;
        }

        operations.push(
            OperationRecord::new(
                OperationKind::SetSemanticType,
                OperationTags::MODELING,
                WorksheetId::from(WORKSHEET),
            )
            .with_inputs(below),
        );
        (schema, operations)
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Custom assertion functions for STRATA-specific validation.

    use super::*;

    /// Assert that a StrataResult is Ok.
    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &StrataResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    #[track_caller]
    pub fn assert_validation_error<T: std::fmt::Debug>(result: &StrataResult<T>) {
        match result {
            Err(StrataError::Validation(_)) => {}
            other => panic!("Expected Validation error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_config_error<T: std::fmt::Debug>(result: &StrataResult<T>) {
        match result {
            Err(StrataError::Config(_)) => {}
            other => panic!("Expected Config error, got: {:?}", other),
        }
    }

    /// Assert that a StrataResult is a StaleSnapshot compaction error.
    #[track_caller]
    pub fn assert_stale_snapshot<T: std::fmt::Debug>(result: &StrataResult<T>) {
        match result {
            Err(StrataError::Compaction(CompactionError::StaleSnapshot { .. })) => {}
            other => panic!("Expected StaleSnapshot error, got: {:?}", other),
        }
    }

    /// Assert that a column set is exactly `expected`.
    #[track_caller]
    pub fn assert_columns(actual: &BTreeSet<ColumnId>, expected: &[&str]) {
        let expected: BTreeSet<ColumnId> = expected.iter().map(|c| ColumnId::from(*c)).collect();
        assert_eq!(actual, &expected, "Column set mismatch");
    }

    /// Assert that two logs are structurally identical, fingerprint included.
    #[track_caller]
    pub fn assert_same_history(actual: &HistoryLog, expected: &HistoryLog) {
        assert_eq!(actual, expected, "History logs differ");
        match (actual.fingerprint(), expected.fingerprint()) {
            (Ok(a), Ok(b)) => assert_eq!(a, b, "History fingerprints differ"),
            (a, b) => panic!("Fingerprinting failed: {:?} / {:?}", a, b),
        }
    }

    /// Assert the ids of `operations`, in order.
    #[track_caller]
    pub fn assert_operation_ids(operations: &[OperationRecord], expected: &[OperationId]) {
        let actual: Vec<OperationId> = operations.iter().map(|op| op.operation_id).collect();
        assert_eq!(actual, expected, "Operation order mismatch");
    }
}

// ============================================================================
// TESTS
// ============================================================================
