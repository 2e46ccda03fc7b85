//! Property-based tests for the compaction pass
//!
//! Properties:
//! - A rejected candidate never changes the session log
//! - A committed history is itself dependency-complete
//! - Running compaction twice gives the same history as running it once
//! - An edit chain collapses onto its base carrying the last edit's parameters
//! - Completeness is decided by forward position

use proptest::prelude::*;
use strata_core::{ColumnKind, CompactionConfig, SchemaInspector};
use strata_lineage::{CandidateScope, CompletenessChecker, Compactor};
use strata_test_utils::fixtures::{self, WORKSHEET};
use strata_test_utils::generators::{arb_edit_chain, arb_history, arb_schema};
use strata_test_utils::accepting_registry;

fn compactor() -> Compactor {
    Compactor::new(CompactionConfig::standard()).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_fallback_leaves_log_identical(
        history in arb_history(12),
        schema in arb_schema(8),
    ) {
        let mut session = fixtures::session_with(history).unwrap();
        let before = session.history().fingerprint().unwrap();

        let outcome = compactor()
            .run(&mut session, &schema, &accepting_registry(), &CandidateScope::worksheet(WORKSHEET))
            .unwrap();

        if !outcome.result.complete {
            prop_assert!(!outcome.optimized);
            prop_assert_eq!(session.history().fingerprint().unwrap(), before);
            prop_assert_eq!(&outcome.result.snapshot.fingerprint, &before);
        }
    }

    #[test]
    fn prop_committed_history_is_complete(
        history in arb_history(12),
        schema in arb_schema(8),
    ) {
        let mut session = fixtures::session_with(history).unwrap();
        let outcome = compactor()
            .run(&mut session, &schema, &accepting_registry(), &CandidateScope::worksheet(WORKSHEET))
            .unwrap();

        if outcome.result.complete {
            let report = CompletenessChecker::new(&schema).check(session.history().operations());
            prop_assert!(report.complete);
        }
    }

    #[test]
    fn prop_compaction_is_idempotent(
        history in arb_history(12),
        schema in arb_schema(8),
    ) {
        let mut session = fixtures::session_with(history).unwrap();
        let compactor = compactor();
        let registry = accepting_registry();
        let scope = CandidateScope::worksheet(WORKSHEET);

        compactor.run(&mut session, &schema, &registry, &scope).unwrap();
        let once = session.history().clone();
        let second = compactor.run(&mut session, &schema, &registry, &scope).unwrap();

        prop_assert!(!second.optimized);
        prop_assert_eq!(session.history(), &once);
    }

    #[test]
    fn prop_edit_chain_collapses_to_base(chain in arb_edit_chain()) {
        let schema = fixtures::schema(&[("c1", ColumnKind::Regular)]);
        let base = chain[0].clone();
        let last = chain[chain.len() - 1].clone();
        let mut session = fixtures::session_with(chain.clone()).unwrap();
        let compactor = compactor();
        let registry = accepting_registry();
        let scope = CandidateScope::worksheet(WORKSHEET);

        let first = compactor.run(&mut session, &schema, &registry, &scope).unwrap();
        prop_assert!(first.result.complete);
        prop_assert_eq!(first.result.consolidation.dropped_count(), chain.len() - 1);

        let survivors = session.history().operations();
        prop_assert_eq!(survivors.len(), 1);
        prop_assert_eq!(survivors[0].operation_id, base.operation_id);
        prop_assert_eq!(
            survivors[0].parameters(),
            &base.parameters().merged_with(last.parameters())
        );
        prop_assert_eq!(survivors[0].input_columns(), last.input_columns());

        let once = session.history().clone();
        let second = compactor.run(&mut session, &schema, &registry, &scope).unwrap();
        prop_assert!(!second.optimized);
        prop_assert_eq!(session.history(), &once);
    }

    #[test]
    fn prop_reordering_producer_after_consumer_breaks_completeness(
        schema in arb_schema(8),
    ) {
        // c8 is outside the generated schema, so only the producer can supply it.
        let source = schema.regular_columns().into_iter().next();
        prop_assume!(source.is_some());
        let source = source.unwrap();

        let producer = fixtures::transform(
            strata_core::OperationKind::SubmitTransform,
            source.as_str(),
            "c8",
            "x",
        );
        let consumer = fixtures::record(
            strata_core::OperationKind::SetSemanticType,
            strata_core::OperationTags::MODELING,
            &["c8"],
            &[],
        );

        let checker = CompletenessChecker::new(&schema);
        prop_assert!(checker.check(&[producer.clone(), consumer.clone()]).complete);
        prop_assert!(!checker.check(&[consumer, producer]).complete);
    }
}
