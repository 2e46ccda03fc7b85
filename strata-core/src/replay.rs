//! Replay capability, resolved by operation kind.
//!
//! Records stay plain data. Whatever knows how to re-execute a kind of
//! operation against the live worksheet registers a [`Replayer`] for that kind.

use crate::{OperationKind, OperationRecord, Parameters, ReplayError};
use std::collections::HashMap;
use std::fmt;

/// Re-executes one kind of operation with a given set of parameters.
pub trait Replayer {
    /// Apply `record`'s effect using `parameters` instead of the record's own.
    fn replay(&self, record: &OperationRecord, parameters: &Parameters)
        -> Result<(), ReplayError>;
}

impl<F> Replayer for F
where
    F: Fn(&OperationRecord, &Parameters) -> Result<(), ReplayError>,
{
    fn replay(
        &self,
        record: &OperationRecord,
        parameters: &Parameters,
    ) -> Result<(), ReplayError> {
        self(record, parameters)
    }
}

/// Lookup table from operation kind to replayer.
#[derive(Default)]
pub struct ReplayRegistry {
    replayers: HashMap<OperationKind, Box<dyn Replayer>>,
    fallback: Option<Box<dyn Replayer>>,
}

impl ReplayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the replayer for `kind`, replacing any earlier one.
    pub fn register(&mut self, kind: OperationKind, replayer: impl Replayer + 'static) {
        self.replayers.insert(kind, Box::new(replayer));
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, kind: OperationKind, replayer: impl Replayer + 'static) -> Self {
        self.register(kind, replayer);
        self
    }

    /// Replayer used for kinds without a dedicated entry.
    pub fn with_fallback(mut self, replayer: impl Replayer + 'static) -> Self {
        self.fallback = Some(Box::new(replayer));
        self
    }

    pub fn resolve(&self, kind: &OperationKind) -> Option<&dyn Replayer> {
        self.replayers
            .get(kind)
            .or(self.fallback.as_ref())
            .map(|r| &**r)
    }

    pub fn contains(&self, kind: &OperationKind) -> bool {
        self.resolve(kind).is_some()
    }

    /// Replay `record` with `parameters` through the replayer for its kind.
    pub fn replay(
        &self,
        record: &OperationRecord,
        parameters: &Parameters,
    ) -> Result<(), ReplayError> {
        match self.resolve(&record.kind) {
            Some(replayer) => replayer.replay(record, parameters),
            None => Err(ReplayError::NoReplayer {
                kind: record.kind.clone(),
            }),
        }
    }
}

impl fmt::Debug for ReplayRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&str> = self.replayers.keys().map(|k| k.as_str()).collect();
        kinds.sort_unstable();
        f.debug_struct("ReplayRegistry")
            .field("kinds", &kinds)
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{OperationTags, WorksheetId};
    use std::cell::Cell;
    use std::rc::Rc;

    fn transform() -> OperationRecord {
        OperationRecord::new(
            OperationKind::SubmitTransform,
            OperationTags::TRANSFORMATION,
            WorksheetId::from("WS1"),
        )
    }

    #[test]
    fn test_missing_replayer_is_an_error() {
        let registry = ReplayRegistry::new();
        let err = registry
            .replay(&transform(), &Parameters::new())
            .unwrap_err();
        assert_eq!(
            err,
            ReplayError::NoReplayer {
                kind: OperationKind::SubmitTransform
            }
        );
    }

    #[test]
    fn test_registered_replayer_receives_parameters() {
        let seen = Rc::new(Cell::new(0usize));
        let counter = Rc::clone(&seen);
        let registry = ReplayRegistry::new().with(
            OperationKind::SubmitTransform,
            move |_: &OperationRecord, params: &Parameters| -> Result<(), ReplayError> {
                counter.set(params.len());
                Ok(())
            },
        );

        let params = Parameters::new().with("a", 1).with("b", 2);
        registry.replay(&transform(), &params).unwrap();
        assert_eq!(seen.get(), 2);
    }

    #[test]
    fn test_fallback_covers_unregistered_kinds() {
        let registry = ReplayRegistry::new()
            .with_fallback(|_: &OperationRecord, _: &Parameters| -> Result<(), ReplayError> {
                Ok(())
            });
        assert!(registry.contains(&OperationKind::Glue));
        assert!(registry.replay(&transform(), &Parameters::new()).is_ok());
    }
}
