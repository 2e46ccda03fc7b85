//! Producer/consumer dependency graph over an operation sequence.
//!
//! Nodes are positions in the sequence the graph was built from. An edge
//! `consumer → producer` exists when the consumer reads a column the producer
//! writes. A column may have several producers (ids get reused when an
//! operation is redone), so this is an over-approximation and may contain
//! cycles. It is never a single-producer DAG.
//!
//! ```text
//!   Import ──writes──▶ c2 ──read by──▶ Fold ──writes──▶ c3 ──read by──▶ SetSemanticType
//!
//!   edges:  Fold → Import,  SetSemanticType → Fold
//! ```

use std::collections::{BTreeSet, HashMap};
use strata_core::{ColumnId, OperationId, OperationRecord};

/// Index of an operation inside the sequence a [`LineageGraph`] was built from.
pub type NodeIndex = usize;

/// Arena representation of the lineage graph.
#[derive(Debug, Clone, Default)]
pub struct LineageGraph {
    ids: Vec<OperationId>,
    index: HashMap<OperationId, NodeIndex>,
    producers: Vec<Vec<NodeIndex>>,
    consumers: Vec<Vec<NodeIndex>>,
    produced_by: HashMap<ColumnId, Vec<NodeIndex>>,
}

impl LineageGraph {
    /// Build the graph for `operations`.
    ///
    /// Producers of a column are kept in sequence order. Each node's edge list
    /// is deduplicated and ascending.
    pub fn build(operations: &[OperationRecord]) -> Self {
        let mut produced_by: HashMap<ColumnId, Vec<NodeIndex>> = HashMap::new();
        let mut index = HashMap::with_capacity(operations.len());
        let mut ids = Vec::with_capacity(operations.len());

        for (idx, op) in operations.iter().enumerate() {
            ids.push(op.operation_id);
            index.entry(op.operation_id).or_insert(idx);
            for output in op.output_columns() {
                produced_by.entry(output.clone()).or_default().push(idx);
            }
        }

        let mut producers = Vec::with_capacity(operations.len());
        let mut consumers: Vec<Vec<NodeIndex>> = vec![Vec::new(); operations.len()];

        for (idx, op) in operations.iter().enumerate() {
            let mut edges = BTreeSet::new();
            for input in op.input_columns() {
                if let Some(sources) = produced_by.get(input) {
                    edges.extend(sources.iter().copied().filter(|&p| p != idx));
                }
            }
            for &producer in &edges {
                consumers[producer].push(idx);
            }
            producers.push(edges.into_iter().collect());
        }

        Self {
            ids,
            index,
            producers,
            consumers,
            produced_by,
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Total number of consumer → producer edges.
    pub fn edge_count(&self) -> usize {
        self.producers.iter().map(Vec::len).sum()
    }

    pub fn index_of(&self, operation_id: &OperationId) -> Option<NodeIndex> {
        self.index.get(operation_id).copied()
    }

    pub fn operation_id(&self, node: NodeIndex) -> Option<OperationId> {
        self.ids.get(node).copied()
    }

    /// Operations whose outputs `node` reads.
    pub fn producers_of(&self, node: NodeIndex) -> &[NodeIndex] {
        self.producers.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Operations that read an output of `node`.
    pub fn consumers_of(&self, node: NodeIndex) -> &[NodeIndex] {
        self.consumers.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every operation that writes `column`, earliest first.
    pub fn producers_of_column(&self, column: &ColumnId) -> &[NodeIndex] {
        self.produced_by
            .get(column)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn has_producers(&self, node: NodeIndex) -> bool {
        !self.producers_of(node).is_empty()
    }

    /// Nodes without producer edges.
    pub fn roots(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        (0..self.len()).filter(move |&node| !self.has_producers(node))
    }
}
