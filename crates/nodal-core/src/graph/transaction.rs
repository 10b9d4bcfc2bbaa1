//! Transaction bookkeeping.
//!
//! Mutations are grouped into transactions. Transactions nest: only the
//! outermost `begin`/`end` pair notifies observers and commits, so a logical
//! edit made of many primitive operations produces exactly one
//! will-change/changed pair.
//!
//! Additions take effect immediately (a freshly added node can be the
//! endpoint of an edge added a moment later). Removals are only staged and
//! are applied when the outermost transaction ends.

use std::ops::{Deref, DerefMut};

use indexmap::IndexSet;
use nodal_common::types::{EdgeId, NodeId};

use super::store::{Edge, MutableGraph};

/// Changes recorded while a transaction is open.
#[derive(Debug, Default)]
pub(crate) struct StagedChanges {
    pub(crate) added_nodes: Vec<NodeId>,
    pub(crate) added_edges: Vec<EdgeId>,
    pub(crate) removed_nodes: IndexSet<NodeId>,
    pub(crate) removed_edges: IndexSet<EdgeId>,
}

impl StagedChanges {
    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.added_nodes.is_empty()
            && self.added_edges.is_empty()
            && self.removed_nodes.is_empty()
            && self.removed_edges.is_empty()
    }
}

/// Net structural effect of a committed transaction.
///
/// Elements both added and removed inside the same transaction appear in
/// neither list.
#[derive(Debug, Default)]
pub(crate) struct CommittedChanges {
    pub(crate) added_nodes: Vec<NodeId>,
    pub(crate) added_edges: Vec<Edge>,
    pub(crate) removed_nodes: Vec<NodeId>,
    pub(crate) removed_edges: Vec<Edge>,
}

impl CommittedChanges {
    pub(crate) fn is_empty(&self) -> bool {
        self.added_nodes.is_empty()
            && self.added_edges.is_empty()
            && self.removed_nodes.is_empty()
            && self.removed_edges.is_empty()
    }
}

/// Nesting depth and staged changes of the open transaction.
#[derive(Debug, Default)]
pub(crate) struct TransactionState {
    depth: usize,
    staged: StagedChanges,
}

impl TransactionState {
    /// Enters a transaction. Returns true if it is the outermost one.
    pub(crate) fn enter(&mut self) -> bool {
        self.depth += 1;
        self.depth == 1
    }

    /// Leaves a transaction. Returns true if it was the outermost one.
    pub(crate) fn leave(&mut self) -> bool {
        assert!(self.depth > 0, "end_transaction without a matching begin_transaction");
        self.depth -= 1;
        self.depth == 0
    }

    pub(crate) fn is_open(&self) -> bool {
        self.depth > 0
    }

    pub(crate) fn depth(&self) -> usize {
        self.depth
    }

    pub(crate) fn staged(&self) -> &StagedChanges {
        &self.staged
    }

    pub(crate) fn staged_mut(&mut self) -> &mut StagedChanges {
        debug_assert!(self.is_open(), "changes staged outside a transaction");
        &mut self.staged
    }

    pub(crate) fn take_staged(&mut self) -> StagedChanges {
        std::mem::take(&mut self.staged)
    }
}

/// A scoped transaction.
///
/// Dereferences to the graph; the transaction ends when the guard is dropped.
///
/// ```
/// use nodal_core::MutableGraph;
///
/// let mut graph = MutableGraph::new();
/// {
///     let mut tx = graph.transaction();
///     let a = tx.add_node();
///     let b = tx.add_node();
///     tx.add_edge(a, b).unwrap();
/// }
/// assert_eq!(graph.num_components(), 1);
/// ```
pub struct Transaction<'g> {
    graph: &'g mut MutableGraph,
}

impl<'g> Transaction<'g> {
    pub(crate) fn new(graph: &'g mut MutableGraph) -> Self {
        graph.begin_transaction();
        Self { graph }
    }
}

impl Deref for Transaction<'_> {
    type Target = MutableGraph;

    fn deref(&self) -> &MutableGraph {
        self.graph
    }
}

impl DerefMut for Transaction<'_> {
    fn deref_mut(&mut self) -> &mut MutableGraph {
        self.graph
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        // Committing while unwinding could panic a second time.
        if !std::thread::panicking() {
            self.graph.end_transaction();
        }
    }
}
