//! Mutable graph store.

use std::sync::Arc;

use indexmap::IndexSet;
use nodal_common::types::{ComponentId, EdgeId, ElementId, ElementType, NodeId};
use nodal_common::utils::error::{Error, Result};
use nodal_common::utils::hash::FxHashSet;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::component::{ComponentManager, ComponentMergeSet, GraphComponent};
use super::observer::{GraphObserver, ObserverId, ObserverList};
use super::transaction::{CommittedChanges, StagedChanges, Transaction, TransactionState};
use crate::array::{ArrayHost, ArrayRegistry};
use crate::id_space::ElementIdSpace;

/// Configuration for a [`MutableGraph`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Whether to track connected components.
    pub component_managed: bool,
    /// Initial capacity for nodes.
    pub initial_node_capacity: usize,
    /// Initial capacity for edges.
    pub initial_edge_capacity: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            component_managed: true,
            initial_node_capacity: 1024,
            initial_edge_capacity: 4096,
        }
    }
}

/// An edge and its endpoints.
///
/// Edges are stored directed but are undirected for connectivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    /// Handle of the edge.
    pub id: EdgeId,
    /// Source endpoint.
    pub source: NodeId,
    /// Target endpoint.
    pub target: NodeId,
}

impl Edge {
    const VACANT: Self = Self {
        id: EdgeId::NULL,
        source: NodeId::NULL,
        target: NodeId::NULL,
    };

    /// Returns true if both endpoints are the same node.
    #[must_use]
    pub fn is_loop(&self) -> bool {
        self.source == self.target
    }

    /// Returns the endpoint across from `node`.
    #[must_use]
    pub fn opposite(&self, node: NodeId) -> NodeId {
        if node == self.source {
            self.target
        } else {
            self.source
        }
    }
}

/// Adjacency of one node.
#[derive(Debug, Default)]
struct NodeRecord {
    out_edges: SmallVec<[EdgeId; 4]>,
    in_edges: SmallVec<[EdgeId; 4]>,
}

/// Nodes, edges and adjacency, without transactions or components.
#[derive(Debug)]
pub(crate) struct Topology {
    node_ids: ElementIdSpace<NodeId>,
    edge_ids: ElementIdSpace<EdgeId>,
    /// Indexed by NodeId.
    nodes: Vec<NodeRecord>,
    /// Indexed by EdgeId. Released slots hold [`Edge::VACANT`].
    edges: Vec<Edge>,
}

impl Topology {
    fn with_capacity(nodes: usize, edges: usize) -> Self {
        Self {
            node_ids: ElementIdSpace::with_capacity(nodes),
            edge_ids: ElementIdSpace::with_capacity(edges),
            nodes: Vec::with_capacity(nodes),
            edges: Vec::with_capacity(edges),
        }
    }

    fn add_node(&mut self) -> NodeId {
        let id = self.node_ids.allocate();
        if id.index() == self.nodes.len() {
            self.nodes.push(NodeRecord::default());
        }
        id
    }

    fn add_edge(&mut self, source: NodeId, target: NodeId) -> EdgeId {
        let id = self.edge_ids.allocate();
        let edge = Edge { id, source, target };
        if id.index() == self.edges.len() {
            self.edges.push(edge);
        } else {
            self.edges[id.index()] = edge;
        }

        self.nodes[source.index()].out_edges.push(id);
        self.nodes[target.index()].in_edges.push(id);
        id
    }

    /// Unlinks an edge and releases its handle.
    ///
    /// Endpoints in `dying` keep the edge in their lists; [`Self::remove_node`]
    /// drops those lists wholesale.
    fn remove_edge(&mut self, id: EdgeId, dying: &IndexSet<NodeId>) -> Edge {
        let edge = std::mem::replace(&mut self.edges[id.index()], Edge::VACANT);
        if !dying.contains(&edge.source) {
            unlink(&mut self.nodes[edge.source.index()].out_edges, id);
        }
        if !dying.contains(&edge.target) {
            unlink(&mut self.nodes[edge.target.index()].in_edges, id);
        }
        self.edge_ids.release(id);
        edge
    }

    /// Releases a node. Its edges must already be released.
    fn remove_node(&mut self, id: NodeId) {
        let record = &mut self.nodes[id.index()];
        debug_assert!(
            record
                .out_edges
                .iter()
                .chain(&record.in_edges)
                .all(|&edge| !self.edge_ids.is_in_use(edge)),
            "node {id} removed with edges still attached"
        );
        record.out_edges.clear();
        record.in_edges.clear();
        self.node_ids.release(id);
    }

    pub(crate) fn contains_node(&self, id: NodeId) -> bool {
        self.node_ids.is_in_use(id)
    }

    pub(crate) fn contains_edge(&self, id: EdgeId) -> bool {
        self.edge_ids.is_in_use(id)
    }

    pub(crate) fn edge(&self, id: EdgeId) -> Option<Edge> {
        self.contains_edge(id).then(|| self.edges[id.index()])
    }

    fn record(&self, node: NodeId) -> &NodeRecord {
        assert!(self.contains_node(node), "node {node} does not exist (stale handle?)");
        &self.nodes[node.index()]
    }

    /// Every edge touching `node`, outgoing first. Self-loops appear twice.
    pub(crate) fn edges_of(&self, node: NodeId) -> impl Iterator<Item = EdgeId> + '_ {
        let record = self.record(node);
        record.out_edges.iter().chain(&record.in_edges).copied()
    }

    /// `(edge, node across the edge)` for every edge touching `node`.
    pub(crate) fn neighbours(&self, node: NodeId) -> impl Iterator<Item = (EdgeId, NodeId)> + '_ {
        let record = self.record(node);
        let outgoing = record
            .out_edges
            .iter()
            .map(|&edge| (edge, self.edges[edge.index()].target));
        let incoming = record
            .in_edges
            .iter()
            .map(|&edge| (edge, self.edges[edge.index()].source));
        outgoing.chain(incoming)
    }
}

/// Slots whose handles were released by a commit.
#[derive(Debug, Default)]
struct ReleasedSlots {
    nodes: Vec<usize>,
    edges: Vec<usize>,
}

fn unlink(list: &mut SmallVec<[EdgeId; 4]>, id: EdgeId) {
    if let Some(position) = list.iter().position(|&edge| edge == id) {
        list.swap_remove(position);
    }
}

/// A graph mutated in transactions.
///
/// Nodes and edges are plain handles; per-element data lives in arrays
/// attached to the graph (see [`crate::array`]). Structural changes are
/// batched: additions take effect immediately, removals are staged, and
/// everything derived from the structure (array sizes, components,
/// notifications) is brought up to date when the outermost transaction ends.
///
/// Every mutating call made outside a transaction is a transaction of its
/// own.
pub struct MutableGraph {
    /// Configuration.
    config: GraphConfig,

    /// Live nodes and edges.
    topology: Topology,

    /// Nesting depth and staged changes.
    transaction: TransactionState,

    /// Arrays attached to this graph.
    registry: Arc<ArrayRegistry>,

    /// Present on component-managed graphs.
    components: Option<ComponentManager>,

    observers: ObserverList,
}

impl MutableGraph {
    /// Creates a component-managed graph with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(GraphConfig::default())
    }

    /// Creates a graph that does not track components.
    #[must_use]
    pub fn plain() -> Self {
        Self::with_config(GraphConfig {
            component_managed: false,
            ..GraphConfig::default()
        })
    }

    /// Creates a graph with a custom configuration.
    #[must_use]
    pub fn with_config(config: GraphConfig) -> Self {
        let registry = ArrayRegistry::new(config.component_managed);
        let components = config
            .component_managed
            .then(|| ComponentManager::new(&registry));

        Self {
            topology: Topology::with_capacity(
                config.initial_node_capacity,
                config.initial_edge_capacity,
            ),
            transaction: TransactionState::default(),
            registry,
            components,
            observers: ObserverList::default(),
            config,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Returns true if the graph tracks components.
    #[must_use]
    pub fn is_component_managed(&self) -> bool {
        self.components.is_some()
    }

    // === Node Operations ===

    /// Adds a node.
    pub fn add_node(&mut self) -> NodeId {
        self.perform(|graph| {
            let id = graph.topology.add_node();
            graph.transaction.staged_mut().added_nodes.push(id);
            id
        })
    }

    /// Adds `count` nodes in one transaction.
    pub fn add_nodes(&mut self, count: usize) -> Vec<NodeId> {
        self.perform(|graph| (0..count).map(|_| graph.add_node()).collect())
    }

    /// Stages a node and its edges for removal.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not a live node.
    pub fn remove_node(&mut self, id: NodeId) {
        assert!(
            self.topology.contains_node(id),
            "remove_node: node {id} does not exist (stale handle?)"
        );
        self.perform(|graph| {
            graph.transaction.staged_mut().removed_nodes.insert(id);
        });
    }

    /// Stages several nodes for removal in one transaction.
    pub fn remove_nodes(&mut self, ids: impl IntoIterator<Item = NodeId>) {
        self.perform(|graph| ids.into_iter().for_each(|id| graph.remove_node(id)));
    }

    // === Edge Operations ===

    /// Adds an edge from `source` to `target`.
    ///
    /// Fails if either endpoint is staged for removal in the open
    /// transaction.
    ///
    /// # Panics
    ///
    /// Panics if either endpoint is not a live node.
    pub fn add_edge(&mut self, source: NodeId, target: NodeId) -> Result<EdgeId> {
        for node in [source, target] {
            assert!(
                self.topology.contains_node(node),
                "add_edge: node {node} does not exist (stale handle?)"
            );
            if self.transaction.staged().removed_nodes.contains(&node) {
                tracing::warn!(%source, %target, %node, "edge rejected, endpoint is being removed");
                return Err(Error::DanglingReference { node });
            }
        }

        Ok(self.perform(|graph| {
            let id = graph.topology.add_edge(source, target);
            graph.transaction.staged_mut().added_edges.push(id);
            id
        }))
    }

    /// Adds several edges in one transaction.
    ///
    /// Stops at the first rejected edge; edges added before it are kept.
    pub fn add_edges(
        &mut self,
        edges: impl IntoIterator<Item = (NodeId, NodeId)>,
    ) -> Result<Vec<EdgeId>> {
        self.perform(|graph| {
            edges
                .into_iter()
                .map(|(source, target)| graph.add_edge(source, target))
                .collect()
        })
    }

    /// Stages an edge for removal.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not a live edge.
    pub fn remove_edge(&mut self, id: EdgeId) {
        assert!(
            self.topology.contains_edge(id),
            "remove_edge: edge {id} does not exist (stale handle?)"
        );
        self.perform(|graph| {
            graph.transaction.staged_mut().removed_edges.insert(id);
        });
    }

    /// Stages several edges for removal in one transaction.
    pub fn remove_edges(&mut self, ids: impl IntoIterator<Item = EdgeId>) {
        self.perform(|graph| ids.into_iter().for_each(|id| graph.remove_edge(id)));
    }

    /// Removes every node and edge in one transaction.
    pub fn clear(&mut self) {
        self.perform(|graph| {
            let nodes: Vec<NodeId> = graph.topology.node_ids.iter().collect();
            graph.transaction.staged_mut().removed_nodes.extend(nodes);
        });
    }

    // === Queries ===

    /// Returns the number of live nodes.
    #[must_use]
    pub fn num_nodes(&self) -> usize {
        self.topology.node_ids.len()
    }

    /// Returns the number of live edges.
    #[must_use]
    pub fn num_edges(&self) -> usize {
        self.topology.edge_ids.len()
    }

    /// Iterates the live nodes, ascending.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.topology.node_ids.iter()
    }

    /// Iterates the live edges, ascending.
    pub fn edge_ids(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.topology.edge_ids.iter()
    }

    /// Returns true if `id` is a live node. Nodes staged for removal are
    /// live until the transaction ends.
    #[must_use]
    pub fn contains_node(&self, id: NodeId) -> bool {
        self.topology.contains_node(id)
    }

    /// Returns true if `id` is a live edge.
    #[must_use]
    pub fn contains_edge(&self, id: EdgeId) -> bool {
        self.topology.contains_edge(id)
    }

    /// Returns an edge with its endpoints.
    #[must_use]
    pub fn edge_by_id(&self, id: EdgeId) -> Option<Edge> {
        self.topology.edge(id)
    }

    /// Iterates every edge touching `node`, outgoing first.
    ///
    /// A self-loop is reported twice.
    pub fn edges_of(&self, node: NodeId) -> impl Iterator<Item = EdgeId> + '_ {
        self.topology.edges_of(node)
    }

    /// Returns the edges ending at `node`.
    #[must_use]
    pub fn in_edges(&self, node: NodeId) -> &[EdgeId] {
        &self.topology.record(node).in_edges
    }

    /// Returns the edges starting at `node`.
    #[must_use]
    pub fn out_edges(&self, node: NodeId) -> &[EdgeId] {
        &self.topology.record(node).out_edges
    }

    /// Iterates the nodes across every edge touching `node`.
    pub fn neighbours(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.topology.neighbours(node).map(|(_, neighbour)| neighbour)
    }

    /// Returns the number of edge ends at `node`. A self-loop counts twice.
    #[must_use]
    pub fn degree(&self, node: NodeId) -> usize {
        let record = self.topology.record(node);
        record.out_edges.len() + record.in_edges.len()
    }

    /// Returns true if `node` is staged for removal in the open transaction.
    #[must_use]
    pub fn is_node_removal_pending(&self, node: NodeId) -> bool {
        self.transaction.staged().removed_nodes.contains(&node)
    }

    /// Returns true if `edge` is staged for removal in the open transaction.
    #[must_use]
    pub fn is_edge_removal_pending(&self, edge: EdgeId) -> bool {
        self.transaction.staged().removed_edges.contains(&edge)
    }

    /// One past the highest node handle ever issued.
    #[must_use]
    pub fn next_node_id(&self) -> usize {
        self.topology.node_ids.capacity()
    }

    /// One past the highest edge handle ever issued.
    #[must_use]
    pub fn next_edge_id(&self) -> usize {
        self.topology.edge_ids.capacity()
    }

    // === Components ===

    /// Returns the component of `node`.
    ///
    /// Null on plain graphs and for nodes added in the open transaction.
    ///
    /// # Panics
    ///
    /// Panics if `node` has been released.
    #[must_use]
    pub fn component_id_of_node(&self, node: NodeId) -> ComponentId {
        assert!(
            self.topology.contains_node(node),
            "component_id_of_node: node {node} does not exist (stale handle?)"
        );
        self.components
            .as_ref()
            .map_or(ComponentId::NULL, |manager| manager.component_id_of_node(node))
    }

    /// Returns the component of `edge`.
    ///
    /// Null on plain graphs and for edges added in the open transaction.
    ///
    /// # Panics
    ///
    /// Panics if `edge` has been released.
    #[must_use]
    pub fn component_id_of_edge(&self, edge: EdgeId) -> ComponentId {
        assert!(
            self.topology.contains_edge(edge),
            "component_id_of_edge: edge {edge} does not exist (stale handle?)"
        );
        self.components
            .as_ref()
            .map_or(ComponentId::NULL, |manager| manager.component_id_of_edge(edge))
    }

    /// Returns a component by id.
    #[must_use]
    pub fn component_by_id(&self, id: ComponentId) -> Option<&GraphComponent> {
        self.components.as_ref()?.component_by_id(id)
    }

    /// Iterates the live components, ascending. Empty on plain graphs.
    pub fn component_ids(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.components
            .iter()
            .flat_map(ComponentManager::component_ids)
    }

    /// Returns the number of components.
    #[must_use]
    pub fn num_components(&self) -> usize {
        self.components
            .as_ref()
            .map_or(0, ComponentManager::num_components)
    }

    /// Returns the component with the most nodes, ties going to the lowest
    /// id. Null if there are no components.
    #[must_use]
    pub fn largest_component_id(&self) -> ComponentId {
        self.components
            .as_ref()
            .map_or(ComponentId::NULL, ComponentManager::largest_component_id)
    }

    // === Observers ===

    /// Subscribes an observer.
    pub fn subscribe(&mut self, observer: Box<dyn GraphObserver>) -> ObserverId {
        self.observers.subscribe(observer)
    }

    /// Unsubscribes an observer. Returns false if it was not subscribed.
    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        self.observers.unsubscribe(id)
    }

    /// Returns the number of subscribed observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    fn notify(&mut self, mut f: impl FnMut(&mut dyn GraphObserver, &MutableGraph)) {
        if self.observers.is_empty() {
            return;
        }
        let mut observers = std::mem::take(&mut self.observers);
        let graph: &MutableGraph = self;
        observers.notify(|observer| f(observer, graph));
        self.observers = observers;
    }

    // === Transactions ===

    /// Returns true while a transaction is open.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.transaction.is_open()
    }

    /// Opens a transaction. Transactions nest; observers hear about the
    /// outermost one only.
    pub fn begin_transaction(&mut self) {
        if self.transaction.enter() {
            self.notify(|observer, graph| observer.graph_will_change(graph));
        }
    }

    /// Closes a transaction. Closing the outermost one commits it.
    ///
    /// # Panics
    ///
    /// Panics without a matching [`begin_transaction`](Self::begin_transaction).
    pub fn end_transaction(&mut self) {
        if !self.transaction.leave() {
            return;
        }

        let staged = self.transaction.take_staged();
        let (changes, released) = self.apply(staged);
        let change_occurred = !changes.is_empty();

        if change_occurred {
            self.evaluate_components(&changes);
        }
        // Component labels of removed elements are read above, so defaults
        // only go back in once evaluation is done.
        self.registry.reset(ElementType::Node, &released.nodes);
        self.registry.reset(ElementType::Edge, &released.edges);

        tracing::debug!(
            added_nodes = changes.added_nodes.len(),
            added_edges = changes.added_edges.len(),
            removed_nodes = changes.removed_nodes.len(),
            removed_edges = changes.removed_edges.len(),
            "transaction committed"
        );

        self.notify(|observer, graph| observer.graph_changed(graph, change_occurred));
    }

    /// Opens a transaction that ends when the returned guard is dropped.
    pub fn transaction(&mut self) -> Transaction<'_> {
        Transaction::new(self)
    }

    /// Runs `f` inside one transaction.
    pub fn perform<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.begin_transaction();
        let result = f(self);
        self.end_transaction();
        result
    }

    /// Applies staged removals and computes the net changes.
    fn apply(&mut self, staged: StagedChanges) -> (CommittedChanges, ReleasedSlots) {
        let StagedChanges {
            added_nodes,
            added_edges,
            removed_nodes,
            mut removed_edges,
        } = staged;

        for &node in &removed_nodes {
            removed_edges.extend(self.topology.edges_of(node));
        }

        let added_node_set: FxHashSet<NodeId> = added_nodes.iter().copied().collect();
        let added_edge_set: FxHashSet<EdgeId> = added_edges.iter().copied().collect();

        let added_edges = added_edges
            .into_iter()
            .filter(|id| !removed_edges.contains(id))
            .filter_map(|id| self.topology.edge(id))
            .collect();
        let added_nodes = added_nodes
            .into_iter()
            .filter(|id| !removed_nodes.contains(id))
            .collect();

        let mut changes = CommittedChanges {
            added_nodes,
            added_edges,
            removed_nodes: Vec::with_capacity(removed_nodes.len()),
            removed_edges: Vec::with_capacity(removed_edges.len()),
        };

        let mut released = ReleasedSlots::default();
        for id in removed_edges {
            let edge = self.topology.remove_edge(id, &removed_nodes);
            released.edges.push(id.index());
            if !added_edge_set.contains(&id) {
                changes.removed_edges.push(edge);
            }
        }
        for id in removed_nodes {
            self.topology.remove_node(id);
            released.nodes.push(id.index());
            if !added_node_set.contains(&id) {
                changes.removed_nodes.push(id);
            }
        }

        self.registry.resize(
            ElementType::Node,
            self.topology.node_ids.capacity(),
            self.topology.node_ids.last_in_use().map(ElementId::index),
        );
        self.registry.resize(
            ElementType::Edge,
            self.topology.edge_ids.capacity(),
            self.topology.edge_ids.last_in_use().map(ElementId::index),
        );

        (changes, released)
    }

    /// Brings components up to date and reports what happened, in order:
    /// splits, merges, added, removed.
    fn evaluate_components(&mut self, changes: &CommittedChanges) {
        let Some(manager) = self.components.as_mut() else {
            return;
        };

        let splits = manager.apply_removals(&self.topology, changes);
        let plan = manager.plan_additions(changes);
        manager.sync_arrays();
        let merges: Vec<ComponentMergeSet> = plan.merges().cloned().collect();

        for split in &splits {
            self.notify(|observer, graph| observer.component_split(graph, split));
        }
        for merge in &merges {
            self.notify(|observer, graph| observer.components_will_merge(graph, merge));
        }

        let Some(manager) = self.components.as_mut() else {
            return;
        };
        manager.apply_additions(plan);
        let created = manager.created().to_vec();
        let doomed = manager.doomed().to_vec();

        for (component, has_split) in created {
            self.notify(|observer, graph| observer.component_added(graph, component, has_split));
        }
        for (component, has_merged) in doomed {
            self.notify(|observer, graph| {
                observer.component_will_be_removed(graph, component, has_merged);
            });
        }

        if let Some(manager) = self.components.as_mut() {
            manager.finish();
        }
    }
}

impl Default for MutableGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ArrayHost for MutableGraph {
    fn array_registry(&self) -> &Arc<ArrayRegistry> {
        &self.registry
    }
}

impl Drop for MutableGraph {
    fn drop(&mut self) {
        self.registry.invalidate_all();
    }
}

impl std::fmt::Debug for MutableGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutableGraph")
            .field("nodes", &self.num_nodes())
            .field("edges", &self.num_edges())
            .field("components", &self.components)
            .field("transaction_depth", &self.transaction.depth())
            .field("observers", &self.observers)
            .finish_non_exhaustive()
    }
}
