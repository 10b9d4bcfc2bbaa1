//! Incremental connected components.
//!
//! The manager keeps a partition of the live nodes into connected components
//! and updates it from the net changes of each committed transaction instead
//! of recomputing connectivity from scratch.
//!
//! # Removals
//!
//! The live endpoints of removed edges (including the neighbours of removed
//! nodes) are seeds. Two seeds of the same component are checked with a
//! bidirectional breadth-first search over the remaining edges that stops as
//! soon as one side runs out of nodes. That side is then a complete piece of
//! the old component, and the smaller one as far as the search could tell: it
//! gets a fresh id while the other side keeps the old one. The cost is
//! bounded by the size of the pieces that actually split off.
//!
//! # Additions
//!
//! New nodes and the endpoints of new edges are grouped with a small
//! union-find. A group that touches no existing component becomes a new
//! component, a group touching exactly one grows it, and a group touching
//! several merges them. The largest merging component survives and keeps its
//! id; on a tie the one encountered first (walking the new edges in insertion
//! order, source before target) wins. Only the smaller components are
//! relabeled.

use std::collections::VecDeque;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use nodal_common::types::{ComponentId, EdgeId, ElementId, ElementType, NodeId};
use nodal_common::utils::hash::FxHashSet;

use super::store::{MutableGraph, Topology};
use super::transaction::CommittedChanges;
use crate::array::{ArrayReadGuard, ArrayRegistry, EdgeArray, NodeArray, Unlocked};
use crate::id_space::ElementIdSpace;

/// The nodes and edges of one connected component.
#[derive(Debug, Clone, Default)]
pub struct GraphComponent {
    node_ids: IndexSet<NodeId>,
    edge_ids: IndexSet<EdgeId>,
}

impl GraphComponent {
    /// Iterates the component's nodes.
    pub fn node_ids(&self) -> impl ExactSizeIterator<Item = NodeId> + '_ {
        self.node_ids.iter().copied()
    }

    /// Iterates the component's edges.
    pub fn edge_ids(&self) -> impl ExactSizeIterator<Item = EdgeId> + '_ {
        self.edge_ids.iter().copied()
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn num_nodes(&self) -> usize {
        self.node_ids.len()
    }

    /// Returns the number of edges.
    #[must_use]
    pub fn num_edges(&self) -> usize {
        self.edge_ids.len()
    }

    /// Returns true if `node` belongs to this component.
    #[must_use]
    pub fn contains_node(&self, node: NodeId) -> bool {
        self.node_ids.contains(&node)
    }
}

/// A component that split into several.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentSplitSet {
    old_component_id: ComponentId,
    splitters: Vec<ComponentId>,
}

impl ComponentSplitSet {
    /// The component that split. One of the pieces keeps this id.
    #[must_use]
    pub fn old_component_id(&self) -> ComponentId {
        self.old_component_id
    }

    /// The ids of the pieces that split off, in creation order.
    #[must_use]
    pub fn splitters(&self) -> &[ComponentId] {
        &self.splitters
    }

    /// Returns the largest piece, including the one that kept the old id.
    /// Ties go to the lowest id.
    #[must_use]
    pub fn largest_component_id(&self, graph: &MutableGraph) -> ComponentId {
        std::iter::once(self.old_component_id)
            .chain(self.splitters.iter().copied())
            .max_by_key(|&id| {
                let size = graph.component_by_id(id).map_or(0, GraphComponent::num_nodes);
                (size, std::cmp::Reverse(id))
            })
            .unwrap_or(self.old_component_id)
    }

    /// Returns the nodes of every piece.
    #[must_use]
    pub fn node_ids(&self, graph: &MutableGraph) -> Vec<NodeId> {
        std::iter::once(&self.old_component_id)
            .chain(&self.splitters)
            .filter_map(|&id| graph.component_by_id(id))
            .flat_map(GraphComponent::node_ids)
            .collect()
    }
}

/// Components that merged into one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentMergeSet {
    mergers: Vec<ComponentId>,
    new_component_id: ComponentId,
}

impl ComponentMergeSet {
    /// Every merging component, the survivor included, ascending.
    #[must_use]
    pub fn mergers(&self) -> &[ComponentId] {
        &self.mergers
    }

    /// The component the others merge into.
    #[must_use]
    pub fn new_component_id(&self) -> ComponentId {
        self.new_component_id
    }

    /// Returns the nodes of every merging component.
    ///
    /// Only complete while notifications for the merge are running.
    #[must_use]
    pub fn node_ids(&self, graph: &MutableGraph) -> Vec<NodeId> {
        self.mergers
            .iter()
            .filter_map(|&id| graph.component_by_id(id))
            .flat_map(GraphComponent::node_ids)
            .collect()
    }
}

/// What happened to one group of new elements.
#[derive(Debug)]
enum GroupOutcome {
    /// The group touched no existing component.
    New,
    /// The group touched exactly one existing component.
    Grow,
    /// The group touched several; the others merge into `target`.
    Merge(ComponentMergeSet),
}

#[derive(Debug)]
struct PlannedGroup {
    target: ComponentId,
    new_nodes: Vec<NodeId>,
    new_edges: Vec<EdgeId>,
    outcome: GroupOutcome,
}

/// Additions of one transaction, grouped and resolved to target components.
#[derive(Debug, Default)]
pub(crate) struct AdditionPlan {
    groups: Vec<PlannedGroup>,
}

impl AdditionPlan {
    pub(crate) fn merges(&self) -> impl Iterator<Item = &ComponentMergeSet> + '_ {
        self.groups.iter().filter_map(|group| match &group.outcome {
            GroupOutcome::Merge(merge) => Some(merge),
            _ => None,
        })
    }
}

/// Union-find key: an existing component, or a node without one yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum GroupKey {
    Component(ComponentId),
    Node(NodeId),
}

/// Result of a bidirectional search between two seeds.
enum Search {
    Connected(FxHashSet<NodeId>),
    Separated(Vec<NodeId>),
}

enum Step {
    Met,
    Exhausted,
    Continue,
}

/// Keeps the components of a graph up to date.
pub(crate) struct ComponentManager {
    ids: ElementIdSpace<ComponentId>,
    components: Vec<Option<GraphComponent>>,
    node_components: NodeArray<ComponentId>,
    edge_components: EdgeArray<ComponentId>,
    registry: Arc<ArrayRegistry>,
    /// Components to drop once notifications are out, with their merged flag.
    doomed: Vec<(ComponentId, bool)>,
    /// Components created by the current commit, with their split flag.
    created: Vec<(ComponentId, bool)>,
}

impl ComponentManager {
    pub(crate) fn new(registry: &Arc<ArrayRegistry>) -> Self {
        Self {
            ids: ElementIdSpace::new(),
            components: Vec::new(),
            node_components: NodeArray::attach(registry, ComponentId::NULL),
            edge_components: EdgeArray::attach(registry, ComponentId::NULL),
            registry: Arc::clone(registry),
            doomed: Vec::new(),
            created: Vec::new(),
        }
    }

    // === Queries ===

    /// Returns the live component ids, ascending.
    pub(crate) fn component_ids(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.ids.iter()
    }

    /// Returns the number of components.
    #[must_use]
    pub(crate) fn num_components(&self) -> usize {
        self.ids.len()
    }

    /// Returns a component by id.
    #[must_use]
    pub(crate) fn component_by_id(&self, id: ComponentId) -> Option<&GraphComponent> {
        if id.is_null() {
            return None;
        }
        self.components.get(id.index()).and_then(Option::as_ref)
    }

    /// Returns the component of `node`, or null if it has none yet.
    #[must_use]
    pub(crate) fn component_id_of_node(&self, node: NodeId) -> ComponentId {
        let values = self.node_components.read();
        if node.is_null() || node.index() >= values.len() {
            return ComponentId::NULL;
        }
        values[node]
    }

    /// Returns the component of `edge`, or null if it has none yet.
    #[must_use]
    pub(crate) fn component_id_of_edge(&self, edge: EdgeId) -> ComponentId {
        let values = self.edge_components.read();
        if edge.is_null() || edge.index() >= values.len() {
            return ComponentId::NULL;
        }
        values[edge]
    }

    /// Returns the component with the most nodes. Ties go to the lowest id.
    #[must_use]
    pub(crate) fn largest_component_id(&self) -> ComponentId {
        self.ids
            .iter()
            .max_by_key(|&id| {
                let size = self.component_by_id(id).map_or(0, GraphComponent::num_nodes);
                (size, std::cmp::Reverse(id))
            })
            .unwrap_or(ComponentId::NULL)
    }

    // === Commit phases ===

    fn component_mut(&mut self, id: ComponentId) -> &mut GraphComponent {
        let index = id.index();
        if index >= self.components.len() {
            self.components.resize_with(index + 1, || None);
        }
        self.components[index].get_or_insert_with(GraphComponent::default)
    }

    fn allocate(&mut self, has_split: bool) -> ComponentId {
        let id = self.ids.allocate();
        self.components.resize_with(self.components.len().max(id.index() + 1), || None);
        self.components[id.index()] = Some(GraphComponent::default());
        self.created.push((id, has_split));
        id
    }

    /// Detaches removed elements from their components and splits what fell
    /// apart.
    pub(crate) fn apply_removals(
        &mut self,
        topology: &Topology,
        changes: &CommittedChanges,
    ) -> Vec<ComponentSplitSet> {
        if changes.removed_nodes.is_empty() && changes.removed_edges.is_empty() {
            return Vec::new();
        }

        // Components losing every node disappear with their records intact.
        let mut removed_per_component: IndexMap<ComponentId, usize> = IndexMap::new();
        for &node in &changes.removed_nodes {
            let component = self.component_id_of_node(node);
            if component.is_valid() {
                *removed_per_component.entry(component).or_insert(0) += 1;
            }
        }
        for (component, removed) in removed_per_component {
            let size = self.component_by_id(component).map_or(0, GraphComponent::num_nodes);
            if removed == size {
                self.doomed.push((component, false));
            }
        }
        let doomed: FxHashSet<ComponentId> = self.doomed.iter().map(|&(id, _)| id).collect();

        let mut seeds: IndexMap<ComponentId, IndexSet<NodeId>> = IndexMap::new();

        for edge in &changes.removed_edges {
            let component = self.component_id_of_edge(edge.id);
            self.edge_components.set(edge.id, ComponentId::NULL);
            if component.is_null() || doomed.contains(&component) {
                continue;
            }

            self.component_mut(component).edge_ids.swap_remove(&edge.id);
            let entry = seeds.entry(component).or_default();
            for endpoint in [edge.source, edge.target] {
                if topology.contains_node(endpoint) {
                    entry.insert(endpoint);
                }
            }
        }

        for &node in &changes.removed_nodes {
            let component = self.component_id_of_node(node);
            self.node_components.set(node, ComponentId::NULL);
            if component.is_valid() && !doomed.contains(&component) {
                self.component_mut(component).node_ids.swap_remove(&node);
            }
        }

        let mut splits = Vec::new();
        for (component, seeds) in seeds {
            if let Some(split) = self.split(topology, component, seeds) {
                tracing::trace!(
                    component = %split.old_component_id,
                    pieces = split.splitters.len() + 1,
                    "component split"
                );
                splits.push(split);
            }
        }
        splits
    }

    /// Checks that the seeds of `component` are still connected, relabeling
    /// every piece that is not.
    fn split(
        &mut self,
        topology: &Topology,
        component: ComponentId,
        mut seeds: IndexSet<NodeId>,
    ) -> Option<ComponentSplitSet> {
        let mut splitters = Vec::new();

        while seeds.len() >= 2 {
            let (a, b) = (seeds[0], seeds[1]);
            let search = {
                let edge_labels = self.edge_components.read();
                bidirectional_search(topology, &edge_labels, component, a, b)
            };
            match search {
                Search::Connected(visited) => {
                    for node in visited.iter().filter(|&&node| node != a) {
                        seeds.swap_remove(node);
                    }
                }
                Search::Separated(piece) => {
                    let splitter = self.allocate(true);
                    self.relabel(topology, &piece, component, splitter);
                    splitters.push(splitter);
                    for node in &piece {
                        seeds.swap_remove(node);
                    }
                }
            }
        }

        (!splitters.is_empty()).then_some(ComponentSplitSet {
            old_component_id: component,
            splitters,
        })
    }

    /// Moves `nodes` and their edges from `from` to `to`.
    fn relabel(
        &mut self,
        topology: &Topology,
        nodes: &[NodeId],
        from: ComponentId,
        to: ComponentId,
    ) {
        let mut moved_edges = Vec::new();
        {
            let mut node_labels = self.node_components.write();
            let mut edge_labels = self.edge_components.write();
            for &node in nodes {
                node_labels[node] = to;
                for (edge, _) in topology.neighbours(node) {
                    if edge_labels[edge] == from {
                        edge_labels[edge] = to;
                        moved_edges.push(edge);
                    }
                }
            }
        }

        let source = self.component_mut(from);
        for node in nodes {
            source.node_ids.swap_remove(node);
        }
        for edge in &moved_edges {
            source.edge_ids.swap_remove(edge);
        }

        let target = self.component_mut(to);
        target.node_ids.extend(nodes.iter().copied());
        target.edge_ids.extend(moved_edges);
    }

    /// Groups the added elements and decides where each group goes.
    ///
    /// Ids for brand new components are allocated here so component arrays
    /// can be sized before anyone is notified.
    pub(crate) fn plan_additions(&mut self, changes: &CommittedChanges) -> AdditionPlan {
        if changes.added_nodes.is_empty() && changes.added_edges.is_empty() {
            return AdditionPlan::default();
        }

        let mut keys: IndexSet<GroupKey> = IndexSet::new();
        let mut parents: Vec<usize> = Vec::new();

        let key_of = |node: NodeId, keys: &mut IndexSet<GroupKey>, parents: &mut Vec<usize>| {
            let component = self.component_id_of_node(node);
            let key = if component.is_null() {
                GroupKey::Node(node)
            } else {
                GroupKey::Component(component)
            };
            let (index, inserted) = keys.insert_full(key);
            if inserted {
                parents.push(index);
            }
            index
        };

        let mut edge_keys = Vec::with_capacity(changes.added_edges.len());
        for edge in &changes.added_edges {
            let source = key_of(edge.source, &mut keys, &mut parents);
            let target = key_of(edge.target, &mut keys, &mut parents);
            union(&mut parents, source, target);
            edge_keys.push((edge.id, source));
        }
        for &node in &changes.added_nodes {
            key_of(node, &mut keys, &mut parents);
        }

        // Groups in order of their first key.
        let mut groups: IndexMap<usize, Vec<usize>> = IndexMap::new();
        for index in 0..keys.len() {
            let root = find(&mut parents, index);
            groups.entry(root).or_default().push(index);
        }

        let mut edges_per_group: IndexMap<usize, Vec<EdgeId>> = IndexMap::new();
        for (edge, key) in edge_keys {
            let root = find(&mut parents, key);
            edges_per_group.entry(root).or_default().push(edge);
        }

        let mut plan = AdditionPlan::default();
        for (root, members) in groups {
            let mut existing = Vec::new();
            let mut new_nodes = Vec::new();
            for index in members {
                match keys[index] {
                    GroupKey::Component(component) => existing.push(component),
                    GroupKey::Node(node) => new_nodes.push(node),
                }
            }
            let new_edges = edges_per_group.swap_remove(&root).unwrap_or_default();

            let (target, outcome) = match existing.len() {
                0 => (self.allocate(false), GroupOutcome::New),
                1 => (existing[0], GroupOutcome::Grow),
                _ => {
                    // Largest wins; `existing` is in encounter order and
                    // max_by_key keeps the last maximum, hence the reverse.
                    let survivor = existing
                        .iter()
                        .rev()
                        .copied()
                        .max_by_key(|&id| {
                            self.component_by_id(id).map_or(0, GraphComponent::num_nodes)
                        })
                        .unwrap_or(existing[0]);
                    let mut mergers = existing.clone();
                    mergers.sort_unstable();
                    (
                        survivor,
                        GroupOutcome::Merge(ComponentMergeSet {
                            mergers,
                            new_component_id: survivor,
                        }),
                    )
                }
            };

            plan.groups.push(PlannedGroup {
                target,
                new_nodes,
                new_edges,
                outcome,
            });
        }
        plan
    }

    /// Applies a plan: merges components and labels the new elements.
    pub(crate) fn apply_additions(&mut self, plan: AdditionPlan) {
        for group in plan.groups {
            if let GroupOutcome::Merge(merge) = &group.outcome {
                tracing::trace!(
                    survivor = %merge.new_component_id,
                    mergers = merge.mergers.len(),
                    "components merged"
                );
                for &merger in &merge.mergers {
                    if merger != group.target {
                        self.absorb(merger, group.target);
                        self.doomed.push((merger, true));
                    }
                }
            }

            {
                let mut node_labels = self.node_components.write();
                for &node in &group.new_nodes {
                    node_labels[node] = group.target;
                }
                let mut edge_labels = self.edge_components.write();
                for &edge in &group.new_edges {
                    edge_labels[edge] = group.target;
                }
            }

            let target = self.component_mut(group.target);
            target.node_ids.extend(group.new_nodes);
            target.edge_ids.extend(group.new_edges);
        }
    }

    /// Copies `from` into `into` and relabels its elements. The record of
    /// `from` is left intact until [`finish`](Self::finish).
    fn absorb(&mut self, from: ComponentId, into: ComponentId) {
        let Some(source) = self.component_by_id(from).cloned() else {
            return;
        };

        {
            let mut node_labels = self.node_components.write();
            for node in source.node_ids() {
                node_labels[node] = into;
            }
            let mut edge_labels = self.edge_components.write();
            for edge in source.edge_ids() {
                edge_labels[edge] = into;
            }
        }

        let target = self.component_mut(into);
        target.node_ids.extend(source.node_ids);
        target.edge_ids.extend(source.edge_ids);
    }

    /// Grows component arrays to cover every allocated component id.
    pub(crate) fn sync_arrays(&self) {
        let last = self.ids.last_in_use().map(ElementId::index);
        self.registry
            .resize(ElementType::Component, self.ids.capacity(), last);
    }

    /// Components created by this commit, with their split flag.
    pub(crate) fn created(&self) -> &[(ComponentId, bool)] {
        &self.created
    }

    /// Components going away in this commit, with their merged flag.
    pub(crate) fn doomed(&self) -> &[(ComponentId, bool)] {
        &self.doomed
    }

    /// Drops the records of removed components and releases their ids.
    pub(crate) fn finish(&mut self) {
        let mut released = Vec::with_capacity(self.doomed.len());
        for (id, _) in std::mem::take(&mut self.doomed) {
            self.components[id.index()] = None;
            self.ids.release(id);
            released.push(id.index());
        }
        self.created.clear();
        self.registry.reset(ElementType::Component, &released);

        let last = self.ids.last_in_use().map(ElementId::index);
        self.registry
            .resize(ElementType::Component, self.ids.capacity(), last);
    }
}

impl std::fmt::Debug for ComponentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentManager")
            .field("components", &self.ids.len())
            .field("capacity", &self.ids.capacity())
            .finish()
    }
}

fn find(parents: &mut [usize], mut index: usize) -> usize {
    while parents[index] != index {
        parents[index] = parents[parents[index]];
        index = parents[index];
    }
    index
}

/// Unions two sets, keeping the root with the lower index so the root of a
/// group is always its first-encountered key.
fn union(parents: &mut [usize], a: usize, b: usize) {
    let a = find(parents, a);
    let b = find(parents, b);
    if a != b {
        let (low, high) = if a < b { (a, b) } else { (b, a) };
        parents[high] = low;
    }
}

type EdgeLabels<'a> = ArrayReadGuard<'a, EdgeId, ComponentId, Unlocked>;

/// Searches outward from `a` and `b` in lockstep until the frontiers meet or
/// one of them runs out. Only edges labeled `component` are followed, so
/// edges added by the transaction being committed are ignored.
fn bidirectional_search(
    topology: &Topology,
    edge_labels: &EdgeLabels<'_>,
    component: ComponentId,
    a: NodeId,
    b: NodeId,
) -> Search {
    let mut visited_a = FxHashSet::default();
    let mut visited_b = FxHashSet::default();
    visited_a.insert(a);
    visited_b.insert(b);

    if a == b {
        return Search::Connected(visited_a);
    }

    let mut queue_a = VecDeque::from([a]);
    let mut queue_b = VecDeque::from([b]);

    loop {
        let step = expand(
            topology,
            edge_labels,
            component,
            &mut queue_a,
            &mut visited_a,
            &visited_b,
        );
        match step {
            Step::Met => {
                visited_a.extend(visited_b);
                return Search::Connected(visited_a);
            }
            Step::Exhausted => return Search::Separated(visited_a.into_iter().collect()),
            Step::Continue => {}
        }
        let step = expand(
            topology,
            edge_labels,
            component,
            &mut queue_b,
            &mut visited_b,
            &visited_a,
        );
        match step {
            Step::Met => {
                visited_a.extend(visited_b);
                return Search::Connected(visited_a);
            }
            Step::Exhausted => return Search::Separated(visited_b.into_iter().collect()),
            Step::Continue => {}
        }
    }
}

fn expand(
    topology: &Topology,
    edge_labels: &EdgeLabels<'_>,
    component: ComponentId,
    queue: &mut VecDeque<NodeId>,
    own: &mut FxHashSet<NodeId>,
    other: &FxHashSet<NodeId>,
) -> Step {
    let Some(node) = queue.pop_front() else {
        return Step::Exhausted;
    };

    for (edge, neighbour) in topology.neighbours(node) {
        if edge_labels[edge] != component {
            continue;
        }
        if other.contains(&neighbour) {
            return Step::Met;
        }
        if own.insert(neighbour) {
            queue.push_back(neighbour);
        }
    }

    if queue.is_empty() {
        Step::Exhausted
    } else {
        Step::Continue
    }
}
