//! Random transactions compared against connectivity computed from scratch.

use std::collections::{BTreeMap, BTreeSet};

use nodal_core::{ComponentId, MutableGraph, NodeArray, NodeId};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Operation {
    AddNode,
    AddEdge { source: usize, target: usize },
    RemoveNode { node: usize },
    RemoveEdge { edge: usize },
}

fn arb_operation() -> impl Strategy<Value = Operation> {
    prop_oneof![
        3 => Just(Operation::AddNode),
        4 => (any::<usize>(), any::<usize>())
            .prop_map(|(source, target)| Operation::AddEdge { source, target }),
        1 => any::<usize>().prop_map(|node| Operation::RemoveNode { node }),
        2 => any::<usize>().prop_map(|edge| Operation::RemoveEdge { edge }),
    ]
}

fn arb_batches() -> impl Strategy<Value = Vec<Vec<Operation>>> {
    prop::collection::vec(prop::collection::vec(arb_operation(), 1..12), 1..25)
}

fn apply(graph: &mut MutableGraph, operation: &Operation) {
    let nodes: Vec<NodeId> = graph.node_ids().collect();
    match *operation {
        Operation::AddNode => {
            graph.add_node();
        }
        Operation::AddEdge { source, target } if !nodes.is_empty() => {
            let source = nodes[source % nodes.len()];
            let target = nodes[target % nodes.len()];
            // Endpoints staged for removal are rejected; that is fine here.
            let _ = graph.add_edge(source, target);
        }
        Operation::RemoveNode { node } if !nodes.is_empty() => {
            graph.remove_node(nodes[node % nodes.len()]);
        }
        Operation::RemoveEdge { edge } => {
            let edges: Vec<_> = graph.edge_ids().collect();
            if !edges.is_empty() {
                graph.remove_edge(edges[edge % edges.len()]);
            }
        }
        _ => {}
    }
}

fn find(parents: &mut BTreeMap<NodeId, NodeId>, node: NodeId) -> NodeId {
    let parent = parents[&node];
    if parent == node {
        return node;
    }
    let root = find(parents, parent);
    parents.insert(node, root);
    root
}

/// Connected node sets computed without looking at the component manager.
fn reference_partition(graph: &MutableGraph) -> BTreeSet<BTreeSet<NodeId>> {
    let mut parents: BTreeMap<NodeId, NodeId> = graph.node_ids().map(|n| (n, n)).collect();
    for edge in graph.edge_ids() {
        let edge = graph.edge_by_id(edge).unwrap();
        let a = find(&mut parents, edge.source);
        let b = find(&mut parents, edge.target);
        if a != b {
            parents.insert(a, b);
        }
    }

    let mut groups: BTreeMap<NodeId, BTreeSet<NodeId>> = BTreeMap::new();
    for node in graph.node_ids() {
        let root = find(&mut parents, node);
        groups.entry(root).or_default().insert(node);
    }
    groups.into_values().collect()
}

fn managed_partition(graph: &MutableGraph) -> BTreeSet<BTreeSet<NodeId>> {
    graph
        .component_ids()
        .map(|id| graph.component_by_id(id).unwrap().node_ids().collect())
        .collect()
}

proptest! {
    #[test]
    fn prop_components_match_reference_connectivity(batches in arb_batches()) {
        let mut graph = MutableGraph::new();

        for batch in &batches {
            graph.perform(|graph| {
                for operation in batch {
                    apply(graph, operation);
                }
            });

            prop_assert_eq!(managed_partition(&graph), reference_partition(&graph));
            prop_assert_eq!(graph.num_components(), graph.component_ids().count());

            for node in graph.node_ids() {
                let id = graph.component_id_of_node(node);
                prop_assert!(id.is_valid());
                prop_assert!(graph.component_by_id(id).unwrap().contains_node(node));
            }

            let mut edges_per_component: BTreeMap<ComponentId, usize> = BTreeMap::new();
            for edge in graph.edge_ids() {
                let endpoints = graph.edge_by_id(edge).unwrap();
                let id = graph.component_id_of_edge(edge);
                prop_assert_eq!(id, graph.component_id_of_node(endpoints.source));
                *edges_per_component.entry(id).or_default() += 1;
            }
            for id in graph.component_ids() {
                let recorded = graph.component_by_id(id).unwrap().num_edges();
                prop_assert_eq!(recorded, edges_per_component.get(&id).copied().unwrap_or(0));
            }
        }
    }

    #[test]
    fn prop_arrays_cover_live_handles(batches in arb_batches()) {
        let mut graph = MutableGraph::plain();
        let marks: NodeArray<u8> = NodeArray::with_default(&graph, 7);
        let mut marked: BTreeSet<NodeId> = BTreeSet::new();

        for batch in &batches {
            graph.perform(|graph| {
                for operation in batch {
                    apply(graph, operation);
                }
            });

            for node in graph.node_ids() {
                prop_assert!((node.as_u32() as usize) < marks.len());
                let expected = if marked.contains(&node) { 1 } else { 7 };
                prop_assert_eq!(marks.get(node), expected);
            }

            marked = graph.node_ids().collect();
            for &node in &marked {
                marks.set(node, 1);
            }
        }
    }

    #[test]
    fn prop_reset_elements_is_idempotent(values in prop::collection::vec(any::<i32>(), 0..40)) {
        let mut graph = MutableGraph::plain();
        let nodes = graph.add_nodes(values.len());
        let array: NodeArray<i32> = NodeArray::with_default(&graph, -1);
        for (node, value) in nodes.iter().zip(&values) {
            array.set(*node, *value);
        }

        array.reset_elements();
        let once = array.to_vec();
        array.reset_elements();

        prop_assert_eq!(array.to_vec(), once);
        prop_assert!(array.to_vec().iter().all(|&value| value == -1));
    }
}
