//! End-to-end behaviour of the graph, its arrays and its components.

use std::sync::{Arc, Mutex};

use nodal_core::{
    ChannelObserver, ComponentArray, ComponentId, EdgeArray, Error, GraphEvent, MutableGraph,
    NodeArray, NodeId,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn sorted(mut nodes: Vec<NodeId>) -> Vec<NodeId> {
    nodes.sort_unstable();
    nodes
}

fn members(graph: &MutableGraph, id: ComponentId) -> Vec<NodeId> {
    sorted(graph.component_by_id(id).unwrap().node_ids().collect())
}

/// Nodes {0,1,2} with edges (0,1) and (1,2).
fn three_node_path() -> (MutableGraph, Vec<NodeId>, Vec<nodal_core::EdgeId>) {
    let mut graph = MutableGraph::new();
    let nodes = graph.add_nodes(3);
    let edges = graph
        .add_edges([(nodes[0], nodes[1]), (nodes[1], nodes[2])])
        .unwrap();
    (graph, nodes, edges)
}

#[test]
fn removing_second_path_edge_splits_off_the_tail() {
    let (mut graph, nodes, edges) = three_node_path();
    assert_eq!(graph.num_components(), 1);

    graph.remove_edge(edges[1]);

    let head = graph.component_id_of_node(nodes[0]);
    let tail = graph.component_id_of_node(nodes[2]);
    assert_eq!(graph.num_components(), 2);
    assert_eq!(members(&graph, head), vec![nodes[0], nodes[1]]);
    assert_eq!(members(&graph, tail), vec![nodes[2]]);
}

#[test]
fn removing_first_path_edge_splits_off_the_head() {
    let (mut graph, nodes, edges) = three_node_path();

    graph.remove_edge(edges[0]);

    let head = graph.component_id_of_node(nodes[0]);
    let tail = graph.component_id_of_node(nodes[1]);
    assert_eq!(graph.num_components(), 2);
    assert_eq!(members(&graph, head), vec![nodes[0]]);
    assert_eq!(members(&graph, tail), vec![nodes[1], nodes[2]]);
}

#[test]
fn bridge_removal_emits_one_split_with_disjoint_pieces() {
    let mut graph = MutableGraph::new();
    let nodes = graph.add_nodes(6);
    let edges = graph
        .add_edges([
            (nodes[0], nodes[1]),
            (nodes[1], nodes[2]),
            (nodes[2], nodes[0]),
            (nodes[2], nodes[3]),
            (nodes[3], nodes[4]),
            (nodes[4], nodes[5]),
            (nodes[5], nodes[3]),
        ])
        .unwrap();
    let original = graph.component_id_of_node(nodes[0]);
    let before = members(&graph, original);

    let (observer, events) = ChannelObserver::new();
    graph.subscribe(Box::new(observer));
    graph.remove_edge(edges[3]);

    let splits: Vec<_> = events
        .try_iter()
        .filter_map(|event| match event {
            GraphEvent::ComponentSplit(split) => Some(split),
            _ => None,
        })
        .collect();
    assert_eq!(splits.len(), 1);
    assert_eq!(splits[0].old_component_id(), original);
    assert_eq!(splits[0].splitters().len(), 1);

    let kept = members(&graph, original);
    let split_off = members(&graph, splits[0].splitters()[0]);
    assert!(kept.iter().all(|node| !split_off.contains(node)));
    assert_eq!(sorted([kept, split_off].concat()), before);
}

#[test]
fn non_bridge_removal_keeps_count_and_ids() {
    let mut graph = MutableGraph::new();
    let nodes = graph.add_nodes(4);
    let edges = graph
        .add_edges([
            (nodes[0], nodes[1]),
            (nodes[1], nodes[2]),
            (nodes[2], nodes[3]),
            (nodes[3], nodes[0]),
        ])
        .unwrap();
    let ids_before: Vec<_> = nodes.iter().map(|&n| graph.component_id_of_node(n)).collect();

    graph.remove_edge(edges[1]);

    let ids_after: Vec<_> = nodes.iter().map(|&n| graph.component_id_of_node(n)).collect();
    assert_eq!(graph.num_components(), 1);
    assert_eq!(ids_before, ids_after);
}

#[test]
fn equal_sized_merge_keeps_first_encountered_component() {
    let mut graph = MutableGraph::new();
    let nodes = graph.add_nodes(4);
    graph.add_edge(nodes[0], nodes[1]).unwrap();
    graph.add_edge(nodes[2], nodes[3]).unwrap();
    let first = graph.component_id_of_node(nodes[1]);
    let second = graph.component_id_of_node(nodes[2]);
    assert_ne!(first, second);

    let (observer, events) = ChannelObserver::new();
    graph.subscribe(Box::new(observer));
    graph.add_edge(nodes[1], nodes[2]).unwrap();

    let merges: Vec<_> = events
        .try_iter()
        .filter_map(|event| match event {
            GraphEvent::ComponentsWillMerge(merge) => Some(merge),
            _ => None,
        })
        .collect();
    assert_eq!(merges.len(), 1);
    assert_eq!(merges[0].new_component_id(), first);
    assert_eq!(merges[0].mergers(), sorted_ids(vec![first, second]).as_slice());
    assert_eq!(graph.num_components(), 1);
    assert_eq!(members(&graph, first), nodes);
    assert!(graph.component_by_id(second).is_none());
}

fn sorted_ids(mut ids: Vec<ComponentId>) -> Vec<ComponentId> {
    ids.sort_unstable();
    ids
}

#[test]
fn merge_notification_sees_pre_merge_membership() {
    let mut graph = MutableGraph::new();
    let nodes = graph.add_nodes(3);
    graph.add_edge(nodes[0], nodes[1]).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    graph.subscribe(Box::new(move |graph: &MutableGraph, event: &GraphEvent| {
        if let GraphEvent::ComponentsWillMerge(merge) = event {
            let sizes: Vec<_> = merge
                .mergers()
                .iter()
                .map(|&id| graph.component_by_id(id).unwrap().num_nodes())
                .collect();
            sink.lock().unwrap().push((sizes, merge.node_ids(graph).len()));
        }
    }));

    graph.add_edge(nodes[2], nodes[0]).unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let (mut sizes, total) = seen[0].clone();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![1, 2]);
    assert_eq!(total, 3);
}

#[test]
fn notifications_follow_the_documented_order() {
    init_tracing();
    let mut graph = MutableGraph::new();
    let nodes = graph.add_nodes(5);
    let edges = graph
        .add_edges([(nodes[0], nodes[1]), (nodes[1], nodes[2]), (nodes[3], nodes[4])])
        .unwrap();
    let lonely = graph.add_node();

    let (observer, events) = ChannelObserver::new();
    graph.subscribe(Box::new(observer));

    graph.perform(|graph| {
        // split {0,1,2} into {0,1} and {2}
        graph.remove_edge(edges[1]);
        // merge {3,4} with {0,1}
        graph.add_edge(nodes[1], nodes[3]).unwrap();
        // a brand new component
        graph.add_node();
        // a component that disappears
        graph.remove_node(lonely);
    });

    let order: Vec<_> = events
        .try_iter()
        .map(|event| match event {
            GraphEvent::WillChange => "will_change",
            GraphEvent::ComponentSplit(_) => "split",
            GraphEvent::ComponentsWillMerge(_) => "merge",
            GraphEvent::ComponentAdded { has_split: true, .. } => "added_split",
            GraphEvent::ComponentAdded { has_split: false, .. } => "added_new",
            GraphEvent::ComponentWillBeRemoved { has_merged: false, .. } => "removed",
            GraphEvent::ComponentWillBeRemoved { has_merged: true, .. } => "removed_merged",
            GraphEvent::Changed { .. } => "changed",
        })
        .collect();

    assert_eq!(
        order,
        vec![
            "will_change",
            "split",
            "merge",
            "added_split",
            "added_new",
            "removed",
            "removed_merged",
            "changed",
        ]
    );
    assert_eq!(graph.num_components(), 3);
}

#[test]
fn nested_transactions_notify_once() {
    let mut graph = MutableGraph::new();
    let (observer, events) = ChannelObserver::new();
    graph.subscribe(Box::new(observer));

    graph.begin_transaction();
    graph.begin_transaction();
    graph.add_node();
    graph.end_transaction();
    assert!(graph.in_transaction());
    graph.add_node();
    graph.end_transaction();

    let events: Vec<_> = events.try_iter().collect();
    assert_eq!(events.first(), Some(&GraphEvent::WillChange));
    assert_eq!(events.last(), Some(&GraphEvent::Changed { change_occurred: true }));
    assert_eq!(
        events
            .iter()
            .filter(|event| matches!(event, GraphEvent::WillChange | GraphEvent::Changed { .. }))
            .count(),
        2
    );
}

#[test]
fn dangling_edge_is_rejected_and_transaction_continues() {
    init_tracing();
    let mut graph = MutableGraph::new();
    let nodes = graph.add_nodes(3);

    let mut tx = graph.transaction();
    tx.remove_node(nodes[0]);
    assert_eq!(
        tx.add_edge(nodes[1], nodes[0]),
        Err(Error::DanglingReference { node: nodes[0] })
    );
    tx.add_edge(nodes[1], nodes[2]).unwrap();
    drop(tx);

    assert_eq!(graph.num_nodes(), 2);
    assert_eq!(graph.num_edges(), 1);
    assert_eq!(graph.num_components(), 1);
}

#[test]
fn arrays_cover_live_handles_and_default_fresh_ones() {
    let mut graph = MutableGraph::new();
    let nodes = graph.add_nodes(3);
    let weights: EdgeArray<f64> = EdgeArray::with_default(&graph, 1.5);
    let labels: NodeArray<String> = NodeArray::with_default(&graph, "unnamed".to_string());
    let sizes: ComponentArray<usize> = ComponentArray::new(&graph);

    for &node in &nodes {
        labels.set(node, format!("n{node}"));
    }
    let edge = graph.add_edge(nodes[0], nodes[1]).unwrap();
    weights.set(edge, 4.0);

    graph.remove_node(nodes[0]);
    let fresh = graph.add_node();
    let fresh_edge = graph.add_edge(fresh, nodes[2]).unwrap();

    assert_eq!(fresh, nodes[0]);
    assert_eq!(fresh_edge, edge);
    assert_eq!(labels.get(fresh), "unnamed");
    assert_eq!(labels.get(nodes[1]), "n1");
    assert_eq!(weights.get(fresh_edge), 1.5);
    for component in graph.component_ids() {
        assert_eq!(sizes.get(component), 0);
    }
    assert!(labels.len() >= graph.next_node_id());
    assert!(weights.len() >= graph.next_edge_id());
}

#[test]
fn component_array_slots_reset_when_component_goes_away() {
    let mut graph = MutableGraph::new();
    let node = graph.add_node();
    let sizes: ComponentArray<usize> = ComponentArray::new(&graph);
    let component = graph.component_id_of_node(node);
    sizes.set(component, 10);

    graph.remove_node(node);
    let again = graph.add_node();

    assert_eq!(graph.component_id_of_node(again), component);
    assert_eq!(sizes.get(component), 0);
}

#[test]
fn every_live_node_and_edge_is_labeled() {
    let mut graph = MutableGraph::new();
    let nodes = graph.add_nodes(10);
    graph
        .add_edges(nodes.windows(2).step_by(2).map(|pair| (pair[0], pair[1])))
        .unwrap();

    for node in graph.node_ids() {
        let component = graph.component_id_of_node(node);
        assert!(component.is_valid());
        assert!(graph.component_by_id(component).unwrap().contains_node(node));
    }
    for edge in graph.edge_ids() {
        let endpoints = graph.edge_by_id(edge).unwrap();
        assert_eq!(
            graph.component_id_of_edge(edge),
            graph.component_id_of_node(endpoints.source)
        );
    }
    assert_eq!(graph.num_components(), 5);
}
