//! Change notifications.
//!
//! Observers are called synchronously, in subscription order, with a shared
//! reference to the graph. Within one transaction close the order is always:
//!
//! 1. [`component_split`](GraphObserver::component_split)
//! 2. [`components_will_merge`](GraphObserver::components_will_merge)
//! 3. [`component_added`](GraphObserver::component_added)
//! 4. [`component_will_be_removed`](GraphObserver::component_will_be_removed)
//! 5. [`graph_changed`](GraphObserver::graph_changed)
//!
//! [`graph_will_change`](GraphObserver::graph_will_change) fires when the
//! outermost transaction begins.

use crossbeam::channel::{self, Receiver, Sender};
use nodal_common::types::ComponentId;

use super::component::{ComponentMergeSet, ComponentSplitSet};
use super::store::MutableGraph;

/// Receives change notifications from a graph.
///
/// Every method has an empty default, so observers only implement what they
/// care about.
#[allow(unused_variables)]
pub trait GraphObserver: Send {
    /// The outermost transaction has begun. Nothing has changed yet.
    fn graph_will_change(&mut self, graph: &MutableGraph) {}

    /// The outermost transaction has been committed. Arrays are resized and
    /// components are up to date.
    fn graph_changed(&mut self, graph: &MutableGraph, change_occurred: bool) {}

    /// A component has appeared, either from new nodes or from a split.
    fn component_added(&mut self, graph: &MutableGraph, component: ComponentId, has_split: bool) {
    }

    /// A component is about to go away, either merged into another or because
    /// all its nodes were removed. Its record is still readable.
    fn component_will_be_removed(
        &mut self,
        graph: &MutableGraph,
        component: ComponentId,
        has_merged: bool,
    ) {
    }

    /// A component has split. The original id is kept by one of the pieces.
    fn component_split(&mut self, graph: &MutableGraph, split: &ComponentSplitSet) {}

    /// Components are about to merge. They still hold their own nodes.
    fn components_will_merge(&mut self, graph: &MutableGraph, merge: &ComponentMergeSet) {}
}

/// An owned copy of one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphEvent {
    /// See [`GraphObserver::graph_will_change`].
    WillChange,
    /// See [`GraphObserver::graph_changed`].
    Changed {
        /// Whether the transaction changed anything.
        change_occurred: bool,
    },
    /// See [`GraphObserver::component_added`].
    ComponentAdded {
        /// The new component.
        component: ComponentId,
        /// Whether it was split off another component.
        has_split: bool,
    },
    /// See [`GraphObserver::component_will_be_removed`].
    ComponentWillBeRemoved {
        /// The component going away.
        component: ComponentId,
        /// Whether it is going away because it merged.
        has_merged: bool,
    },
    /// See [`GraphObserver::component_split`].
    ComponentSplit(ComponentSplitSet),
    /// See [`GraphObserver::components_will_merge`].
    ComponentsWillMerge(ComponentMergeSet),
}

/// Any `FnMut(&MutableGraph, &GraphEvent)` closure is an observer.
impl<F> GraphObserver for F
where
    F: FnMut(&MutableGraph, &GraphEvent) + Send,
{
    fn graph_will_change(&mut self, graph: &MutableGraph) {
        self(graph, &GraphEvent::WillChange);
    }

    fn graph_changed(&mut self, graph: &MutableGraph, change_occurred: bool) {
        self(graph, &GraphEvent::Changed { change_occurred });
    }

    fn component_added(&mut self, graph: &MutableGraph, component: ComponentId, has_split: bool) {
        self(graph, &GraphEvent::ComponentAdded { component, has_split });
    }

    fn component_will_be_removed(
        &mut self,
        graph: &MutableGraph,
        component: ComponentId,
        has_merged: bool,
    ) {
        self(graph, &GraphEvent::ComponentWillBeRemoved { component, has_merged });
    }

    fn component_split(&mut self, graph: &MutableGraph, split: &ComponentSplitSet) {
        self(graph, &GraphEvent::ComponentSplit(split.clone()));
    }

    fn components_will_merge(&mut self, graph: &MutableGraph, merge: &ComponentMergeSet) {
        self(graph, &GraphEvent::ComponentsWillMerge(merge.clone()));
    }
}

/// Forwards every notification into a channel.
///
/// Lets a collaborator on another thread consume changes without touching
/// the graph. Events sent after the receiver is dropped are discarded.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    sender: Sender<GraphEvent>,
}

impl ChannelObserver {
    /// Creates an observer and the receiving end of its channel.
    #[must_use]
    pub fn new() -> (Self, Receiver<GraphEvent>) {
        let (sender, receiver) = channel::unbounded();
        (Self { sender }, receiver)
    }

    fn send(&self, event: GraphEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!("graph event receiver dropped");
        }
    }
}

impl GraphObserver for ChannelObserver {
    fn graph_will_change(&mut self, _graph: &MutableGraph) {
        self.send(GraphEvent::WillChange);
    }

    fn graph_changed(&mut self, _graph: &MutableGraph, change_occurred: bool) {
        self.send(GraphEvent::Changed { change_occurred });
    }

    fn component_added(&mut self, _graph: &MutableGraph, component: ComponentId, has_split: bool) {
        self.send(GraphEvent::ComponentAdded { component, has_split });
    }

    fn component_will_be_removed(
        &mut self,
        _graph: &MutableGraph,
        component: ComponentId,
        has_merged: bool,
    ) {
        self.send(GraphEvent::ComponentWillBeRemoved { component, has_merged });
    }

    fn component_split(&mut self, _graph: &MutableGraph, split: &ComponentSplitSet) {
        self.send(GraphEvent::ComponentSplit(split.clone()));
    }

    fn components_will_merge(&mut self, _graph: &MutableGraph, merge: &ComponentMergeSet) {
        self.send(GraphEvent::ComponentsWillMerge(merge.clone()));
    }
}

/// Handle returned by [`MutableGraph::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Subscribed observers, in subscription order.
#[derive(Default)]
pub(crate) struct ObserverList {
    next_id: u64,
    observers: Vec<(ObserverId, Box<dyn GraphObserver>)>,
}

impl ObserverList {
    pub(crate) fn subscribe(&mut self, observer: Box<dyn GraphObserver>) -> ObserverId {
        let id = ObserverId(self.next_id);
        self.next_id += 1;
        self.observers.push((id, observer));
        id
    }

    pub(crate) fn unsubscribe(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(existing, _)| *existing != id);
        self.observers.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.observers.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Calls `f` on every observer.
    pub(crate) fn notify(&mut self, mut f: impl FnMut(&mut dyn GraphObserver)) {
        for (_, observer) in &mut self.observers {
            f(observer.as_mut());
        }
    }
}

impl std::fmt::Debug for ObserverList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverList")
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_subscribe_unsubscribe() {
        let mut list = ObserverList::default();
        let (observer, _receiver) = ChannelObserver::new();

        let id = list.subscribe(Box::new(observer));
        assert_eq!(list.len(), 1);

        assert!(list.unsubscribe(id));
        assert!(!list.unsubscribe(id));
        assert!(list.is_empty());
    }

    #[test]
    fn test_channel_observer_forwards_events() {
        let mut graph = MutableGraph::new();
        let (observer, receiver) = ChannelObserver::new();
        graph.subscribe(Box::new(observer));

        graph.add_node();

        let events: Vec<_> = receiver.try_iter().collect();
        assert_eq!(
            events,
            vec![
                GraphEvent::WillChange,
                GraphEvent::ComponentAdded { component: ComponentId::new(0), has_split: false },
                GraphEvent::Changed { change_occurred: true },
            ]
        );
    }

    #[test]
    fn test_closure_observer() {
        let mut graph = MutableGraph::plain();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        graph.subscribe(Box::new(move |graph: &MutableGraph, event: &GraphEvent| {
            sink.lock().unwrap().push((graph.num_nodes(), event.clone()));
        }));

        graph.add_node();

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                (0, GraphEvent::WillChange),
                (1, GraphEvent::Changed { change_occurred: true }),
            ]
        );
    }

    #[test]
    fn test_dropped_receiver_is_ignored() {
        let mut graph = MutableGraph::new();
        let (observer, receiver) = ChannelObserver::new();
        graph.subscribe(Box::new(observer));
        drop(receiver);

        graph.add_node();
        assert_eq!(graph.num_nodes(), 1);
    }
}
