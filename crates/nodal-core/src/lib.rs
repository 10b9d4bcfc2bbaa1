//! # nodal-core
//!
//! Core layer for Nodal: a mutable graph with recyclable handles, arrays
//! attached to it, batched transactions, and connected components kept up to
//! date incrementally.
//!
//! This crate depends only on `nodal-common`.
//!
//! ## Modules
//!
//! - [`graph`] - The graph store, transactions, components and observers
//! - [`array`] - Per-element arrays bound to a graph
//! - [`id_space`] - Recyclable handle allocation
//!
//! ## Example
//!
//! ```
//! use nodal_core::MutableGraph;
//!
//! let mut graph = MutableGraph::new();
//! let nodes = graph.add_nodes(3);
//! let edge = graph.add_edge(nodes[0], nodes[1]).unwrap();
//! graph.add_edge(nodes[1], nodes[2]).unwrap();
//! assert_eq!(graph.num_components(), 1);
//!
//! graph.remove_edge(edge);
//! assert_eq!(graph.num_components(), 2);
//! ```

pub mod array;
pub mod graph;
pub mod id_space;

// Re-export commonly used types
pub use array::{ComponentArray, EdgeArray, GraphArray, Locking, NodeArray, Unlocked};
pub use graph::{
    ChannelObserver, ComponentMergeSet, ComponentSplitSet, Edge, GraphComponent, GraphConfig,
    GraphEvent, GraphObserver, MutableGraph, Transaction,
};
pub use id_space::ElementIdSpace;
pub use nodal_common::{ComponentId, EdgeId, ElementId, ElementType, Error, NodeId, Result};
