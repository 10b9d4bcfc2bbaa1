//! The mutable graph and everything derived from its structure.
//!
//! - [`MutableGraph`] - nodes, edges and transactions
//! - [`GraphComponent`] and friends - incrementally maintained connected
//!   components
//! - [`GraphObserver`] - change notifications

mod component;
mod observer;
mod store;
mod transaction;

pub use component::{ComponentMergeSet, ComponentSplitSet, GraphComponent};
pub use observer::{ChannelObserver, GraphEvent, GraphObserver, ObserverId};
pub use store::{Edge, GraphConfig, MutableGraph};
pub use transaction::Transaction;
