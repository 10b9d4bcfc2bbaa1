//! # nodal-common
//!
//! Foundation layer for Nodal: element handles, errors, and utilities.
//!
//! This crate provides the fundamental building blocks used by the graph
//! engine and by every collaborator that attaches to it (layout, rendering,
//! attributes). It has no internal dependencies and should be kept minimal.
//!
//! ## Modules
//!
//! - [`types`] - Element handles (NodeId, EdgeId, ComponentId) and ElementType
//! - [`utils`] - Utility functions and helpers (hashing, errors)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod types;
pub mod utils;

// Re-export commonly used types at crate root
pub use types::{ComponentId, EdgeId, ElementId, ElementType, NodeId};
pub use utils::error::{Error, Result};
