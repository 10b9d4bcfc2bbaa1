//! Element kinds.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The kind of graph element a handle or an array refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementType {
    /// A node.
    Node,
    /// An edge.
    Edge,
    /// A connected component.
    Component,
}

impl ElementType {
    /// Returns the lowercase name of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Edge => "edge",
            Self::Component => "component",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
