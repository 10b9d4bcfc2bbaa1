//! Element handles.
//!
//! Nodes, edges and components are identified by small, dense, recyclable
//! integers. Each kind gets its own newtype so handles of different kinds can
//! never be mixed up, and none of them support arithmetic.
//!
//! A handle only identifies an element while that element exists. Removed
//! elements give their value back to the graph, which may hand it out again
//! to a later element.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::ElementType;

/// Common behaviour of every element handle.
///
/// Storage that is generic over the kind of element it is keyed by
/// (`ElementIdSpace`, `GraphArray`) uses this trait to convert between a
/// handle and the slot index backing it.
pub trait ElementId:
    Copy + Eq + Ord + std::hash::Hash + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    /// The kind of element this handle refers to.
    const KIND: ElementType;

    /// The reserved "absent" handle.
    const NULL: Self;

    /// Creates a handle from a slot index.
    fn from_index(index: usize) -> Self;

    /// Returns the slot index of this handle.
    ///
    /// Must not be called on [`ElementId::NULL`].
    fn index(self) -> usize;

    /// Returns true if this is the reserved "absent" handle.
    fn is_null(self) -> bool {
        self == Self::NULL
    }
}

macro_rules! define_element_id {
    ($(#[$meta:meta])* $name:ident, $kind:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[repr(transparent)]
        pub struct $name(u32);

        impl $name {
            /// The reserved "absent" value.
            pub const NULL: Self = Self(u32::MAX);

            /// Creates a handle from its raw value.
            #[inline]
            #[must_use]
            pub const fn new(raw: u32) -> Self {
                Self(raw)
            }

            /// Returns the raw value.
            #[inline]
            #[must_use]
            pub const fn as_u32(self) -> u32 {
                self.0
            }

            /// Returns true if this handle is not [`Self::NULL`].
            #[inline]
            #[must_use]
            pub const fn is_valid(self) -> bool {
                self.0 != u32::MAX
            }

            /// Returns true if this handle is [`Self::NULL`].
            #[inline]
            #[must_use]
            pub const fn is_null(self) -> bool {
                self.0 == u32::MAX
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::NULL
            }
        }

        impl ElementId for $name {
            const KIND: ElementType = $kind;
            const NULL: Self = Self::NULL;

            #[inline]
            fn from_index(index: usize) -> Self {
                assert!(
                    index < u32::MAX as usize,
                    concat!(stringify!($name), " index {} out of range"),
                    index
                );
                Self(index as u32)
            }

            #[inline]
            fn index(self) -> usize {
                debug_assert!(self.is_valid(), concat!("index() on null ", stringify!($name)));
                self.0 as usize
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.is_null() {
                    write!(f, concat!(stringify!($name), "(null)"))
                } else {
                    write!(f, concat!(stringify!($name), "({})"), self.0)
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.is_null() {
                    f.write_str("null")
                } else {
                    write!(f, "{}", self.0)
                }
            }
        }

        impl From<u32> for $name {
            fn from(raw: u32) -> Self {
                Self::new(raw)
            }
        }
    };
}

define_element_id!(
    /// Handle of a node.
    NodeId,
    ElementType::Node
);

define_element_id!(
    /// Handle of an edge.
    EdgeId,
    ElementType::Edge
);

define_element_id!(
    /// Handle of a connected component.
    ComponentId,
    ElementType::Component
);
