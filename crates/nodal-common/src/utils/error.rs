//! Error types.
//!
//! Only recoverable, structural rejections are reported through [`Error`].
//! Caller bugs such as using a stale handle or ending a transaction that was
//! never begun are contract violations and panic instead.

use thiserror::Error;

use crate::types::NodeId;

/// Errors reported by graph mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// An edge was added to a node that is staged for removal in the open
    /// transaction.
    #[error("edge endpoint {node} is being removed in this transaction")]
    DanglingReference {
        /// The endpoint that is being removed.
        node: NodeId,
    },
}

/// Result type alias using the crate error.
pub type Result<T> = std::result::Result<T, Error>;
