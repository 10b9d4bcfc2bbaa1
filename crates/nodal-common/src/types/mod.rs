//! Core type definitions for Nodal.
//!
//! This module contains the element handle types used throughout the engine:
//! - Identifier types ([`NodeId`], [`EdgeId`], [`ComponentId`])
//! - The [`ElementId`] trait that lets storage be generic over handle kinds
//! - [`ElementType`], naming the kind of a handle at runtime

mod element;
mod id;

pub use element::ElementType;
pub use id::{ComponentId, EdgeId, ElementId, NodeId};
