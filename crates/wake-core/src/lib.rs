//! Core types for the Wake Lagrangian particle tracker.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the identifiers and small value types shared by the mesh contract,
//! the communication layer, and the advection engine.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod id;
pub mod state;

pub use id::{point_from_slice, ElementId, MarkerId, Point, Rank};
pub use state::{MarkerKind, Step, TimeLevel};
