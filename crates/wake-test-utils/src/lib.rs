//! Test fixtures and helpers for Wake development.
//!
//! Provides the standard meshes and analytic velocity fields used across
//! the workspace's tests and benches, seeded random marker clouds, and
//! [`on_cluster`] for running a closure on every rank of a thread
//! cluster.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

pub use fixtures::{
    box_mesh, on_cluster, random_points, rotating_field, split_strip, uniform_field,
};
