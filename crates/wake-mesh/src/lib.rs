//! Mesh and velocity-field contracts for Wake.
//!
//! This crate defines the [`Mesh`] trait, the narrow query interface
//! through which the tracker asks the surrounding finite-element code
//! where a point is, who owns it, and how to interpolate onto it, along
//! with the [`VelocityField`] trait for two-level nodal velocity data.
//!
//! # Backends
//!
//! - [`BoxMesh`]: structured 1D/2D/3D box of multilinear elements,
//!   partitioned into contiguous slabs along the first axis
//! - [`NodalField`]: owned start/end velocity snapshots indexed by dof

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod box_mesh;
pub mod error;
pub mod field;
pub mod mesh;

#[cfg(test)]
pub(crate) mod compliance;

pub use box_mesh::BoxMesh;
pub use error::MeshError;
pub use field::{NodalField, VelocityField};
pub use mesh::{Basis, Dofs, Mesh};
