//! Error types for mesh and field construction.

use std::fmt;

/// Errors arising from mesh or velocity-field construction.
#[derive(Debug, Clone, PartialEq)]
pub enum MeshError {
    /// Only 1, 2 and 3 dimensional meshes are supported.
    InvalidDimension {
        /// The requested dimension.
        dim: usize,
    },
    /// Bounds and cell counts disagree on the dimension.
    ShapeMismatch {
        /// What went wrong.
        reason: String,
    },
    /// An axis was given zero cells.
    EmptyAxis {
        /// The offending axis.
        axis: usize,
    },
    /// An axis has a non-finite or inverted extent.
    InvalidExtent {
        /// The offending axis.
        axis: usize,
        /// Lower bound.
        lower: f64,
        /// Upper bound.
        upper: f64,
    },
    /// The partition must have at least one rank.
    ZeroRanks,
    /// More elements than element ids can address.
    TooManyElements {
        /// Requested element count.
        count: u64,
    },
    /// A velocity snapshot does not cover every dof.
    FieldLength {
        /// Dofs in the mesh.
        expected: usize,
        /// Values supplied.
        found: usize,
    },
    /// A nodal velocity has the wrong number of components.
    FieldDimension {
        /// The dof with the bad value.
        dof: usize,
        /// Required component count.
        expected: usize,
        /// Supplied component count.
        found: usize,
    },
}

impl fmt::Display for MeshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDimension { dim } => {
                write!(f, "mesh dimension must be 1, 2 or 3, got {dim}")
            }
            Self::ShapeMismatch { reason } => write!(f, "shape mismatch: {reason}"),
            Self::EmptyAxis { axis } => write!(f, "axis {axis} has zero cells"),
            Self::InvalidExtent { axis, lower, upper } => {
                write!(f, "axis {axis} has invalid extent [{lower}, {upper}]")
            }
            Self::ZeroRanks => write!(f, "partition must have at least one rank"),
            Self::TooManyElements { count } => {
                write!(f, "{count} elements exceed the u32 element id space")
            }
            Self::FieldLength { expected, found } => {
                write!(f, "velocity snapshot has {found} values, mesh has {expected} dofs")
            }
            Self::FieldDimension {
                dof,
                expected,
                found,
            } => write!(
                f,
                "velocity at dof {dof} has {found} components, expected {expected}"
            ),
        }
    }
}

impl std::error::Error for MeshError {}
