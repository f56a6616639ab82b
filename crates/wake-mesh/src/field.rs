//! Two-level nodal velocity data.

use crate::box_mesh::BoxMesh;
use crate::error::MeshError;
use wake_core::{Point, TimeLevel};

/// Nodal velocity at the start and end of an advection interval.
///
/// Values are indexed by the global dof numbering the [`Mesh`](crate::Mesh)
/// reports through `element_dofs`.
pub trait VelocityField: Send + Sync {
    /// Number of velocity components.
    fn dim(&self) -> usize;

    /// Velocity at `dof` for the requested time level.
    fn nodal_velocity(&self, dof: usize, level: TimeLevel) -> Point;
}

/// Owned start/end snapshots of a nodal velocity field.
#[derive(Clone, Debug)]
pub struct NodalField {
    dim: usize,
    start: Vec<Point>,
    end: Vec<Point>,
}

impl NodalField {
    /// Build from explicit snapshots.
    ///
    /// Both snapshots must have the same length and every value must have
    /// `dim` components.
    pub fn new(dim: usize, start: Vec<Point>, end: Vec<Point>) -> Result<Self, MeshError> {
        if start.len() != end.len() {
            return Err(MeshError::FieldLength {
                expected: start.len(),
                found: end.len(),
            });
        }
        for (dof, v) in start.iter().chain(end.iter()).enumerate() {
            if v.len() != dim {
                return Err(MeshError::FieldDimension {
                    dof: dof % start.len().max(1),
                    expected: dim,
                    found: v.len(),
                });
            }
        }
        Ok(Self { dim, start, end })
    }

    /// A field that does not change over the interval.
    pub fn steady(dim: usize, values: Vec<Point>) -> Result<Self, MeshError> {
        Self::new(dim, values.clone(), values)
    }

    /// Sample analytic start and end fields at the nodes of `mesh`.
    pub fn sample<F, G>(mesh: &BoxMesh, start: F, end: G) -> Self
    where
        F: Fn(&[f64]) -> Point,
        G: Fn(&[f64]) -> Point,
    {
        let nodes: Vec<Point> = (0..mesh.node_count())
            .map(|n| mesh.node_coordinates(n))
            .collect();
        Self {
            dim: mesh.cells().len(),
            start: nodes.iter().map(|x| start(x.as_slice())).collect(),
            end: nodes.iter().map(|x| end(x.as_slice())).collect(),
        }
    }

    /// Sample one analytic field for both levels.
    pub fn sample_steady<F>(mesh: &BoxMesh, f: F) -> Self
    where
        F: Fn(&[f64]) -> Point,
    {
        Self::sample(mesh, &f, &f)
    }

    /// Number of dofs covered.
    pub fn len(&self) -> usize {
        self.start.len()
    }

    /// Whether the field covers no dofs.
    pub fn is_empty(&self) -> bool {
        self.start.is_empty()
    }

    /// Check that the field covers every dof of `mesh`.
    pub fn check_covers(&self, mesh: &BoxMesh) -> Result<(), MeshError> {
        if self.len() != mesh.node_count() {
            return Err(MeshError::FieldLength {
                expected: mesh.node_count(),
                found: self.len(),
            });
        }
        Ok(())
    }
}

impl VelocityField for NodalField {
    fn dim(&self) -> usize {
        self.dim
    }

    fn nodal_velocity(&self, dof: usize, level: TimeLevel) -> Point {
        match level {
            TimeLevel::Start => self.start[dof].clone(),
            TimeLevel::End => self.end[dof].clone(),
        }
    }
}
