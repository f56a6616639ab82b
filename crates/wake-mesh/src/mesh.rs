//! The core `Mesh` trait.

use smallvec::SmallVec;
use wake_core::{ElementId, Point, Rank};

/// Basis function values at one reference point, in element-dof order.
///
/// Eight inline slots cover a trilinear hexahedron.
pub type Basis = SmallVec<[f64; 8]>;

/// Global dof indices of one element, in the same order as [`Basis`].
pub type Dofs = SmallVec<[usize; 8]>;

/// Query interface onto a partitioned finite-element mesh.
///
/// The tracker never builds or partitions meshes; it only asks these
/// questions. Every rank holds the same `Mesh` (geometry is replicated,
/// ownership is a static element → rank map), so all queries are valid
/// for any element or point regardless of the calling rank.
///
/// # Thread Safety
///
/// `Sync` is required because every rank thread of a cluster shares one
/// `Arc<dyn Mesh>`.
pub trait Mesh: Send + Sync + 'static {
    /// Spatial dimension, 1 to 3.
    fn dim(&self) -> usize;

    /// Number of elements in the whole mesh.
    fn element_count(&self) -> usize;

    /// Number of partitions the elements are split into.
    fn rank_count(&self) -> usize;

    /// Rank whose partition contains `element`.
    fn element_owner(&self, element: ElementId) -> Rank;

    /// Invert the reference map of `element` at `position`.
    ///
    /// Returns the reference coordinates if `position` lies inside the
    /// element (up to a small tolerance), `None` otherwise.
    fn to_reference(&self, element: ElementId, position: &[f64]) -> Option<Point>;

    /// The element adjacent to `element` in the direction of `position`.
    ///
    /// Returns `None` when the step would cross the domain boundary or
    /// when `position` already lies inside `element`.
    fn neighbour_toward(&self, element: ElementId, position: &[f64]) -> Option<ElementId>;

    /// Global point location.
    ///
    /// `hint` may be used to seed the search. Returns `None` when no
    /// element contains `position`.
    fn locate_element(&self, hint: Option<ElementId>, position: &[f64]) -> Option<ElementId>;

    /// Rank whose partition geometrically contains `position`.
    ///
    /// Default implementation locates the element and maps it through
    /// [`element_owner`](Self::element_owner).
    fn owning_process(&self, position: &[f64]) -> Option<Rank> {
        self.locate_element(None, position)
            .map(|e| self.element_owner(e))
    }

    /// Evaluate every basis function of `element` at reference point `local`.
    fn evaluate_basis(&self, element: ElementId, local: &[f64]) -> Basis;

    /// Global dof indices of `element`.
    fn element_dofs(&self, element: ElementId) -> Dofs;

    /// Material tag of `element`, passed to force callbacks.
    fn element_material(&self, _element: ElementId) -> u32 {
        0
    }
}
