//! Structured box mesh of multilinear elements.

use crate::error::MeshError;
use crate::mesh::{Basis, Dofs, Mesh};
use smallvec::SmallVec;
use wake_core::{ElementId, Point, Rank};

/// Slack allowed when deciding whether a point lies inside an element,
/// measured in reference coordinates (the reference element is `[-1, 1]^D`).
const REFERENCE_TOLERANCE: f64 = 1e-12;

/// A structured box of segment, quadrilateral or hexahedral elements.
///
/// The box `[lower, upper]` is split into `cells[d]` equal intervals
/// along each axis. Elements are numbered with axis 0 fastest, and the
/// dofs are the grid nodes, numbered the same way. Each element carries
/// the tensor-product linear basis on the reference cell `[-1, 1]^D`.
///
/// Partitioning: element columns along axis 0 are split into `ranks`
/// contiguous slabs, so column `i` belongs to rank `i * ranks / cells[0]`.
///
/// # Examples
///
/// ```
/// use wake_mesh::{BoxMesh, Mesh};
///
/// // [0,2] x [0,1] cut at x = 1 into two partitions.
/// let mesh = BoxMesh::new(&[0.0, 0.0], &[2.0, 1.0], &[2, 1], 2).unwrap();
/// assert_eq!(mesh.element_count(), 2);
/// assert_eq!(mesh.owning_process(&[0.5, 0.5]).unwrap().0, 0);
/// assert_eq!(mesh.owning_process(&[1.5, 0.5]).unwrap().0, 1);
/// assert!(mesh.owning_process(&[2.5, 0.5]).is_none());
/// ```
#[derive(Debug, Clone)]
pub struct BoxMesh {
    lower: Point,
    upper: Point,
    spacing: Point,
    cells: SmallVec<[u32; 3]>,
    ranks: u32,
    materials: Vec<u32>,
}

impl BoxMesh {
    /// Build a box mesh partitioned across `ranks` slabs.
    ///
    /// Returns an error if the dimension is not 1 to 3, the slices have
    /// different lengths, an axis has zero cells, an extent is inverted
    /// or non-finite, `ranks == 0`, or the element count does not fit
    /// in a `u32` element id.
    pub fn new(lower: &[f64], upper: &[f64], cells: &[u32], ranks: u32) -> Result<Self, MeshError> {
        let dim = cells.len();
        if !(1..=3).contains(&dim) {
            return Err(MeshError::InvalidDimension { dim });
        }
        if lower.len() != dim || upper.len() != dim {
            return Err(MeshError::ShapeMismatch {
                reason: format!(
                    "{} cell counts but bounds of length {} and {}",
                    dim,
                    lower.len(),
                    upper.len()
                ),
            });
        }
        for axis in 0..dim {
            if cells[axis] == 0 {
                return Err(MeshError::EmptyAxis { axis });
            }
            let (lo, hi) = (lower[axis], upper[axis]);
            if !lo.is_finite() || !hi.is_finite() || hi <= lo {
                return Err(MeshError::InvalidExtent {
                    axis,
                    lower: lo,
                    upper: hi,
                });
            }
        }
        if ranks == 0 {
            return Err(MeshError::ZeroRanks);
        }
        // u32::MAX itself is reserved for "no element" on the wire.
        let count = cells
            .iter()
            .try_fold(1u64, |acc, &c| acc.checked_mul(u64::from(c)))
            .unwrap_or(u64::MAX);
        if count >= u64::from(u32::MAX) {
            return Err(MeshError::TooManyElements { count });
        }
        let spacing = (0..dim)
            .map(|d| (upper[d] - lower[d]) / f64::from(cells[d]))
            .collect();
        Ok(Self {
            lower: SmallVec::from_slice(lower),
            upper: SmallVec::from_slice(upper),
            spacing,
            cells: SmallVec::from_slice(cells),
            ranks,
            materials: vec![0; count as usize],
        })
    }

    /// Lower corner of the box.
    pub fn lower(&self) -> &[f64] {
        &self.lower
    }

    /// Upper corner of the box.
    pub fn upper(&self) -> &[f64] {
        &self.upper
    }

    /// Elements per axis.
    pub fn cells(&self) -> &[u32] {
        &self.cells
    }

    /// Number of grid nodes (dofs).
    pub fn node_count(&self) -> usize {
        self.cells.iter().map(|&c| c as usize + 1).product()
    }

    /// Physical coordinates of dof `node`.
    pub fn node_coordinates(&self, node: usize) -> Point {
        let mut rest = node;
        let mut x = Point::new();
        for d in 0..self.cells.len() {
            let n = self.cells[d] as usize + 1;
            let i = rest % n;
            rest /= n;
            x.push(self.lower[d] + i as f64 * self.spacing[d]);
        }
        x
    }

    /// Tag `element` with a material id for force callbacks.
    ///
    /// Ignored if `element` is out of range.
    pub fn set_material(&mut self, element: ElementId, material: u32) {
        if let Some(m) = self.materials.get_mut(element.index()) {
            *m = material;
        }
    }

    /// Per-axis element indices of `element`.
    fn element_indices(&self, element: ElementId) -> SmallVec<[u32; 3]> {
        let mut rest = element.0;
        self.cells
            .iter()
            .map(|&n| {
                let i = rest % n;
                rest /= n;
                i
            })
            .collect()
    }

    /// Element id from per-axis indices.
    fn element_from_indices(&self, indices: &[u32]) -> ElementId {
        let mut id = 0u32;
        for d in (0..self.cells.len()).rev() {
            id = id * self.cells[d] + indices[d];
        }
        ElementId(id)
    }

    /// Reference coordinates of `position` in `element`, without bounds check.
    fn reference_unchecked(&self, element: ElementId, position: &[f64]) -> Point {
        let idx = self.element_indices(element);
        (0..self.cells.len())
            .map(|d| {
                let origin = self.lower[d] + f64::from(idx[d]) * self.spacing[d];
                2.0 * (position[d] - origin) / self.spacing[d] - 1.0
            })
            .collect()
    }
}

impl Mesh for BoxMesh {
    fn dim(&self) -> usize {
        self.cells.len()
    }

    fn element_count(&self) -> usize {
        self.materials.len()
    }

    fn rank_count(&self) -> usize {
        self.ranks as usize
    }

    fn element_owner(&self, element: ElementId) -> Rank {
        let column = u64::from(self.element_indices(element)[0]);
        let owner = column * u64::from(self.ranks) / u64::from(self.cells[0]);
        Rank(owner as u32)
    }

    fn to_reference(&self, element: ElementId, position: &[f64]) -> Option<Point> {
        if element.index() >= self.element_count() || position.len() != self.dim() {
            return None;
        }
        let xi = self.reference_unchecked(element, position);
        if xi.iter().all(|v| v.abs() <= 1.0 + REFERENCE_TOLERANCE) {
            Some(xi)
        } else {
            None
        }
    }

    fn neighbour_toward(&self, element: ElementId, position: &[f64]) -> Option<ElementId> {
        if element.index() >= self.element_count() || position.len() != self.dim() {
            return None;
        }
        let xi = self.reference_unchecked(element, position);
        // Step across the face that is violated the most.
        let (axis, excess) = xi
            .iter()
            .enumerate()
            .map(|(d, v)| (d, v.abs() - 1.0))
            .fold((0, f64::NEG_INFINITY), |best, cur| if cur.1 > best.1 { cur } else { best });
        if excess <= REFERENCE_TOLERANCE {
            return None;
        }
        let mut idx = self.element_indices(element);
        if xi[axis] > 0.0 {
            if idx[axis] + 1 >= self.cells[axis] {
                return None;
            }
            idx[axis] += 1;
        } else {
            if idx[axis] == 0 {
                return None;
            }
            idx[axis] -= 1;
        }
        Some(self.element_from_indices(&idx))
    }

    fn locate_element(&self, _hint: Option<ElementId>, position: &[f64]) -> Option<ElementId> {
        if position.len() != self.dim() {
            return None;
        }
        let mut idx: SmallVec<[u32; 3]> = SmallVec::new();
        for d in 0..self.cells.len() {
            let x = position[d];
            if !x.is_finite() {
                return None;
            }
            let slack = REFERENCE_TOLERANCE * self.spacing[d];
            if x < self.lower[d] - slack || x > self.upper[d] + slack {
                return None;
            }
            let raw = ((x - self.lower[d]) / self.spacing[d]).floor();
            let max = f64::from(self.cells[d] - 1);
            idx.push(raw.clamp(0.0, max) as u32);
        }
        Some(self.element_from_indices(&idx))
    }

    fn evaluate_basis(&self, _element: ElementId, local: &[f64]) -> Basis {
        let dim = self.cells.len();
        (0..1usize << dim)
            .map(|corner| {
                (0..dim)
                    .map(|d| {
                        let sign = if corner & (1 << d) != 0 { 1.0 } else { -1.0 };
                        0.5 * (1.0 + sign * local[d])
                    })
                    .product::<f64>()
            })
            .collect()
    }

    fn element_dofs(&self, element: ElementId) -> Dofs {
        let dim = self.cells.len();
        let idx = self.element_indices(element);
        (0..1usize << dim)
            .map(|corner| {
                let mut node = 0usize;
                let mut stride = 1usize;
                for d in 0..dim {
                    let offset = usize::from(corner & (1 << d) != 0);
                    node += (idx[d] as usize + offset) * stride;
                    stride *= self.cells[d] as usize + 1;
                }
                node
            })
            .collect()
    }

    fn element_material(&self, element: ElementId) -> u32 {
        self.materials.get(element.index()).copied().unwrap_or(0)
    }
}
