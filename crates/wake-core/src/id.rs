//! Strongly-typed identifiers and the [`Point`] type alias.

use smallvec::SmallVec;
use std::fmt;

/// Stable logical identity of a marker.
///
/// `MarkerId(n)` is the n-th point handed to the line constructor. The id
/// never changes when the marker moves between storage slots or ranks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarkerId(pub u32);

impl MarkerId {
    /// The original insertion index as a `usize`.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for MarkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for MarkerId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Index of a mesh element.
///
/// "Outside the global domain" is expressed as `Option<ElementId>::None`
/// rather than a reserved value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub u32);

impl ElementId {
    /// The element index as a `usize`.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ElementId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// A process (rank) in the SPMD group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Rank(pub u32);

impl Rank {
    /// The rank that collects every marker which has left the domain.
    pub const SINK: Rank = Rank(0);

    /// The rank as a `usize`.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for Rank {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// A position in physical or reference space.
///
/// Uses `SmallVec<[f64; 3]>` so 1D, 2D and 3D points never touch the heap.
pub type Point = SmallVec<[f64; 3]>;

/// Copy a coordinate slice into a [`Point`].
pub fn point_from_slice(xs: &[f64]) -> Point {
    SmallVec::from_slice(xs)
}
