//! The marker entity and its point-location policy.
//!
//! Marker metadata (position, element, owner, step) is replicated on
//! every rank and refreshed each exchange round; only the owner mutates
//! it between rounds. In-flight Runge-Kutta state lives separately in the
//! owner's [`StageArena`](crate::arena::StageArena).

use wake_core::{ElementId, MarkerId, MarkerKind, Point, Rank, Step};
use wake_mesh::Mesh;

/// A tracked Lagrangian point.
#[derive(Clone, Debug, PartialEq)]
pub struct Marker {
    /// Stable identity: the index of the point handed to the constructor.
    pub id: MarkerId,
    /// Kind tag supplied by the caller.
    pub kind: MarkerKind,
    /// Current physical coordinates.
    pub position: Point,
    /// Coordinates in the reference cell of `element`. Empty when outside.
    pub local: Point,
    /// Element containing the marker, `None` outside the domain.
    pub element: Option<ElementId>,
    /// Last element known to contain the marker; seeds the next search.
    pub previous_element: Option<ElementId>,
    /// Rank holding the marker's authoritative state.
    pub owner: Rank,
    /// Integration progress.
    pub step: Step,
}

impl Marker {
    /// Create a marker at `position` and locate it with a global search.
    ///
    /// A marker that starts outside the domain is done from the outset
    /// and belongs to the sink rank.
    pub fn new(id: MarkerId, kind: MarkerKind, position: Point, mesh: &dyn Mesh) -> Self {
        let mut marker = Self {
            id,
            kind,
            position,
            local: Point::new(),
            element: None,
            previous_element: None,
            owner: Rank::SINK,
            step: Step::Done,
        };
        if let Some((element, local)) = locate(mesh, None, &marker.position, 0) {
            marker.element = Some(element);
            marker.previous_element = Some(element);
            marker.local = local;
            marker.owner = mesh.element_owner(element);
            marker.step = Step::At(0);
        }
        marker
    }

    /// Whether the marker has left the domain.
    pub fn is_outside(&self) -> bool {
        self.element.is_none()
    }

    /// Move to `position` and locate it starting from the current element.
    ///
    /// On success the old element becomes the search hint for next time
    /// and `true` is returned. On failure the marker is flagged outside
    /// and finished; its position is left for the caller to settle.
    pub fn relocate(&mut self, mesh: &dyn Mesh, position: Point, max_hops: u32) -> bool {
        self.position = position;
        let hint = self.element.or(self.previous_element);
        match locate(mesh, hint, &self.position, max_hops) {
            Some((element, local)) => {
                self.previous_element = hint;
                self.element = Some(element);
                self.local = local;
                true
            }
            None => {
                self.previous_element = hint;
                self.element = None;
                self.local.clear();
                self.step = Step::Done;
                false
            }
        }
    }

    /// Rank whose partition contains the marker.
    ///
    /// Markers outside the domain belong to the sink rank.
    pub fn owning_process(&self, mesh: &dyn Mesh) -> Rank {
        match self.element {
            Some(e) => mesh.element_owner(e),
            None => Rank::SINK,
        }
    }
}

/// Find the element containing `position` and its reference coordinates.
///
/// Starts from `hint` and walks towards the point one neighbour at a
/// time, at most `max_hops` hops. If the walk reaches the domain
/// boundary or runs out of hops, falls back to the mesh's global search.
/// Returns `None` when no element contains the point.
pub fn locate(
    mesh: &dyn Mesh,
    hint: Option<ElementId>,
    position: &[f64],
    max_hops: u32,
) -> Option<(ElementId, Point)> {
    if let Some(mut current) = hint.filter(|e| e.index() < mesh.element_count()) {
        for _ in 0..=max_hops {
            if let Some(local) = mesh.to_reference(current, position) {
                return Some((current, local));
            }
            match mesh.neighbour_toward(current, position) {
                Some(next) => current = next,
                None => break,
            }
        }
    }
    let element = mesh.locate_element(hint, position)?;
    mesh.to_reference(element, position)
        .map(|local| (element, local))
}
