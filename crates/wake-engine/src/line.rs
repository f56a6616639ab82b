//! The distributed marker container.
//!
//! Every rank stores the same `Line`: all markers, laid out so that
//! `markers[offsets[p]..offsets[p + 1]]` are exactly the markers owned by
//! rank `p`, grouped by element inside each range. `display_order` maps
//! a marker's original insertion index to its current slot so results
//! can always be read back in the caller's order.
//!
//! # Layout
//!
//! ```text
//! slot:     0    1    2    3    4    5
//! owner:  [ 0 ][ 0 ][ 0 ][ 1 ][ 1 ][ 2 ]
//! element:  e4   e4   ∅    e9   e8   e12
//!                     ^ outside markers trail the sink range
//! offsets: [0, 3, 5, 6]
//! ```

use std::ops::Range;

use indexmap::IndexMap;
use wake_core::{ElementId, MarkerId, MarkerKind, Point, Rank};
use wake_mesh::Mesh;

use crate::config::ConfigError;
use crate::error::LineError;
use crate::marker::Marker;

/// All markers of a run, partitioned by owning rank.
#[derive(Clone, Debug, PartialEq)]
pub struct Line {
    markers: Vec<Marker>,
    /// `ranks + 1` entries; range `p` is `offsets[p]..offsets[p + 1]`.
    offsets: Vec<usize>,
    /// Original insertion index → current slot.
    display_order: Vec<usize>,
}

impl Line {
    /// Build one marker per point, locate each, and bucket them by owner.
    ///
    /// `kinds` must have one entry per point and every point must have
    /// the mesh's dimension. Points outside the domain become finished
    /// markers on the sink rank.
    pub fn new(points: &[Point], kinds: &[MarkerKind], mesh: &dyn Mesh) -> Result<Self, ConfigError> {
        if points.len() != kinds.len() {
            return Err(ConfigError::KindCountMismatch {
                points: points.len(),
                kinds: kinds.len(),
            });
        }
        if u32::try_from(points.len()).is_err() {
            return Err(ConfigError::TooManyMarkers {
                count: points.len(),
            });
        }
        let dim = mesh.dim();
        let mut markers = Vec::with_capacity(points.len());
        for (i, (p, &kind)) in points.iter().zip(kinds).enumerate() {
            let id = MarkerId(i as u32);
            if p.len() != dim {
                return Err(ConfigError::PointDimension {
                    marker: id,
                    expected: dim,
                    found: p.len(),
                });
            }
            let marker = Marker::new(id, kind, p.clone(), mesh);
            if marker.owner.index() >= mesh.rank_count().max(1) {
                return Err(ConfigError::OwnerOutOfRange {
                    marker: id,
                    owner: marker.owner,
                    ranks: mesh.rank_count(),
                });
            }
            markers.push(marker);
        }

        let mut line = Self {
            display_order: (0..markers.len()).collect(),
            markers,
            offsets: vec![0; mesh.rank_count().max(1) + 1],
        };
        let (order, offsets) = line.bucket_by_owner();
        line.offsets = offsets;
        line.permute(order);
        Ok(line)
    }

    /// Restore contiguity after owners changed.
    ///
    /// First re-buckets markers by owning rank (stable), then groups the
    /// markers of each rank by element in first-seen order, with markers
    /// outside the domain at the end of the sink rank's range. Applying it
    /// twice without intervening moves changes nothing.
    ///
    /// # Errors
    ///
    /// [`LineError::ExitedOffSink`] if a marker outside the domain is owned
    /// by any rank but the sink; the line is left untouched in that case.
    pub fn update_line(&mut self) -> Result<(), LineError> {
        if let Some(m) = self
            .markers
            .iter()
            .find(|m| m.is_outside() && m.owner != Rank::SINK)
        {
            return Err(LineError::ExitedOffSink {
                marker: m.id,
                rank: m.owner,
            });
        }

        let (order, offsets) = self.bucket_by_owner();
        if order.len() != self.markers.len() {
            return Err(LineError::OffsetCorruption {
                reason: format!(
                    "{} of {} markers have an owner outside 0..{}",
                    self.markers.len() - order.len(),
                    self.markers.len(),
                    self.ranks()
                ),
            });
        }
        self.offsets = offsets;
        self.permute(order);

        let mut order = Vec::with_capacity(self.markers.len());
        for rank in 0..self.ranks() {
            let mut groups: IndexMap<ElementId, Vec<usize>> = IndexMap::new();
            let mut outside = Vec::new();
            for slot in self.range(Rank(rank as u32)) {
                match self.markers[slot].element {
                    Some(e) => groups.entry(e).or_default().push(slot),
                    None => outside.push(slot),
                }
            }
            order.extend(groups.into_values().flatten());
            order.extend(outside);
        }
        self.permute(order);

        self.check_invariants()
    }

    /// Stable bucketing by owner: returns the new slot order and offsets.
    fn bucket_by_owner(&self) -> (Vec<usize>, Vec<usize>) {
        let ranks = self.ranks();
        let mut order = Vec::with_capacity(self.markers.len());
        let mut offsets = Vec::with_capacity(ranks + 1);
        for rank in 0..ranks {
            offsets.push(order.len());
            order.extend(
                self.markers
                    .iter()
                    .enumerate()
                    .filter(|(_, m)| m.owner.index() == rank)
                    .map(|(slot, _)| slot),
            );
        }
        offsets.push(order.len());
        (order, offsets)
    }

    /// Move `markers[order[k]]` to slot `k` and refresh `display_order`.
    fn permute(&mut self, order: Vec<usize>) {
        let mut old: Vec<Option<Marker>> = std::mem::take(&mut self.markers)
            .into_iter()
            .map(Some)
            .collect();
        self.markers = order
            .into_iter()
            .filter_map(|slot| old[slot].take())
            .collect();
        for (slot, m) in self.markers.iter().enumerate() {
            self.display_order[m.id.index()] = slot;
        }
    }

    /// Check every structural invariant of the layout.
    pub fn check_invariants(&self) -> Result<(), LineError> {
        let n = self.markers.len();
        let corrupt =
            |reason: String| -> Result<(), LineError> { Err(LineError::OffsetCorruption { reason }) };

        if self.offsets.first() != Some(&0) || self.offsets.last() != Some(&n) {
            return corrupt(format!("offsets {:?} do not span 0..{n}", self.offsets));
        }
        if self.offsets.windows(2).any(|w| w[0] > w[1]) {
            return corrupt(format!("offsets {:?} are not monotone", self.offsets));
        }
        if self.display_order.len() != n {
            return corrupt(format!(
                "display order has {} entries for {n} markers",
                self.display_order.len()
            ));
        }
        for (id, &slot) in self.display_order.iter().enumerate() {
            if self.markers.get(slot).map(|m| m.id.index()) != Some(id) {
                return corrupt(format!("display order maps marker {id} to slot {slot}"));
            }
        }
        for rank in 0..self.ranks() {
            let range_rank = Rank(rank as u32);
            for m in &self.markers[self.range(range_rank)] {
                if m.is_outside() && range_rank != Rank::SINK {
                    return Err(LineError::ExitedOffSink {
                        marker: m.id,
                        rank: range_rank,
                    });
                }
                if m.owner != range_rank {
                    return Err(LineError::OwnerMismatch {
                        marker: m.id,
                        owner: m.owner,
                        range: range_rank,
                    });
                }
            }
        }
        Ok(())
    }

    // ── Accessors ──────────────────────────────────────────────────

    /// Number of markers.
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    /// Whether the line holds no markers.
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Number of ranks the line is partitioned over.
    pub fn ranks(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Markers in storage order.
    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    /// Marker at `slot`.
    pub fn marker(&self, slot: usize) -> &Marker {
        &self.markers[slot]
    }

    pub(crate) fn marker_mut(&mut self, slot: usize) -> &mut Marker {
        &mut self.markers[slot]
    }

    /// The offset table, `ranks + 1` entries.
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// Original insertion index → current slot.
    pub fn display_order(&self) -> &[usize] {
        &self.display_order
    }

    /// Slots owned by `rank`.
    pub fn range(&self, rank: Rank) -> Range<usize> {
        self.offsets[rank.index()]..self.offsets[rank.index() + 1]
    }

    /// Current slot of `id`.
    pub fn slot_of(&self, id: MarkerId) -> usize {
        self.display_order[id.index()]
    }

    /// Marker with original insertion index `id`.
    pub fn get(&self, id: MarkerId) -> Option<&Marker> {
        self.display_order
            .get(id.index())
            .map(|&slot| &self.markers[slot])
    }

    /// Current positions in original insertion order.
    pub fn positions(&self) -> Vec<Point> {
        self.display_order
            .iter()
            .map(|&slot| self.markers[slot].position.clone())
            .collect()
    }

    /// Positions in insertion order with the first repeated at the end.
    ///
    /// Empty for an empty line.
    pub fn line_points(&self) -> Vec<Point> {
        let mut points = self.positions();
        if let Some(first) = points.first().cloned() {
            points.push(first);
        }
        points
    }

    /// Number of markers outside the domain.
    ///
    /// Counted over the sink rank's range, where all of them live.
    pub fn outside_count(&self) -> usize {
        self.markers[self.range(Rank::SINK)]
            .iter()
            .filter(|m| m.is_outside())
            .count()
    }
}
