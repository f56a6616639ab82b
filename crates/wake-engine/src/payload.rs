//! Per-marker quantities that travel with their owner.
//!
//! A solver coupled to the tracker (a material-point method, say) keeps
//! a fixed-width vector of values per marker: mass, velocity, a
//! deformation gradient. Only the owning rank stores it; the exchange
//! hands it to the new owner together with any stage state. Markers that
//! leave the domain lose their payload.

use indexmap::IndexMap;
use wake_core::MarkerId;

/// Owner-local store of fixed-width `f64` payloads.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PayloadStore {
    width: usize,
    values: IndexMap<MarkerId, Vec<f64>>,
}

impl PayloadStore {
    /// Empty store for payloads of `width` values.
    pub fn new(width: usize) -> Self {
        Self {
            width,
            values: IndexMap::new(),
        }
    }

    /// Values per marker. Zero disables payload transfer.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Store `values` for `marker`, replacing any previous payload.
    ///
    /// Returns `false` and stores nothing if the length is not `width`.
    pub fn insert(&mut self, marker: MarkerId, values: Vec<f64>) -> bool {
        if values.len() != self.width {
            return false;
        }
        self.values.insert(marker, values);
        true
    }

    /// Payload of `marker`, if this rank holds it.
    pub fn get(&self, marker: MarkerId) -> Option<&[f64]> {
        self.values.get(&marker).map(Vec::as_slice)
    }

    /// Mutable payload of `marker`, if this rank holds it.
    pub fn get_mut(&mut self, marker: MarkerId) -> Option<&mut [f64]> {
        self.values.get_mut(&marker).map(Vec::as_mut_slice)
    }

    /// Remove and return the payload of `marker`.
    pub fn release(&mut self, marker: MarkerId) -> Option<Vec<f64>> {
        self.values.swap_remove(&marker)
    }

    /// Number of markers with a payload here.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no marker has a payload here.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
