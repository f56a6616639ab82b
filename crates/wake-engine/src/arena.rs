//! Slot arena for in-flight Runge-Kutta state.
//!
//! Only the rank that owns a marker holds its stage increments and the
//! position at the start of the current macro-step. [`StageArena`] keeps
//! that state in a reusable slot vector keyed by [`MarkerId`], so markers
//! migrating in and out of a rank recycle slots instead of allocating.

use indexmap::IndexMap;
use smallvec::SmallVec;
use wake_core::{MarkerId, Point};

/// Mid-macro-step integration state of one marker.
#[derive(Clone, Debug, PartialEq)]
pub struct StageState {
    /// Position at the start of the current macro-step.
    pub old_position: Point,
    /// Stage increments `K_0 .. K_{order-1}`, each already scaled by `h`.
    pub stages: SmallVec<[Point; 4]>,
}

impl StageState {
    /// Zeroed state for `order` stages in `dim` dimensions.
    pub fn zeroed(order: usize, dim: usize) -> Self {
        let zero: Point = std::iter::repeat_n(0.0, dim).collect();
        Self {
            old_position: zero.clone(),
            stages: std::iter::repeat_n(zero, order).collect(),
        }
    }

    /// Reset to the start of a macro-step at `position`.
    pub fn begin_macro_step(&mut self, position: &[f64]) {
        self.old_position = Point::from_slice(position);
        for k in &mut self.stages {
            k.iter_mut().for_each(|v| *v = 0.0);
        }
    }
}

#[derive(Clone, Debug)]
struct StageSlot {
    marker: MarkerId,
    state: StageState,
    live: bool,
}

/// Per-rank store of [`StageState`] for the markers this rank owns.
#[derive(Debug)]
pub struct StageArena {
    order: usize,
    dim: usize,
    /// All slots, live and dead.
    slots: Vec<StageSlot>,
    /// Dead slots available for reuse.
    free_list: Vec<usize>,
    /// Live marker → slot index.
    live_map: IndexMap<MarkerId, usize>,
}

impl StageArena {
    /// Empty arena for `order`-stage state in `dim` dimensions.
    pub fn new(order: usize, dim: usize) -> Self {
        Self {
            order,
            dim,
            slots: Vec::new(),
            free_list: Vec::new(),
            live_map: IndexMap::new(),
        }
    }

    /// Drop every entry and switch to a new stage count.
    ///
    /// Slot storage is kept for reuse.
    pub fn reset(&mut self, order: usize) {
        self.order = order;
        self.live_map.clear();
        self.free_list.clear();
        for (i, slot) in self.slots.iter_mut().enumerate() {
            slot.live = false;
            slot.state = StageState::zeroed(order, self.dim);
            self.free_list.push(i);
        }
    }

    /// Stage count of stored state.
    pub fn order(&self) -> usize {
        self.order
    }

    /// State for `marker`, allocating zeroed state if it has none.
    pub fn get_or_alloc(&mut self, marker: MarkerId) -> &mut StageState {
        let idx = match self.live_map.get(&marker) {
            Some(&idx) => idx,
            None => self.alloc_slot(marker, StageState::zeroed(self.order, self.dim)),
        };
        &mut self.slots[idx].state
    }

    /// Store `state` for `marker`, replacing any previous state.
    pub fn insert(&mut self, marker: MarkerId, state: StageState) {
        match self.live_map.get(&marker) {
            Some(&idx) => self.slots[idx].state = state,
            None => {
                self.alloc_slot(marker, state);
            }
        }
    }

    fn alloc_slot(&mut self, marker: MarkerId, state: StageState) -> usize {
        let slot = StageSlot {
            marker,
            state,
            live: true,
        };
        let idx = if let Some(reuse) = self.free_list.pop() {
            self.slots[reuse] = slot;
            reuse
        } else {
            self.slots.push(slot);
            self.slots.len() - 1
        };
        self.live_map.insert(marker, idx);
        idx
    }

    /// State for `marker`, if present.
    pub fn get(&self, marker: MarkerId) -> Option<&StageState> {
        self.live_map.get(&marker).map(|&i| &self.slots[i].state)
    }

    /// Mutable state for `marker`, if present.
    pub fn get_mut(&mut self, marker: MarkerId) -> Option<&mut StageState> {
        match self.live_map.get(&marker) {
            Some(&i) => Some(&mut self.slots[i].state),
            None => None,
        }
    }

    /// Remove and return the state for `marker`; its slot becomes free.
    pub fn release(&mut self, marker: MarkerId) -> Option<StageState> {
        let idx = self.live_map.swap_remove(&marker)?;
        let slot = &mut self.slots[idx];
        slot.live = false;
        self.free_list.push(idx);
        let empty = StageState::zeroed(self.order, self.dim);
        Some(std::mem::replace(&mut slot.state, empty))
    }

    /// Number of live entries.
    pub fn live_count(&self) -> usize {
        self.live_map.len()
    }

    /// Check that the slot table and the live map agree.
    pub fn is_consistent(&self) -> bool {
        let live_slots = self.slots.iter().filter(|s| s.live).count();
        live_slots == self.live_map.len()
            && live_slots + self.free_list.len() == self.slots.len()
            && self
                .live_map
                .iter()
                .all(|(&m, &i)| self.slots[i].live && self.slots[i].marker == m)
    }
}
