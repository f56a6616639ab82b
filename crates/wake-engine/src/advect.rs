//! The round-based advection driver.
//!
//! Each round is a barrier-delimited sequence of phases:
//!
//! 1. **Local**: every rank integrates the markers it owns until each one
//!    finishes, leaves the domain, or crosses into another rank's
//!    partition. No communication.
//! 2. **Tally**: `all_sum` of the finished counts.
//! 3. **Exchange**: metadata broadcast and state hand-off
//!    (see [`exchange`](crate::exchange)).
//! 4. **Reorder**: [`Line::update_line`].
//!
//! The loop ends after the round whose tally equals the marker count.
//! Steps never decrease and are bounded by `n * order`, and a marker
//! outside the domain is never located again, so the loop terminates.

use std::time::Instant;

use indexmap::map::Entry;
use indexmap::IndexMap;
use smallvec::SmallVec;
use wake_comm::Communicator;
use wake_core::{ElementId, Point, Step, TimeLevel};
use wake_mesh::{Mesh, VelocityField};

use crate::arena::StageArena;
use crate::config::{AdvectParams, ConfigError, ExitPolicy, TrackerConfig};
use crate::error::{AdvectError, ProtocolError};
use crate::exchange::Exchange;
use crate::line::Line;
use crate::metrics::AdvectMetrics;
use crate::payload::PayloadStore;

/// External force callback: `(position, element material) -> force`.
///
/// The result is added to the interpolated velocity before scaling by
/// the step size, so it must have the mesh's dimension.
pub type ForceFn = dyn Fn(&[f64], u32) -> Point + Sync;

// ── Element velocity cache ─────────────────────────────────────────

/// Nodal velocities of one element at both time levels, in dof order.
#[derive(Debug)]
struct ElementVelocity {
    start: SmallVec<[Point; 8]>,
    end: SmallVec<[Point; 8]>,
}

/// Per-call cache of gathered nodal velocities.
///
/// Markers are grouped by element after every reorder, so consecutive
/// markers usually hit the same entry.
pub(crate) struct VelocityCache<'a> {
    mesh: &'a dyn Mesh,
    field: &'a dyn VelocityField,
    entries: IndexMap<ElementId, ElementVelocity>,
}

impl<'a> VelocityCache<'a> {
    pub fn new(mesh: &'a dyn Mesh, field: &'a dyn VelocityField) -> Self {
        Self {
            mesh,
            field,
            entries: IndexMap::new(),
        }
    }

    /// Velocity at reference point `local` of `element`, blended between
    /// the two snapshots at fraction `s`: `s·v_end + (1 - s)·v_start`.
    pub fn velocity(
        &mut self,
        element: ElementId,
        local: &[f64],
        s: f64,
        metrics: &mut AdvectMetrics,
    ) -> Point {
        let (mesh, field) = (self.mesh, self.field);
        let entry = match self.entries.entry(element) {
            Entry::Occupied(e) => {
                metrics.cache_hits += 1;
                e.into_mut()
            }
            Entry::Vacant(e) => {
                metrics.cache_misses += 1;
                let dofs = mesh.element_dofs(element);
                e.insert(ElementVelocity {
                    start: dofs
                        .iter()
                        .map(|&d| field.nodal_velocity(d, TimeLevel::Start))
                        .collect(),
                    end: dofs
                        .iter()
                        .map(|&d| field.nodal_velocity(d, TimeLevel::End))
                        .collect(),
                })
            }
        };

        let phi = mesh.evaluate_basis(element, local);
        let dim = mesh.dim();
        let mut v_start: Point = std::iter::repeat_n(0.0, dim).collect();
        let mut v_end = v_start.clone();
        for (i, &w) in phi.iter().enumerate() {
            for d in 0..dim {
                v_start[d] += w * entry.start[i][d];
                v_end[d] += w * entry.end[i][d];
            }
        }
        v_start
            .iter()
            .zip(&v_end)
            .map(|(a, b)| s * b + (1.0 - s) * a)
            .collect()
    }
}

// ── Driver ─────────────────────────────────────────────────────────

/// One rank's view of an `advect` call.
pub(crate) struct Driver<'a> {
    pub comm: &'a dyn Communicator,
    pub mesh: &'a dyn Mesh,
    pub field: &'a dyn VelocityField,
    pub force: Option<&'a ForceFn>,
    pub config: &'a TrackerConfig,
    pub params: &'a AdvectParams,
    pub line: &'a mut Line,
    pub arena: &'a mut StageArena,
    pub payloads: &'a mut PayloadStore,
}

impl Driver<'_> {
    /// Advance every marker through `n * order` stages, or until it
    /// leaves the domain. Collective: every rank must call it.
    pub fn run(mut self) -> Result<AdvectMetrics, AdvectError> {
        let started = Instant::now();
        self.params.validate()?;
        if self.field.dim() != self.mesh.dim() {
            return Err(ConfigError::VelocityDimension {
                expected: self.mesh.dim(),
                found: self.field.dim(),
            }
            .into());
        }

        let me = self.comm.rank();
        let size = self.line.len() as u64;
        let mut metrics = AdvectMetrics::default();
        let mut cache = VelocityCache::new(self.mesh, self.field);

        self.arena.reset(self.params.order.stages());
        for slot in 0..self.line.len() {
            let m = self.line.marker_mut(slot);
            m.step = if m.is_outside() { Step::Done } else { Step::At(0) };
        }

        loop {
            metrics.rounds += 1;

            let t = Instant::now();
            let mut finished = 0u64;
            for slot in self.line.range(me) {
                self.integrate(slot, &mut cache, &mut metrics)?;
                if self.line.marker(slot).step.is_done() {
                    finished += 1;
                }
            }
            metrics.local_us += t.elapsed().as_micros() as u64;

            let t = Instant::now();
            let total = self.comm.all_sum(finished)?;
            Exchange {
                comm: self.comm,
                mesh: self.mesh,
                line: &mut *self.line,
                arena: &mut *self.arena,
                payloads: &mut *self.payloads,
                metrics: &mut metrics,
            }
            .run()?;
            self.comm.barrier()?;
            debug_assert!(self.arena.is_consistent());
            metrics.exchange_us += t.elapsed().as_micros() as u64;

            let t = Instant::now();
            self.line.update_line()?;
            metrics.reorder_us += t.elapsed().as_micros() as u64;

            log::debug!(
                "rank {me} round {}: {total}/{size} markers finished",
                metrics.rounds
            );
            if total == size {
                break;
            }
        }

        metrics.total_us = started.elapsed().as_micros() as u64;
        log::info!("advect on rank {me}: {metrics}");
        Ok(metrics)
    }

    /// Integrate the marker at `slot` until it finishes, exits, or
    /// crosses into another rank's partition.
    fn integrate(
        &mut self,
        slot: usize,
        cache: &mut VelocityCache<'_>,
        metrics: &mut AdvectMetrics,
    ) -> Result<(), AdvectError> {
        let me = self.comm.rank();
        let mesh = self.mesh;
        let order = self.params.order.stages();
        let substeps = self.params.substeps;
        let total = self.params.total_stages();
        let tableau = self.params.tableau();
        let h = self.params.step_size();
        let max_hops = self.config.max_hops;
        let exit_policy = self.config.exit_policy;
        let force = self.force;

        let marker = self.line.marker_mut(slot);
        let id = marker.id;

        while let Step::At(k) = marker.step {
            if k >= total {
                break;
            }
            let Some(element) = marker.element else {
                marker.step = Step::Done;
                break;
            };
            let macro_index = k / order as u32;
            let stage = k as usize % order;

            let state = if stage == 0 {
                let state = self.arena.get_or_alloc(id);
                state.begin_macro_step(&marker.position);
                state
            } else {
                self.arena
                    .get_mut(id)
                    .ok_or(ProtocolError::MissingState {
                        marker: id,
                        step: marker.step,
                        rank: me,
                    })?
            };

            let s = tableau.time_fraction(macro_index, stage, substeps);
            let mut v = cache.velocity(element, &marker.local, s, metrics);
            if let Some(force) = force {
                let f = force(marker.position.as_slice(), mesh.element_material(element));
                if f.len() != v.len() {
                    return Err(ConfigError::ForceDimension {
                        expected: v.len(),
                        found: f.len(),
                    }
                    .into());
                }
                v.iter_mut().zip(&f).for_each(|(vd, fd)| *vd += fd);
            }
            v.iter_mut().for_each(|vd| *vd *= h);
            state.stages[stage] = v;

            let next = if stage + 1 < order {
                tableau.stage_point(stage + 1, &state.old_position, &state.stages)
            } else {
                tableau.advance(&state.old_position, &state.stages)
            };
            let coast = match exit_policy {
                ExitPolicy::Freeze => None,
                ExitPolicy::Coast => {
                    let remaining = f64::from(substeps - macro_index);
                    Some(
                        state
                            .old_position
                            .iter()
                            .zip(&state.stages[stage])
                            .map(|(x0, kd)| x0 + remaining * kd)
                            .collect::<Point>(),
                    )
                }
            };
            marker.step = Step::At(k + 1);
            metrics.stages += 1;

            if !marker.relocate(mesh, next, max_hops) {
                if let Some(x) = coast {
                    marker.position = x;
                }
                log::warn!(
                    "marker {id} left the domain at {:?} on rank {me}",
                    marker.position.as_slice()
                );
                metrics.exited += 1;
                self.arena.release(id);
                return Ok(());
            }
            if marker.owning_process(mesh) != me {
                break;
            }
        }

        if marker.step == Step::At(total) {
            marker.step = Step::Done;
            self.arena.release(id);
        }
        Ok(())
    }
}
