//! The user-facing marker tracker.
//!
//! [`Tracker`] is one rank's handle on a distributed set of markers. Every
//! rank of a group builds its own `Tracker` from the same points and the
//! same mesh, then calls [`advect()`](Tracker::advect) collectively.
//!
//! # Ownership model
//!
//! The tracker owns its communicator, stage arena, and payload store.
//! `advect` and `migrate` take `&mut self`, so results read through the
//! accessors always reflect a completed call. If either returns an error
//! the markers are left wherever the failing round stopped; the tracker
//! should be dropped.

use std::sync::Arc;
use std::time::Instant;

use wake_comm::Communicator;
use wake_core::{MarkerId, MarkerKind, Point, Rank};
use wake_mesh::{Mesh, VelocityField};

use crate::advect::{Driver, ForceFn};
use crate::arena::StageArena;
use crate::config::{AdvectParams, ConfigError, TrackerConfig};
use crate::error::AdvectError;
use crate::exchange::Exchange;
use crate::line::Line;
use crate::metrics::AdvectMetrics;
use crate::payload::PayloadStore;

// Compile-time assertion: a tracker over a thread-cluster rank can be
// moved into that rank's thread.
const _: () = {
    #[allow(dead_code)]
    fn assert_send<T: Send>() {}
    #[allow(dead_code)]
    fn check() {
        assert_send::<Tracker<wake_comm::ThreadComm>>();
    }
};

/// One rank's view of a distributed Lagrangian marker set.
///
/// # Exits
///
/// With the default [`ExitPolicy::Freeze`](crate::ExitPolicy::Freeze) a
/// marker that leaves the domain keeps the first position found outside,
/// so it stops short of where the flow would have carried it. A marker
/// at `x = 1.9` in a strip ending at `x = 2` under a uniform `v = 1` for
/// one time unit in two Euler steps ends at `2.4`, not `2.9`. Choose
/// [`ExitPolicy::Coast`](crate::ExitPolicy::Coast) to carry it the rest
/// of the interval with its last increment.
///
/// # Example
///
/// ```ignore
/// let mut tracker = Tracker::new(TrackerConfig::default(), &points, &kinds, mesh, comm)?;
/// let metrics = tracker.advect(&field, &AdvectParams::new(10, 1.0, RkOrder::Fourth), None)?;
/// let positions = tracker.positions();
/// ```
pub struct Tracker<C: Communicator> {
    config: TrackerConfig,
    mesh: Arc<dyn Mesh>,
    comm: C,
    line: Line,
    arena: StageArena,
    payloads: PayloadStore,
    last_metrics: AdvectMetrics,
}

impl<C: Communicator> Tracker<C> {
    /// Create markers at `points` with the matching `kinds`.
    ///
    /// Validates the configuration, checks that the mesh is partitioned
    /// into exactly `comm.size()` ranks, and locates every point.
    pub fn new(
        config: TrackerConfig,
        points: &[Point],
        kinds: &[MarkerKind],
        mesh: Arc<dyn Mesh>,
        comm: C,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        if mesh.rank_count() != comm.size() {
            return Err(ConfigError::RankCountMismatch {
                mesh: mesh.rank_count(),
                comm: comm.size(),
            });
        }
        let line = Line::new(points, kinds, mesh.as_ref())?;
        let arena = StageArena::new(1, mesh.dim());
        let mut payloads = PayloadStore::new(config.payload_width);
        if config.payload_width > 0 {
            for m in &line.markers()[line.range(comm.rank())] {
                if !m.is_outside() {
                    payloads.insert(m.id, vec![0.0; config.payload_width]);
                }
            }
        }
        log::debug!(
            "rank {}: tracking {} markers, {} local",
            comm.rank(),
            line.len(),
            line.range(comm.rank()).len()
        );
        Ok(Self {
            config,
            mesh,
            comm,
            line,
            arena,
            payloads,
            last_metrics: AdvectMetrics::default(),
        })
    }

    /// Advance every marker through `params.substeps` Runge-Kutta steps
    /// covering `params.duration`.
    ///
    /// `field` supplies nodal velocities at the start and end of the
    /// interval. `force`, if given, is added to the interpolated velocity
    /// at every stage. Collective: every rank must call it with the same
    /// arguments.
    ///
    /// # Errors
    ///
    /// [`AdvectError::Config`] for invalid parameters or mismatched
    /// dimensions, [`AdvectError::Comm`] if a peer disappears, and
    /// [`AdvectError::Protocol`] or [`AdvectError::Line`] if the exchange
    /// detects a broken migration invariant.
    pub fn advect(
        &mut self,
        field: &dyn VelocityField,
        params: &AdvectParams,
        force: Option<&ForceFn>,
    ) -> Result<AdvectMetrics, AdvectError> {
        let metrics = Driver {
            comm: &self.comm,
            mesh: self.mesh.as_ref(),
            field,
            force,
            config: &self.config,
            params,
            line: &mut self.line,
            arena: &mut self.arena,
            payloads: &mut self.payloads,
        }
        .run()?;
        self.last_metrics = metrics.clone();
        Ok(metrics)
    }

    /// Move every locally owned marker to the position a coupled solver
    /// computed for it, then settle ownership.
    ///
    /// `positions` has one entry per marker in insertion order, on every
    /// rank; only the entries of markers this rank owns are read. Markers
    /// that cross a partition boundary take their payload to the new
    /// owner. Markers that leave the domain are handed to the sink and
    /// drop their payload. Collective.
    ///
    /// # Errors
    ///
    /// [`AdvectError::Config`] if the position count or any position's
    /// dimension is wrong (checked before anything moves), otherwise as
    /// for [`advect()`](Self::advect).
    pub fn migrate(&mut self, positions: &[Point]) -> Result<AdvectMetrics, AdvectError> {
        let started = Instant::now();
        if positions.len() != self.line.len() {
            return Err(ConfigError::PositionCountMismatch {
                markers: self.line.len(),
                positions: positions.len(),
            }
            .into());
        }
        let dim = self.mesh.dim();
        if let Some((i, p)) = positions.iter().enumerate().find(|(_, p)| p.len() != dim) {
            return Err(ConfigError::PointDimension {
                marker: MarkerId(i as u32),
                expected: dim,
                found: p.len(),
            }
            .into());
        }

        let me = self.comm.rank();
        let mut metrics = AdvectMetrics {
            rounds: 1,
            ..AdvectMetrics::default()
        };
        let t = Instant::now();
        for slot in self.line.range(me) {
            let marker = self.line.marker_mut(slot);
            if marker.is_outside() {
                continue;
            }
            let target = positions[marker.id.index()].clone();
            if !marker.relocate(self.mesh.as_ref(), target, self.config.max_hops) {
                log::warn!(
                    "marker {} left the domain at {:?} on rank {me}",
                    marker.id,
                    marker.position.as_slice()
                );
                metrics.exited += 1;
            }
        }
        metrics.local_us = t.elapsed().as_micros() as u64;

        let t = Instant::now();
        Exchange {
            comm: &self.comm,
            mesh: self.mesh.as_ref(),
            line: &mut self.line,
            arena: &mut self.arena,
            payloads: &mut self.payloads,
            metrics: &mut metrics,
        }
        .run()?;
        self.comm.barrier()?;
        metrics.exchange_us = t.elapsed().as_micros() as u64;

        let t = Instant::now();
        self.line.update_line()?;
        metrics.reorder_us = t.elapsed().as_micros() as u64;

        metrics.total_us = started.elapsed().as_micros() as u64;
        log::info!("migrate on rank {me}: {metrics}");
        self.last_metrics = metrics.clone();
        Ok(metrics)
    }

    /// Payload of `id`, if this rank owns it.
    pub fn payload(&self, id: MarkerId) -> Option<&[f64]> {
        self.payloads.get(id)
    }

    /// Overwrite the payload of a marker this rank owns.
    ///
    /// # Errors
    ///
    /// [`ConfigError::PayloadWidth`] if `values` is not `payload_width`
    /// long, [`ConfigError::NotLocal`] if this rank does not hold the
    /// marker's payload.
    pub fn set_payload(&mut self, id: MarkerId, values: &[f64]) -> Result<(), ConfigError> {
        let width = self.payloads.width();
        if values.len() != width {
            return Err(ConfigError::PayloadWidth {
                marker: id,
                expected: width,
                found: values.len(),
            });
        }
        let rank = self.comm.rank();
        let slot = self
            .payloads
            .get_mut(id)
            .ok_or(ConfigError::NotLocal { marker: id, rank })?;
        slot.copy_from_slice(values);
        Ok(())
    }

    /// Marker positions in the order the points were given.
    pub fn positions(&self) -> Vec<Point> {
        self.line.positions()
    }

    /// [`positions()`](Self::positions) closed into a loop.
    pub fn line_points(&self) -> Vec<Point> {
        self.line.line_points()
    }

    /// Number of markers that have left the domain.
    pub fn outside_count(&self) -> usize {
        self.line.outside_count()
    }

    /// The replicated marker container.
    pub fn line(&self) -> &Line {
        &self.line
    }

    /// The shared mesh.
    pub fn mesh(&self) -> &dyn Mesh {
        self.mesh.as_ref()
    }

    /// This rank's communicator.
    pub fn comm(&self) -> &C {
        &self.comm
    }

    /// This rank.
    pub fn rank(&self) -> Rank {
        self.comm.rank()
    }

    /// The configuration the tracker was built with.
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Metrics from the most recent successful `advect` or `migrate` call.
    pub fn last_metrics(&self) -> &AdvectMetrics {
        &self.last_metrics
    }

    /// Markers with live stage state on this rank.
    pub fn in_flight(&self) -> usize {
        self.arena.live_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;
    use wake_comm::LocalComm;
    use wake_core::ElementId;
    use wake_mesh::{BoxMesh, NodalField};

    use crate::config::ExitPolicy;
    use crate::rk::RkOrder;

    fn channel() -> Arc<dyn Mesh> {
        Arc::new(BoxMesh::new(&[0.0, 0.0], &[4.0, 1.0], &[8, 2], 1).unwrap())
    }

    fn tracker(points: &[Point], config: TrackerConfig) -> Tracker<LocalComm> {
        let kinds = vec![MarkerKind::Boundary; points.len()];
        Tracker::new(config, points, &kinds, channel(), LocalComm::new()).unwrap()
    }

    #[test]
    fn new_rejects_rank_count_mismatch() {
        let mesh: Arc<dyn Mesh> =
            Arc::new(BoxMesh::new(&[0.0], &[1.0], &[4], 2).unwrap());
        let r = Tracker::new(
            TrackerConfig::default(),
            &[smallvec![0.5]],
            &[MarkerKind::Volume],
            mesh,
            LocalComm::new(),
        );
        assert_eq!(
            r.err(),
            Some(ConfigError::RankCountMismatch { mesh: 2, comm: 1 })
        );
    }

    #[test]
    fn new_rejects_invalid_config() {
        let config = TrackerConfig {
            max_hops: 0,
            ..TrackerConfig::default()
        };
        let r = Tracker::new(config, &[], &[], channel(), LocalComm::new());
        assert_eq!(r.err(), Some(ConfigError::ZeroHops));
    }

    #[test]
    fn new_rejects_kind_count_mismatch() {
        let r = Tracker::new(
            TrackerConfig::default(),
            &[smallvec![0.5, 0.5]],
            &[],
            channel(),
            LocalComm::new(),
        );
        assert_eq!(r.err(), Some(ConfigError::KindCountMismatch { points: 1, kinds: 0 }));
    }

    #[test]
    fn empty_tracker_advects_in_one_round() {
        let mut t = tracker(&[], TrackerConfig::default());
        let mesh = BoxMesh::new(&[0.0, 0.0], &[4.0, 1.0], &[8, 2], 1).unwrap();
        let field = NodalField::sample_steady(&mesh, |_| smallvec![1.0, 0.0]);
        let m = t.advect(&field, &AdvectParams::new(3, 1.0, RkOrder::Third), None).unwrap();
        assert_eq!(m.rounds, 1);
        assert_eq!(m.stages, 0);
        assert!(t.positions().is_empty());
        assert!(t.line_points().is_empty());
    }

    #[test]
    fn consecutive_advects_continue_from_last_positions() {
        let mut t = tracker(&[smallvec![0.25, 0.5]], TrackerConfig::default());
        let mesh = BoxMesh::new(&[0.0, 0.0], &[4.0, 1.0], &[8, 2], 1).unwrap();
        let field = NodalField::sample_steady(&mesh, |_| smallvec![1.0, 0.0]);
        let params = AdvectParams::new(4, 1.0, RkOrder::Second);
        t.advect(&field, &params, None).unwrap();
        t.advect(&field, &params, None).unwrap();
        assert!((t.positions()[0][0] - 2.25).abs() < 1e-12);
        assert_eq!(t.last_metrics().stages, 8);
        assert_eq!(t.in_flight(), 0);
    }

    #[test]
    fn exited_markers_stay_outside() {
        let mut t = tracker(
            &[smallvec![3.9, 0.5], smallvec![0.5, 0.5]],
            TrackerConfig {
                exit_policy: ExitPolicy::Freeze,
                ..TrackerConfig::default()
            },
        );
        let mesh = BoxMesh::new(&[0.0, 0.0], &[4.0, 1.0], &[8, 2], 1).unwrap();
        let field = NodalField::sample_steady(&mesh, |_| smallvec![1.0, 0.0]);
        let params = AdvectParams::new(2, 1.0, RkOrder::First);

        let first = t.advect(&field, &params, None).unwrap();
        assert_eq!(first.exited, 1);
        assert_eq!(t.outside_count(), 1);
        assert!((t.positions()[0][0] - 4.4).abs() < 1e-12);

        let second = t.advect(&field, &params, None).unwrap();
        assert_eq!(second.exited, 0);
        assert_eq!(t.outside_count(), 1);
        assert!((t.positions()[0][0] - 4.4).abs() < 1e-12);
        assert!((t.positions()[1][0] - 2.5).abs() < 1e-12);
    }

    #[test]
    fn line_points_close_the_loop() {
        let t = tracker(
            &[smallvec![0.5, 0.5], smallvec![1.5, 0.5], smallvec![1.0, 0.8]],
            TrackerConfig::default(),
        );
        let pts = t.line_points();
        assert_eq!(pts.len(), 4);
        assert_eq!(pts[0], pts[3]);
        assert_eq!(pts[1].as_slice(), &[1.5, 0.5]);
    }

    #[test]
    fn accessors_reflect_construction() {
        let t = tracker(&[smallvec![0.5, 0.5]], TrackerConfig::default());
        assert_eq!(t.rank(), Rank(0));
        assert_eq!(t.comm().size(), 1);
        assert_eq!(t.config().max_hops, TrackerConfig::default().max_hops);
        assert_eq!(t.mesh().dim(), 2);
        assert_eq!(t.line().len(), 1);
        assert_eq!(t.last_metrics(), &AdvectMetrics::default());
    }

    #[test]
    fn migrate_checks_positions_before_moving_anything() {
        let mut t = tracker(&[smallvec![0.5, 0.5], smallvec![1.5, 0.5]], TrackerConfig::default());
        assert_eq!(
            t.migrate(&[smallvec![1.0, 0.5]]),
            Err(AdvectError::Config(ConfigError::PositionCountMismatch {
                markers: 2,
                positions: 1,
            }))
        );
        assert_eq!(
            t.migrate(&[smallvec![1.0, 0.5], smallvec![1.0]]),
            Err(AdvectError::Config(ConfigError::PointDimension {
                marker: MarkerId(1),
                expected: 2,
                found: 1,
            }))
        );
        assert_eq!(t.positions()[0].as_slice(), &[0.5, 0.5]);
    }

    #[test]
    fn migrate_relocates_and_reports_exits() {
        let mut t = tracker(
            &[smallvec![0.5, 0.5], smallvec![1.5, 0.5], smallvec![3.9, 0.2]],
            TrackerConfig::default(),
        );
        let m = t
            .migrate(&[smallvec![2.7, 0.6], smallvec![1.5, 0.5], smallvec![4.3, 0.2]])
            .unwrap();
        assert_eq!(m.rounds, 1);
        assert_eq!(m.exited, 1);
        assert_eq!(m.stages, 0);
        assert_eq!(t.outside_count(), 1);
        assert_eq!(t.positions()[0].as_slice(), &[2.7, 0.6]);
        assert_eq!(t.positions()[2].as_slice(), &[4.3, 0.2]);
        assert_eq!(t.line().get(MarkerId(0)).and_then(|m| m.element), Some(ElementId(13)));
        assert!(t.line().check_invariants().is_ok());
        assert_eq!(t.last_metrics(), &m);

        // An exited marker is not moved again.
        t.migrate(&[smallvec![2.7, 0.6], smallvec![1.5, 0.5], smallvec![1.0, 0.5]])
            .unwrap();
        assert_eq!(t.positions()[2].as_slice(), &[4.3, 0.2]);
    }

    #[test]
    fn payloads_start_zeroed_and_follow_set_payload() {
        let config = TrackerConfig {
            payload_width: 3,
            ..TrackerConfig::default()
        };
        let mut t = tracker(&[smallvec![0.5, 0.5], smallvec![9.0, 0.5]], config);
        assert_eq!(t.payload(MarkerId(0)), Some(&[0.0, 0.0, 0.0][..]));
        // Markers created outside the domain carry nothing.
        assert_eq!(t.payload(MarkerId(1)), None);

        t.set_payload(MarkerId(0), &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(t.payload(MarkerId(0)), Some(&[1.0, 2.0, 3.0][..]));
        assert_eq!(
            t.set_payload(MarkerId(0), &[1.0]),
            Err(ConfigError::PayloadWidth {
                marker: MarkerId(0),
                expected: 3,
                found: 1,
            })
        );
        assert_eq!(
            t.set_payload(MarkerId(1), &[0.0; 3]),
            Err(ConfigError::NotLocal {
                marker: MarkerId(1),
                rank: Rank(0),
            })
        );
    }

    #[test]
    fn payload_survives_advect_and_is_dropped_on_exit() {
        let config = TrackerConfig {
            payload_width: 1,
            ..TrackerConfig::default()
        };
        let mut t = tracker(&[smallvec![0.5, 0.5], smallvec![3.9, 0.5]], config);
        t.set_payload(MarkerId(0), &[4.5]).unwrap();
        t.set_payload(MarkerId(1), &[6.5]).unwrap();
        let mesh = BoxMesh::new(&[0.0, 0.0], &[4.0, 1.0], &[8, 2], 1).unwrap();
        let field = NodalField::sample_steady(&mesh, |_| smallvec![1.0, 0.0]);
        t.advect(&field, &AdvectParams::new(2, 1.0, RkOrder::First), None)
            .unwrap();
        assert_eq!(t.payload(MarkerId(0)), Some(&[4.5][..]));
        assert_eq!(t.payload(MarkerId(1)), None);
    }
}
