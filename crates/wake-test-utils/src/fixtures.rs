//! Reusable meshes, fields, and marker clouds.
//!
//! - [`split_strip`]: `[0, 2] × [0, 1]` split into slabs along x
//! - [`box_mesh`]: arbitrary 2D box, panicking on bad input
//! - [`uniform_field`] and [`rotating_field`]: analytic velocity fields
//! - [`random_points`]: deterministic marker clouds from a seed

use std::fmt::Debug;

use rand::prelude::*;
use rand::rngs::ChaCha8Rng;
use smallvec::smallvec;
use wake_comm::{Cluster, ClusterConfig, ThreadComm};
use wake_core::{point_from_slice, Point};
use wake_mesh::{BoxMesh, NodalField};

/// `[0, 2] × [0, 1]` with two cells per rank along x and two along y.
///
/// With two ranks the partition boundary is `x = 1`.
pub fn split_strip(ranks: u32) -> BoxMesh {
    box_mesh([0.0, 0.0], [2.0, 1.0], [2 * ranks, 2], ranks)
}

/// A 2D box mesh. Panics on invalid geometry.
pub fn box_mesh(lower: [f64; 2], upper: [f64; 2], cells: [u32; 2], ranks: u32) -> BoxMesh {
    BoxMesh::new(&lower, &upper, &cells, ranks)
        .unwrap_or_else(|e| panic!("fixture mesh is invalid: {e}"))
}

/// Constant velocity `v` at both time levels.
pub fn uniform_field(mesh: &BoxMesh, v: &[f64]) -> NodalField {
    NodalField::sample_steady(mesh, |_| point_from_slice(v))
}

/// Rigid rotation about the origin, `v = (-y, x)`.
pub fn rotating_field(mesh: &BoxMesh) -> NodalField {
    NodalField::sample_steady(mesh, |x| smallvec![-x[1], x[0]])
}

/// `n` points drawn uniformly from the box `[lower, upper)`.
///
/// The same seed always gives the same points.
pub fn random_points(seed: u64, n: usize, lower: &[f64], upper: &[f64]) -> Vec<Point> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            lower
                .iter()
                .zip(upper)
                .map(|(&lo, &hi)| lo + (hi - lo) * rng.random::<f64>())
                .collect()
        })
        .collect()
}

/// Run `f` on every rank of a `ranks`-thread cluster and return the
/// per-rank results in rank order.
///
/// Panics if the cluster fails or any rank returns an error.
pub fn on_cluster<T, E, F>(ranks: usize, f: F) -> Vec<T>
where
    T: Send,
    E: Send + Debug,
    F: Fn(ThreadComm) -> Result<T, E> + Sync,
{
    let config = ClusterConfig {
        thread_name_prefix: "wake-test".to_string(),
        ..ClusterConfig::with_ranks(ranks)
    };
    Cluster::run(&config, f)
        .unwrap_or_else(|e| panic!("cluster failed: {e}"))
        .into_iter()
        .enumerate()
        .map(|(rank, r)| r.unwrap_or_else(|e| panic!("rank {rank} failed: {e:?}")))
        .collect()
}
