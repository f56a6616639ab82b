//! Benchmark profiles for the Wake particle tracker.
//!
//! - [`reference_profile`]: 64x64 channel, 10K markers, rotating flow
//! - [`stress_profile`]: 256x256 channel, 100K markers
//!
//! Both profiles are deterministic for a given seed.

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use wake_core::{MarkerKind, Point};
use wake_mesh::{BoxMesh, NodalField};
use wake_test_utils::{box_mesh, random_points, rotating_field};

/// Everything needed to build a tracker for a benchmark.
pub struct Profile {
    /// The mesh, partitioned into the requested number of ranks.
    pub mesh: BoxMesh,
    /// Rigid rotation about the origin.
    pub field: NodalField,
    /// Marker starting positions inside the unit disc.
    pub points: Vec<Point>,
    /// One kind per point.
    pub kinds: Vec<MarkerKind>,
}

/// 64x64 cells on `[-2, 2]²`, 10K markers.
pub fn reference_profile(seed: u64, ranks: u32) -> Profile {
    profile(seed, ranks, 64, 10_000)
}

/// 256x256 cells on `[-2, 2]²`, 100K markers.
pub fn stress_profile(seed: u64, ranks: u32) -> Profile {
    profile(seed, ranks, 256, 100_000)
}

fn profile(seed: u64, ranks: u32, cells: u32, markers: usize) -> Profile {
    let mesh = box_mesh([-2.0, -2.0], [2.0, 2.0], [cells, cells], ranks);
    let field = rotating_field(&mesh);
    let points = random_points(seed, markers, &[-1.0, -1.0], &[1.0, 1.0]);
    Profile {
        kinds: vec![MarkerKind::Volume; points.len()],
        mesh,
        field,
        points,
    }
}
