//! Wake: distributed Lagrangian particle tracking on partitioned
//! finite-element meshes.
//!
//! This is the top-level facade crate that re-exports the public API from
//! all Wake sub-crates.
//!
//! # Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use smallvec::smallvec;
//! use wake::prelude::*;
//!
//! let grid = BoxMesh::new(&[0.0, 0.0], &[2.0, 1.0], &[4, 2], 2).unwrap();
//! let field = NodalField::sample_steady(&grid, |_| smallvec![1.0, 0.0]);
//! let mesh: Arc<dyn Mesh> = Arc::new(grid);
//! let points: Vec<Point> = vec![smallvec![0.1, 0.5], smallvec![0.9, 0.5]];
//! let kinds = [MarkerKind::Volume; 2];
//!
//! let results = Cluster::run(&ClusterConfig::with_ranks(2), |comm| {
//!     let mut tracker =
//!         Tracker::new(TrackerConfig::default(), &points, &kinds, Arc::clone(&mesh), comm)?;
//!     tracker.advect(&field, &AdvectParams::new(2, 1.0, RkOrder::First), None)?;
//!     Ok::<_, AdvectError>(tracker.positions())
//! })
//! .unwrap();
//!
//! for positions in results {
//!     let positions = positions.unwrap();
//!     assert!((positions[0][0] - 1.1).abs() < 1e-12);
//!     assert!((positions[1][0] - 1.9).abs() < 1e-12);
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `wake-core` | ids, `Point`, marker kinds and steps |
//! | [`mesh`] | `wake-mesh` | `Mesh` and `VelocityField` traits, `BoxMesh` |
//! | [`comm`] | `wake-comm` | `Communicator`, thread cluster, frame codec |
//! | [`engine`] | `wake-engine` | markers, line, RK tableaux, `Tracker` |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Identifiers and small value types (`wake-core`).
pub use wake_core as types;

/// Mesh and velocity-field contracts (`wake-mesh`).
///
/// Implement [`mesh::Mesh`] and [`mesh::VelocityField`] to plug in a
/// finite-element code; [`mesh::BoxMesh`] is the built-in backend.
pub use wake_mesh as mesh;

/// SPMD communication (`wake-comm`).
///
/// [`comm::Cluster`] runs one thread per rank; [`comm::LocalComm`] is the
/// single-rank group.
pub use wake_comm as comm;

/// Marker advection (`wake-engine`).
///
/// [`engine::Tracker`] is the entry point.
pub use wake_engine as engine;

/// Common imports for typical Wake usage.
///
/// ```rust
/// use wake::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use wake_core::{ElementId, MarkerId, MarkerKind, Point, Rank, Step, TimeLevel};

    // Mesh
    pub use wake_mesh::{BoxMesh, Mesh, NodalField, VelocityField};

    // Communication
    pub use wake_comm::{Cluster, ClusterConfig, CommError, Communicator, LocalComm};

    // Engine
    pub use wake_engine::{
        AdvectError, AdvectMetrics, AdvectParams, ExitPolicy, ForceFn, RkOrder, Tracker,
        TrackerConfig,
    };
}
