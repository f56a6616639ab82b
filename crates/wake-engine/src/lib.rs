//! Distributed Lagrangian marker advection for Wake.
//!
//! Markers are points carried by a velocity field defined on a
//! partitioned finite-element mesh. Each rank integrates the markers
//! whose containing element it owns; when a marker crosses into another
//! rank's partition its in-flight Runge-Kutta state is handed over, and
//! the replicated [`Line`] is reordered so every rank's markers are
//! contiguous and grouped by element.
//!
//! Start with [`Tracker`]: build one per rank from the same points, then
//! call [`Tracker::advect`] on every rank. A solver that moves markers
//! itself hands the new positions to [`Tracker::migrate`] instead.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

mod advect;
pub mod arena;
pub mod config;
pub mod error;
pub mod exchange;
pub mod line;
pub mod marker;
pub mod metrics;
pub mod payload;
pub mod rk;
pub mod tracker;

pub use advect::ForceFn;
pub use arena::{StageArena, StageState};
pub use config::{AdvectParams, ConfigError, ExitPolicy, TrackerConfig};
pub use error::{AdvectError, LineError, ProtocolError};
pub use exchange::{Envelope, EnvelopeKind};
pub use line::Line;
pub use marker::{locate, Marker};
pub use metrics::AdvectMetrics;
pub use payload::PayloadStore;
pub use rk::{ButcherTableau, RkOrder};
pub use tracker::Tracker;
