//! Tracker and advection configuration, validation, and error types.
//!
//! [`TrackerConfig`] is fixed when a [`Tracker`](crate::Tracker) is built;
//! [`AdvectParams`] is supplied per `advect` call. Both expose a
//! `validate()` that checks structural invariants before any marker
//! state is touched.

use std::error::Error;
use std::fmt;

use wake_core::{MarkerId, Rank};

use crate::rk::{ButcherTableau, RkOrder};

// ── ExitPolicy ─────────────────────────────────────────────────────

/// What happens to a marker's position when it leaves the domain.
///
/// Either way the marker is flagged outside, marked done, and handed to
/// the sink rank.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExitPolicy {
    /// Keep the first position found outside the domain.
    #[default]
    Freeze,
    /// Carry the marker ballistically for the rest of the interval with
    /// its last stage increment.
    Coast,
}

// ── TrackerConfig ──────────────────────────────────────────────────

/// Static configuration of a tracker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Maximum number of neighbour hops a point-location walk may take
    /// before falling back to a global search. Default: 64.
    pub max_hops: u32,
    /// Treatment of markers that leave the domain. Default: `Freeze`.
    pub exit_policy: ExitPolicy,
    /// Number of `f64` quantities carried with each marker and handed to
    /// its new owner on migration. Default: 0.
    pub payload_width: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_hops: 64,
            exit_policy: ExitPolicy::Freeze,
            payload_width: 0,
        }
    }
}

impl TrackerConfig {
    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_hops == 0 {
            return Err(ConfigError::ZeroHops);
        }
        Ok(())
    }
}

// ── AdvectParams ───────────────────────────────────────────────────

/// Parameters of one `advect` call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AdvectParams {
    /// Number of macro-steps `n` the interval is split into.
    pub substeps: u32,
    /// Length `T` of the advection interval.
    pub duration: f64,
    /// Runge-Kutta order.
    pub order: RkOrder,
}

impl AdvectParams {
    /// Bundle parameters. Call [`validate`](Self::validate) before use.
    pub fn new(substeps: u32, duration: f64, order: RkOrder) -> Self {
        Self {
            substeps,
            duration,
            order,
        }
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.substeps == 0 {
            return Err(ConfigError::ZeroSubsteps);
        }
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return Err(ConfigError::InvalidDuration {
                value: self.duration,
            });
        }
        // u32::MAX is the wire encoding of a finished marker.
        match self.substeps.checked_mul(self.order.stages() as u32) {
            Some(total) if total < u32::MAX => Ok(()),
            _ => Err(ConfigError::TooManySubsteps {
                substeps: self.substeps,
                order: self.order.stages() as u32,
            }),
        }
    }

    /// Macro-step size `h = T / n`.
    pub fn step_size(&self) -> f64 {
        self.duration / f64::from(self.substeps)
    }

    /// Stage count `n * order` at which a marker is finished.
    pub fn total_stages(&self) -> u32 {
        self.substeps * self.order.stages() as u32
    }

    /// Butcher tableau for the configured order.
    pub fn tableau(&self) -> &'static ButcherTableau {
        self.order.tableau()
    }
}

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected while validating tracker inputs.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// `substeps` was zero.
    ZeroSubsteps,
    /// `duration` was not finite and positive.
    InvalidDuration {
        /// The rejected value.
        value: f64,
    },
    /// Only orders 1 to 4 have a tableau.
    UnsupportedOrder {
        /// The rejected order.
        order: u32,
    },
    /// `substeps * order` does not fit the step counter.
    TooManySubsteps {
        /// Requested macro-steps.
        substeps: u32,
        /// Requested order.
        order: u32,
    },
    /// `max_hops` was zero.
    ZeroHops,
    /// Points and kinds have different lengths.
    KindCountMismatch {
        /// Number of points.
        points: usize,
        /// Number of kinds.
        kinds: usize,
    },
    /// More markers than ids can address.
    TooManyMarkers {
        /// Number of points supplied.
        count: usize,
    },
    /// A point does not have the mesh's dimension.
    PointDimension {
        /// Insertion index of the offending point.
        marker: MarkerId,
        /// Mesh dimension.
        expected: usize,
        /// Point length.
        found: usize,
    },
    /// The velocity field does not have the mesh's dimension.
    VelocityDimension {
        /// Mesh dimension.
        expected: usize,
        /// Field dimension.
        found: usize,
    },
    /// The force callback returned a vector of the wrong length.
    ForceDimension {
        /// Mesh dimension.
        expected: usize,
        /// Length returned.
        found: usize,
    },
    /// The mesh partition count differs from the communicator size.
    RankCountMismatch {
        /// Partitions in the mesh.
        mesh: usize,
        /// Ranks in the communicator.
        comm: usize,
    },
    /// The mesh assigned a marker's element to a rank it does not have.
    OwnerOutOfRange {
        /// The marker.
        marker: MarkerId,
        /// Owner reported by the mesh.
        owner: Rank,
        /// Partitions in the mesh.
        ranks: usize,
    },
    /// A migration was given a different number of positions than markers.
    PositionCountMismatch {
        /// Markers in the line.
        markers: usize,
        /// Positions supplied.
        positions: usize,
    },
    /// A payload does not have the configured width.
    PayloadWidth {
        /// The marker.
        marker: MarkerId,
        /// Configured `payload_width`.
        expected: usize,
        /// Values supplied.
        found: usize,
    },
    /// The marker's payload lives on another rank.
    NotLocal {
        /// The marker.
        marker: MarkerId,
        /// This rank.
        rank: Rank,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroSubsteps => write!(f, "substeps must be at least 1"),
            Self::InvalidDuration { value } => {
                write!(f, "duration must be finite and positive, got {value}")
            }
            Self::UnsupportedOrder { order } => {
                write!(f, "Runge-Kutta order {order} is not supported (1 to 4)")
            }
            Self::TooManySubsteps { substeps, order } => {
                write!(f, "{substeps} substeps at order {order} overflow the step counter")
            }
            Self::ZeroHops => write!(f, "max_hops must be at least 1"),
            Self::KindCountMismatch { points, kinds } => {
                write!(f, "{points} points but {kinds} marker kinds")
            }
            Self::TooManyMarkers { count } => {
                write!(f, "{count} markers exceed the id space")
            }
            Self::PointDimension {
                marker,
                expected,
                found,
            } => write!(
                f,
                "point {marker} has {found} components, mesh dimension is {expected}"
            ),
            Self::VelocityDimension { expected, found } => write!(
                f,
                "velocity field has {found} components, mesh dimension is {expected}"
            ),
            Self::ForceDimension { expected, found } => write!(
                f,
                "force callback returned {found} components, mesh dimension is {expected}"
            ),
            Self::RankCountMismatch { mesh, comm } => write!(
                f,
                "mesh is split into {mesh} partitions but the communicator has {comm} ranks"
            ),
            Self::OwnerOutOfRange {
                marker,
                owner,
                ranks,
            } => write!(
                f,
                "marker {marker} is assigned to rank {owner} but the mesh has {ranks} partitions"
            ),
            Self::PositionCountMismatch { markers, positions } => {
                write!(f, "{positions} positions for {markers} markers")
            }
            Self::PayloadWidth {
                marker,
                expected,
                found,
            } => write!(
                f,
                "payload of marker {marker} has {found} values, configured width is {expected}"
            ),
            Self::NotLocal { marker, rank } => {
                write!(f, "marker {marker} is not owned by rank {rank}")
            }
        }
    }
}

impl Error for ConfigError {}
