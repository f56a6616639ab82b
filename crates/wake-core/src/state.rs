//! Small value types describing marker state and time levels.

use std::fmt;

/// Kind tag carried by every marker.
///
/// The engine treats all kinds identically during advection; the tag is
/// preserved so callers can tell volume tracers from interface or
/// boundary markers when they read results back.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MarkerKind {
    /// A free tracer inside the fluid volume.
    #[default]
    Volume,
    /// A point on a tracked interface (e.g. a closed front).
    Interface,
    /// A point attached to a domain boundary.
    Boundary,
}

impl MarkerKind {
    /// Stable wire tag.
    pub fn tag(self) -> u8 {
        match self {
            Self::Volume => 0,
            Self::Interface => 1,
            Self::Boundary => 2,
        }
    }

    /// Inverse of [`tag`](Self::tag).
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Volume),
            1 => Some(Self::Interface),
            2 => Some(Self::Boundary),
            _ => None,
        }
    }
}

/// Integration progress of a marker within one `advect` call.
///
/// `At(k)` counts completed RK stages, `0 <= k < n * order`. `Done` means
/// the marker either finished every stage or left the domain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Step {
    /// Number of stages completed so far.
    At(u32),
    /// Finished or exited.
    Done,
}

impl Step {
    /// Whether the marker has nothing left to integrate.
    pub fn is_done(self) -> bool {
        matches!(self, Self::Done)
    }

    /// Completed stage count, if still running.
    pub fn stage_count(self) -> Option<u32> {
        match self {
            Self::At(k) => Some(k),
            Self::Done => None,
        }
    }

    /// Wire encoding: `Done` maps to `u32::MAX`.
    pub fn to_raw(self) -> u32 {
        match self {
            Self::At(k) => k,
            Self::Done => u32::MAX,
        }
    }

    /// Inverse of [`to_raw`](Self::to_raw).
    pub fn from_raw(raw: u32) -> Self {
        if raw == u32::MAX {
            Self::Done
        } else {
            Self::At(raw)
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::At(k) => write!(f, "{k}"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// Which of the two velocity snapshots to read.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimeLevel {
    /// Field at the start of the advection interval.
    Start,
    /// Field at the end of the advection interval.
    End,
}
