//! Error types for the communication layer.

use std::fmt;

use wake_core::Rank;

/// Errors from collective or point-to-point communication.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommError {
    /// The peer's end of the channel is gone (it returned or panicked).
    Disconnected {
        /// The rank that can no longer be reached.
        peer: Rank,
    },
    /// A rank index outside `0..size` was used.
    RankOutOfRange {
        /// The offending rank.
        rank: Rank,
        /// Size of the group.
        size: usize,
    },
    /// The broadcast root did not supply a frame.
    MissingRootFrame {
        /// The root rank.
        root: Rank,
    },
    /// A frame could not be decoded (truncated or corrupt data).
    Malformed {
        /// Human-readable description of what went wrong.
        detail: String,
    },
    /// A rank tried to receive from itself with nothing queued.
    EmptySelfQueue {
        /// The receiving rank.
        rank: Rank,
    },
    /// A cluster needs at least one rank.
    EmptyCluster,
    /// A rank thread could not be spawned.
    SpawnFailed {
        /// The rank whose thread failed to start.
        rank: Rank,
        /// Description from the OS.
        reason: String,
    },
    /// A rank thread panicked.
    RankPanicked {
        /// The rank that panicked.
        rank: Rank,
    },
}

impl fmt::Display for CommError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected { peer } => write!(f, "rank {peer} disconnected"),
            Self::RankOutOfRange { rank, size } => {
                write!(f, "rank {rank} out of range for group of {size}")
            }
            Self::MissingRootFrame { root } => {
                write!(f, "broadcast root {root} supplied no frame")
            }
            Self::Malformed { detail } => write!(f, "malformed frame: {detail}"),
            Self::EmptySelfQueue { rank } => {
                write!(f, "rank {rank} has no frame queued for itself")
            }
            Self::EmptyCluster => write!(f, "cluster must have at least one rank"),
            Self::SpawnFailed { rank, reason } => {
                write!(f, "failed to spawn thread for rank {rank}: {reason}")
            }
            Self::RankPanicked { rank } => write!(f, "rank {rank} panicked"),
        }
    }
}

impl std::error::Error for CommError {}
