//! Error types for the line container and the advection driver.
//!
//! [`LineError`] and [`ProtocolError`] are the fatal invariant
//! violations: they mean the migration protocol is broken, not that a
//! marker did something unusual. [`AdvectError`] is what a collective
//! call returns and wraps every failure source.

use std::error::Error;
use std::fmt;

use wake_comm::CommError;
use wake_core::{MarkerId, Rank, Step};

use crate::config::ConfigError;
use crate::exchange::EnvelopeKind;

// ── LineError ──────────────────────────────────────────────────────

/// Broken structural invariants of a [`Line`](crate::Line).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LineError {
    /// A marker outside the domain is stored on a rank other than the sink.
    ExitedOffSink {
        /// The offending marker.
        marker: MarkerId,
        /// The rank holding it.
        rank: Rank,
    },
    /// A marker sits in the range of a rank that does not own it.
    OwnerMismatch {
        /// The offending marker.
        marker: MarkerId,
        /// Owner recorded on the marker.
        owner: Rank,
        /// Rank whose range contains it.
        range: Rank,
    },
    /// The offset table or the display permutation is inconsistent.
    OffsetCorruption {
        /// What was found.
        reason: String,
    },
}

impl fmt::Display for LineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExitedOffSink { marker, rank } => write!(
                f,
                "marker {marker} is outside the domain but stored on rank {rank}, not the sink"
            ),
            Self::OwnerMismatch {
                marker,
                owner,
                range,
            } => write!(
                f,
                "marker {marker} is owned by rank {owner} but stored in the range of rank {range}"
            ),
            Self::OffsetCorruption { reason } => write!(f, "line layout corrupted: {reason}"),
        }
    }
}

impl Error for LineError {}

// ── ProtocolError ──────────────────────────────────────────────────

/// A violation of the ownership-exchange protocol.
///
/// Every variant carries enough context (marker, step, ranks) to find
/// the mismatched send/receive pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProtocolError {
    /// A different envelope kind arrived than the one expected.
    UnexpectedEnvelope {
        /// Kind the receiver was waiting for.
        expected: EnvelopeKind,
        /// Kind that arrived.
        found: EnvelopeKind,
        /// Marker the receiver was waiting for, if any.
        marker: Option<MarkerId>,
        /// Step recorded for that marker.
        step: Step,
        /// Sending rank.
        from: Rank,
        /// Receiving rank.
        to: Rank,
    },
    /// An envelope for another marker arrived.
    WrongMarker {
        /// Marker the receiver was waiting for.
        expected: MarkerId,
        /// Marker named in the envelope.
        found: MarkerId,
        /// Step recorded for the expected marker.
        step: Step,
        /// Sending rank.
        from: Rank,
        /// Receiving rank.
        to: Rank,
    },
    /// A stage increment arrived out of order.
    WrongStage {
        /// The migrating marker.
        marker: MarkerId,
        /// Stage index expected.
        expected: u8,
        /// Stage index received.
        found: u8,
        /// Sending rank.
        from: Rank,
        /// Receiving rank.
        to: Rank,
    },
    /// The owner of a marker holds no integration state for it.
    MissingState {
        /// The marker.
        marker: MarkerId,
        /// Its step.
        step: Step,
        /// The rank that should hold the state.
        rank: Rank,
    },
    /// The owner of a marker holds no payload for it.
    MissingPayload {
        /// The marker.
        marker: MarkerId,
        /// The rank that should hold the payload.
        rank: Rank,
    },
    /// A migrated payload has the wrong number of values.
    PayloadLength {
        /// The migrating marker.
        marker: MarkerId,
        /// Configured width.
        expected: usize,
        /// Values received.
        found: usize,
        /// Sending rank.
        from: Rank,
        /// Receiving rank.
        to: Rank,
    },
    /// A broadcast header batch does not match the local layout.
    HeaderMismatch {
        /// Broadcasting rank.
        root: Rank,
        /// Marker expected at the slot.
        expected: MarkerId,
        /// Marker named in the header.
        found: MarkerId,
    },
    /// A broadcast header batch has the wrong number of entries.
    BatchLength {
        /// Broadcasting rank.
        root: Rank,
        /// Markers in the root's range locally.
        expected: usize,
        /// Headers received.
        found: usize,
    },
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEnvelope {
                expected,
                found,
                marker,
                step,
                from,
                to,
            } => {
                write!(
                    f,
                    "rank {to} expected {expected:?} from rank {from} but got {found:?}"
                )?;
                if let Some(m) = marker {
                    write!(f, " (marker {m}, step {step})")?;
                }
                Ok(())
            }
            Self::WrongMarker {
                expected,
                found,
                step,
                from,
                to,
            } => write!(
                f,
                "rank {to} expected state of marker {expected} (step {step}) from rank {from} \
                 but got marker {found}"
            ),
            Self::WrongStage {
                marker,
                expected,
                found,
                from,
                to,
            } => write!(
                f,
                "rank {to} expected stage {expected} of marker {marker} from rank {from} \
                 but got stage {found}"
            ),
            Self::MissingState { marker, step, rank } => write!(
                f,
                "rank {rank} owns marker {marker} at step {step} but holds no stage state"
            ),
            Self::MissingPayload { marker, rank } => {
                write!(f, "rank {rank} owns marker {marker} but holds no payload")
            }
            Self::PayloadLength {
                marker,
                expected,
                found,
                from,
                to,
            } => write!(
                f,
                "rank {to} got {found} payload values for marker {marker} from rank {from}, \
                 expected {expected}"
            ),
            Self::HeaderMismatch {
                root,
                expected,
                found,
            } => write!(
                f,
                "header from rank {root} names marker {found} where marker {expected} is stored"
            ),
            Self::BatchLength {
                root,
                expected,
                found,
            } => write!(
                f,
                "rank {root} broadcast {found} headers, {expected} expected"
            ),
        }
    }
}

impl Error for ProtocolError {}

// ── AdvectError ────────────────────────────────────────────────────

/// Errors returned by tracker construction and `advect`.
#[derive(Debug, Clone, PartialEq)]
pub enum AdvectError {
    /// Invalid configuration or inputs.
    Config(ConfigError),
    /// Communication failure (including a peer that aborted).
    Comm(CommError),
    /// Mismatched exchange traffic.
    Protocol(ProtocolError),
    /// Broken line invariants after a reorder.
    Line(LineError),
}

impl fmt::Display for AdvectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Comm(e) => write!(f, "communication: {e}"),
            Self::Protocol(e) => write!(f, "exchange protocol: {e}"),
            Self::Line(e) => write!(f, "line invariant: {e}"),
        }
    }
}

impl Error for AdvectError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Comm(e) => Some(e),
            Self::Protocol(e) => Some(e),
            Self::Line(e) => Some(e),
        }
    }
}

impl From<ConfigError> for AdvectError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<CommError> for AdvectError {
    fn from(e: CommError) -> Self {
        Self::Comm(e)
    }
}

impl From<ProtocolError> for AdvectError {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}

impl From<LineError> for AdvectError {
    fn from(e: LineError) -> Self {
        Self::Line(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_errors_carry_diagnostic_context() {
        let e = ProtocolError::UnexpectedEnvelope {
            expected: EnvelopeKind::Step,
            found: EnvelopeKind::EndOfExchange,
            marker: Some(MarkerId(7)),
            step: Step::At(3),
            from: Rank(1),
            to: Rank(2),
        };
        let msg = e.to_string();
        assert!(msg.contains("marker 7"));
        assert!(msg.contains("step 3"));
        assert!(msg.contains("rank 1"));
        assert!(msg.contains("rank 2"));
    }

    #[test]
    fn advect_error_chains_its_source() {
        let e = AdvectError::from(LineError::ExitedOffSink {
            marker: MarkerId(4),
            rank: Rank(3),
        });
        let source = e.source().map(|s| s.to_string()).unwrap_or_default();
        assert!(source.contains("marker 4"));
        assert!(e.to_string().starts_with("line invariant"));
    }

    #[test]
    fn comm_errors_convert() {
        let e: AdvectError = CommError::Disconnected { peer: Rank(1) }.into();
        assert_eq!(e, AdvectError::Comm(CommError::Disconnected { peer: Rank(1) }));
    }
}
