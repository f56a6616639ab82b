//! The `Communicator` trait.

use crate::error::CommError;
use wake_core::Rank;

/// Message passing between the ranks of a fixed-size SPMD group.
///
/// Collective calls (`broadcast`, `all_sum`, `barrier`) must be made by
/// every rank in the same order. Point-to-point frames between one
/// ordered pair of ranks are delivered in send order. Sends never block;
/// receives block until a frame arrives or the peer disconnects.
pub trait Communicator: Send {
    /// This rank.
    fn rank(&self) -> Rank;

    /// Number of ranks in the group.
    fn size(&self) -> usize;

    /// Send `frame` to `dest`.
    fn send(&self, dest: Rank, frame: Vec<u8>) -> Result<(), CommError>;

    /// Receive the next frame from `source`.
    fn recv(&self, source: Rank) -> Result<Vec<u8>, CommError>;

    /// Distribute the root's frame to every rank.
    ///
    /// The root passes `Some(frame)`; every other rank passes `None`.
    /// All ranks, the root included, get the frame back.
    fn broadcast(&self, root: Rank, frame: Option<Vec<u8>>) -> Result<Vec<u8>, CommError>;

    /// Sum `value` across all ranks; every rank gets the total.
    fn all_sum(&self, value: u64) -> Result<u64, CommError>;

    /// Block until every rank has reached the barrier.
    fn barrier(&self) -> Result<(), CommError> {
        self.all_sum(0).map(|_| ())
    }

    /// Check that `rank` names a member of this group.
    fn check_rank(&self, rank: Rank) -> Result<(), CommError> {
        if rank.index() < self.size() {
            Ok(())
        } else {
            Err(CommError::RankOutOfRange {
                rank,
                size: self.size(),
            })
        }
    }
}
