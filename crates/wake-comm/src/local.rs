//! Single-rank communicator.

use crossbeam_channel::{Receiver, Sender};
use wake_core::Rank;

use crate::communicator::Communicator;
use crate::error::CommError;

/// The communicator of a one-rank group.
///
/// Collectives are identities. Frames sent to rank 0 (itself) are queued
/// and handed back by `recv`, which fails instead of blocking when the
/// queue is empty.
#[derive(Debug)]
pub struct LocalComm {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
}

impl LocalComm {
    /// Create the single-rank group.
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self { tx, rx }
    }
}

impl Default for LocalComm {
    fn default() -> Self {
        Self::new()
    }
}

impl Communicator for LocalComm {
    fn rank(&self) -> Rank {
        Rank::SINK
    }

    fn size(&self) -> usize {
        1
    }

    fn send(&self, dest: Rank, frame: Vec<u8>) -> Result<(), CommError> {
        self.check_rank(dest)?;
        self.tx
            .send(frame)
            .map_err(|_| CommError::Disconnected { peer: dest })
    }

    fn recv(&self, source: Rank) -> Result<Vec<u8>, CommError> {
        self.check_rank(source)?;
        self.rx
            .try_recv()
            .map_err(|_| CommError::EmptySelfQueue { rank: Rank::SINK })
    }

    fn broadcast(&self, root: Rank, frame: Option<Vec<u8>>) -> Result<Vec<u8>, CommError> {
        self.check_rank(root)?;
        frame.ok_or(CommError::MissingRootFrame { root })
    }

    fn all_sum(&self, value: u64) -> Result<u64, CommError> {
        Ok(value)
    }
}
