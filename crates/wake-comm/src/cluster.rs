//! Thread-per-rank SPMD groups.
//!
//! [`Cluster::run`] spawns one named OS thread per rank, hands each a
//! [`ThreadComm`] wired to every other rank, and joins them all. A rank
//! that returns or panics drops its channel ends, so peers blocked on it
//! observe [`CommError::Disconnected`] instead of hanging.

use std::thread;

use crossbeam_channel::{Receiver, Sender};
use wake_core::Rank;

use crate::codec;
use crate::communicator::Communicator;
use crate::error::CommError;

// ── Configuration ───────────────────────────────────────────────

/// Shape of a thread-per-rank group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterConfig {
    /// Number of ranks (threads). Must be at least 1.
    pub ranks: usize,
    /// Rank threads are named `{prefix}-{rank}`.
    pub thread_name_prefix: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            ranks: 1,
            thread_name_prefix: "wake-rank".to_string(),
        }
    }
}

impl ClusterConfig {
    /// Config for `ranks` ranks with the default thread name prefix.
    pub fn with_ranks(ranks: usize) -> Self {
        Self {
            ranks,
            ..Self::default()
        }
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), CommError> {
        if self.ranks == 0 {
            return Err(CommError::EmptyCluster);
        }
        Ok(())
    }
}

// ── ThreadComm ──────────────────────────────────────────────────

/// One rank's endpoint in a thread-per-rank group.
///
/// Holds a sender to and a receiver from every rank (itself included)
/// for each of the two traffic classes.
#[derive(Debug)]
pub struct ThreadComm {
    rank: Rank,
    p2p_tx: Vec<Sender<Vec<u8>>>,
    p2p_rx: Vec<Receiver<Vec<u8>>>,
    coll_tx: Vec<Sender<Vec<u8>>>,
    coll_rx: Vec<Receiver<Vec<u8>>>,
}

type Matrix = (Vec<Vec<Sender<Vec<u8>>>>, Vec<Vec<Receiver<Vec<u8>>>>);

/// Build `size × size` channels. `tx[r][q]` and `rx[q][r]` are the two
/// ends of the `r → q` channel.
fn channel_matrix(size: usize) -> Matrix {
    let mut tx: Vec<Vec<Sender<Vec<u8>>>> = (0..size).map(|_| Vec::with_capacity(size)).collect();
    let mut rx: Vec<Vec<Option<Receiver<Vec<u8>>>>> =
        (0..size).map(|_| (0..size).map(|_| None).collect()).collect();
    for (r, row) in tx.iter_mut().enumerate() {
        for rx_row in rx.iter_mut() {
            let (s, recv) = crossbeam_channel::unbounded();
            row.push(s);
            rx_row[r] = Some(recv);
        }
    }
    let rx = rx
        .into_iter()
        .map(|row| row.into_iter().flatten().collect())
        .collect();
    (tx, rx)
}

impl ThreadComm {
    /// Build the endpoints of a fully connected group of `size` ranks.
    ///
    /// Element `r` of the result belongs to rank `r`.
    pub fn group(size: usize) -> Result<Vec<ThreadComm>, CommError> {
        if size == 0 {
            return Err(CommError::EmptyCluster);
        }
        let (p2p_tx, p2p_rx) = channel_matrix(size);
        let (coll_tx, coll_rx) = channel_matrix(size);
        Ok(p2p_tx
            .into_iter()
            .zip(p2p_rx)
            .zip(coll_tx.into_iter().zip(coll_rx))
            .enumerate()
            .map(|(r, ((p2p_tx, p2p_rx), (coll_tx, coll_rx)))| ThreadComm {
                rank: Rank(r as u32),
                p2p_tx,
                p2p_rx,
                coll_tx,
                coll_rx,
            })
            .collect())
    }

    fn push(
        &self,
        lanes: &[Sender<Vec<u8>>],
        dest: Rank,
        frame: Vec<u8>,
    ) -> Result<(), CommError> {
        self.check_rank(dest)?;
        lanes[dest.index()]
            .send(frame)
            .map_err(|_| CommError::Disconnected { peer: dest })
    }

    fn pull(&self, lanes: &[Receiver<Vec<u8>>], source: Rank) -> Result<Vec<u8>, CommError> {
        self.check_rank(source)?;
        let lane = &lanes[source.index()];
        if source == self.rank {
            // We hold our own sender, so a blocking recv could never wake.
            return lane
                .try_recv()
                .map_err(|_| CommError::EmptySelfQueue { rank: self.rank });
        }
        lane.recv()
            .map_err(|_| CommError::Disconnected { peer: source })
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.p2p_tx.len()
    }

    fn send(&self, dest: Rank, frame: Vec<u8>) -> Result<(), CommError> {
        log::trace!("rank {} -> {}: {} bytes", self.rank, dest, frame.len());
        self.push(&self.p2p_tx, dest, frame)
    }

    fn recv(&self, source: Rank) -> Result<Vec<u8>, CommError> {
        self.pull(&self.p2p_rx, source)
    }

    fn broadcast(&self, root: Rank, frame: Option<Vec<u8>>) -> Result<Vec<u8>, CommError> {
        self.check_rank(root)?;
        if root != self.rank {
            return self.pull(&self.coll_rx, root);
        }
        let frame = frame.ok_or(CommError::MissingRootFrame { root })?;
        for q in 0..self.size() {
            let dest = Rank(q as u32);
            if dest != self.rank {
                self.push(&self.coll_tx, dest, frame.clone())?;
            }
        }
        Ok(frame)
    }

    fn all_sum(&self, value: u64) -> Result<u64, CommError> {
        // Reduce onto the sink, then fan the total back out.
        let sink = Rank::SINK;
        if self.rank != sink {
            let mut frame = Vec::with_capacity(8);
            codec::write_u64_le(&mut frame, value);
            self.push(&self.coll_tx, sink, frame)?;
            let total = self.pull(&self.coll_rx, sink)?;
            let mut r: &[u8] = &total;
            let total = codec::read_u64_le(&mut r)?;
            codec::expect_end(r)?;
            return Ok(total);
        }

        let mut total = value;
        for q in 1..self.size() {
            let frame = self.pull(&self.coll_rx, Rank(q as u32))?;
            let mut r: &[u8] = &frame;
            total = total.wrapping_add(codec::read_u64_le(&mut r)?);
            codec::expect_end(r)?;
        }
        let mut frame = Vec::with_capacity(8);
        codec::write_u64_le(&mut frame, total);
        for q in 1..self.size() {
            self.push(&self.coll_tx, Rank(q as u32), frame.clone())?;
        }
        Ok(total)
    }
}

// ── Cluster ─────────────────────────────────────────────────────

/// Launcher for thread-per-rank SPMD programs.
#[derive(Debug)]
pub struct Cluster;

impl Cluster {
    /// Run `f` once per rank, each on its own named thread, and collect
    /// the per-rank results in rank order.
    ///
    /// Returns `Err` if the config is invalid, a thread cannot be
    /// spawned, or a rank panics. Per-rank failures that `f` reports
    /// itself are passed through in the result vector.
    pub fn run<T, E, F>(config: &ClusterConfig, f: F) -> Result<Vec<Result<T, E>>, CommError>
    where
        T: Send,
        E: Send,
        F: Fn(ThreadComm) -> Result<T, E> + Sync,
    {
        config.validate()?;
        let comms = ThreadComm::group(config.ranks)?;
        log::debug!(
            "launching {} rank threads ({}-*)",
            config.ranks,
            config.thread_name_prefix
        );

        let f = &f;
        thread::scope(|s| {
            let mut handles = Vec::with_capacity(comms.len());
            let mut spawn_error = None;
            for comm in comms {
                let rank = comm.rank();
                if spawn_error.is_some() {
                    // Dropping the endpoint disconnects it from the
                    // ranks already running.
                    drop(comm);
                    continue;
                }
                let spawned = thread::Builder::new()
                    .name(format!("{}-{}", config.thread_name_prefix, rank))
                    .spawn_scoped(s, move || f(comm));
                match spawned {
                    Ok(handle) => handles.push((rank, handle)),
                    Err(e) => {
                        spawn_error = Some(CommError::SpawnFailed {
                            rank,
                            reason: e.to_string(),
                        })
                    }
                }
            }

            let mut results = Vec::with_capacity(handles.len());
            let mut panicked = None;
            for (rank, handle) in handles {
                match handle.join() {
                    Ok(result) => results.push(result),
                    Err(_) => {
                        log::warn!("rank {rank} panicked");
                        panicked.get_or_insert(CommError::RankPanicked { rank });
                    }
                }
            }

            if let Some(e) = spawn_error.or(panicked) {
                return Err(e);
            }
            Ok(results)
        })
    }
}
