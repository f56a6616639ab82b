//! SPMD communication layer for Wake.
//!
//! Every rank runs the same control flow over its own share of the
//! markers and meets the other ranks only at collective calls and
//! point-to-point hand-offs. This crate provides the [`Communicator`]
//! abstraction those meetings go through, plus two implementations:
//!
//! - [`ThreadComm`]: one rank per OS thread, wired together with
//!   crossbeam channels and launched by [`Cluster::run`]
//! - [`LocalComm`]: the degenerate single-rank group
//!
//! Frames are plain byte vectors; [`codec`] holds the little-endian
//! primitives used to build and parse them.
//!
//! # Channel layout
//!
//! ```text
//! rank r ──p2p[r→q]──▶ rank q      (migration envelopes)
//! rank r ──coll[r→q]─▶ rank q      (broadcast, all_sum, barrier)
//! ```
//!
//! Every ordered pair has its own FIFO in each class, so collective
//! traffic never interleaves with point-to-point traffic.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod cluster;
pub mod codec;
pub mod communicator;
pub mod error;
pub mod local;

pub use cluster::{Cluster, ClusterConfig, ThreadComm};
pub use communicator::Communicator;
pub use error::CommError;
pub use local::LocalComm;
