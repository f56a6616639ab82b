//! Per-call metrics for the advection driver.
//!
//! [`AdvectMetrics`] is filled in by every `advect` and `migrate` call on
//! every rank.
//! Counts are local to the rank; the caller may reduce them across ranks
//! if a global view is needed.

use std::fmt;

/// Counters and timings collected during one `advect` call on one rank.
///
/// All durations are in microseconds.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AdvectMetrics {
    /// Synchronization rounds until every marker finished.
    pub rounds: u32,
    /// RK stages integrated on this rank.
    pub stages: u64,
    /// Markers whose live state this rank handed to another rank.
    pub migrations_sent: u32,
    /// Markers whose live state this rank received.
    pub migrations_received: u32,
    /// Exited markers this rank forwarded to the sink rank.
    pub exit_handoffs: u32,
    /// Markers that left the domain while integrated on this rank.
    pub exited: u32,
    /// Velocity interpolations served from the element cache.
    pub cache_hits: u64,
    /// Velocity interpolations that had to gather nodal values.
    pub cache_misses: u64,
    /// Time spent integrating owned markers.
    pub local_us: u64,
    /// Time spent in the tally and the exchange phase.
    pub exchange_us: u64,
    /// Time spent reordering the line.
    pub reorder_us: u64,
    /// Wall-clock time for the whole call.
    pub total_us: u64,
}

impl fmt::Display for AdvectMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} rounds, {} stages, {} sent / {} received, {} exited, \
             cache {}/{}, local {}us, exchange {}us, reorder {}us, total {}us",
            self.rounds,
            self.stages,
            self.migrations_sent,
            self.migrations_received,
            self.exited,
            self.cache_hits,
            self.cache_hits + self.cache_misses,
            self.local_us,
            self.exchange_us,
            self.reorder_us,
            self.total_us,
        )
    }
}
