//! Staleness marker for the agents' file caches

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

/// Tracks whether agents may hold out-of-date copies of the distribution files
///
/// Every invalidation bumps a generation counter; a completed scan records the
/// generation it observed when it started. The cache is out of date while some
/// invalidation is newer than the last recorded scan, so a stale-mark that
/// races a scan is never lost.
#[derive(Debug)]
pub struct AgentCacheState {
    invalidations: AtomicU64,
    cleared_through: AtomicU64,
}

impl Default for AgentCacheState {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentCacheState {
    /// A fresh cache state starts out of date: nothing has been sent yet.
    pub fn new() -> Self {
        Self {
            invalidations: AtomicU64::new(1),
            cleared_through: AtomicU64::new(0),
        }
    }

    pub fn set_out_of_date(&self) {
        let generation = self.invalidations.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(generation, "AgentCacheState::set_out_of_date: called");
    }

    pub fn is_out_of_date(&self) -> bool {
        self.invalidations.load(Ordering::SeqCst) > self.cleared_through.load(Ordering::SeqCst)
    }

    /// Current invalidation generation, to pass to [`Self::mark_up_to_date`]
    pub fn generation(&self) -> u64 {
        self.invalidations.load(Ordering::SeqCst)
    }

    /// Record that everything up to `generation` has been handled
    pub(crate) fn mark_up_to_date(&self, generation: u64) {
        debug!(generation, "AgentCacheState::mark_up_to_date: called");
        self.cleared_through.fetch_max(generation, Ordering::SeqCst);
    }
}
