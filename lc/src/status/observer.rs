//! Reaction to agents joining

use std::sync::Arc;

use eyre::Result;
use tracing::{debug, info};

use super::{ProcessStatusSnapshot, StatusListener};
use crate::distribution::FileDistribution;

/// Listener that marks the agent cache stale whenever a new agent shows up
///
/// New agents may hold none or old copies of the distribution files. Runs on
/// the status source's thread; the invalidation is a single atomic update.
pub fn new_agent_observer(distribution: Arc<dyn FileDistribution>) -> StatusListener {
    Box::new(move |snapshot: &ProcessStatusSnapshot| -> Result<()> {
        if snapshot.new_agent {
            debug!(agents = snapshot.reports.len(), "new_agent_observer: new agent present");
            distribution.invalidate_cache();
            info!("New agent connected, agent cache marked out of date");
        }
        Ok(())
    })
}
