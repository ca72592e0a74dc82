//! File distribution
//!
//! Keeps track of the files under the distribution directory that agents need,
//! and of whether the agents' caches may be out of date.

mod cache_state;
mod directory;

pub use cache_state::AgentCacheState;
pub use directory::DirectoryDistribution;

use std::path::PathBuf;

use eyre::Result;
use regex::Regex;

/// Result of one scan of the distribution directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    /// Number of files that passed the filter
    pub files: usize,
    /// Files agents need, relative to the distribution directory
    pub pending: Vec<PathBuf>,
    /// Whether the scan found the agent cache out of date and so sent everything
    pub full: bool,
}

/// Operations the console performs on the distribution subsystem
///
/// Implementations are called from several contexts at once (the maintenance
/// trigger, the status poller and the property-change stream) and must do
/// their own synchronisation.
pub trait FileDistribution: Send + Sync {
    /// Mark the agent cache out of date; safe to call from any thread
    fn invalidate_cache(&self);

    fn set_directory(&self, directory: PathBuf);

    fn set_filter_pattern(&self, pattern: Regex);

    /// Rescan the distribution directory for changes
    fn rescan(&self) -> Result<ScanOutcome>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records every call made to the distribution subsystem
    #[derive(Debug, Default)]
    pub struct MockDistribution {
        invalidations: AtomicUsize,
        rescans: AtomicUsize,
        directories: Mutex<Vec<PathBuf>>,
        patterns: Mutex<Vec<String>>,
    }

    impl MockDistribution {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn invalidations(&self) -> usize {
            self.invalidations.load(Ordering::SeqCst)
        }

        pub fn rescans(&self) -> usize {
            self.rescans.load(Ordering::SeqCst)
        }

        pub fn directories(&self) -> Vec<PathBuf> {
            self.directories.lock().unwrap().clone()
        }

        pub fn patterns(&self) -> Vec<String> {
            self.patterns.lock().unwrap().clone()
        }
    }

    impl FileDistribution for MockDistribution {
        fn invalidate_cache(&self) {
            self.invalidations.fetch_add(1, Ordering::SeqCst);
        }

        fn set_directory(&self, directory: PathBuf) {
            self.directories.lock().unwrap().push(directory);
        }

        fn set_filter_pattern(&self, pattern: Regex) {
            self.patterns.lock().unwrap().push(pattern.as_str().to_string());
        }

        fn rescan(&self) -> Result<ScanOutcome> {
            self.rescans.fetch_add(1, Ordering::SeqCst);
            Ok(ScanOutcome::default())
        }
    }
}
