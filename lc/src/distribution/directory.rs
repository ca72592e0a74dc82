//! Distribution backed by a local directory tree

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

use eyre::{Result, eyre};
use regex::Regex;
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use super::{AgentCacheState, FileDistribution, ScanOutcome};

#[derive(Debug)]
struct ScanState {
    directory: PathBuf,
    filter: Regex,
    /// Bumped whenever directory or filter change, so a scan started under the
    /// old settings does not overwrite the snapshot taken under the new ones
    settings_version: u64,
    known: HashMap<PathBuf, SystemTime>,
    last_outcome: Option<ScanOutcome>,
}

/// Scans a directory tree for the files to distribute to agents
#[derive(Debug)]
pub struct DirectoryDistribution {
    cache_state: Arc<AgentCacheState>,
    state: Mutex<ScanState>,
}

impl DirectoryDistribution {
    pub fn new(directory: impl Into<PathBuf>, filter: Regex) -> Self {
        let directory = directory.into();
        debug!(?directory, filter = %filter, "DirectoryDistribution::new: called");
        Self {
            cache_state: Arc::new(AgentCacheState::new()),
            state: Mutex::new(ScanState {
                directory,
                filter,
                settings_version: 0,
                known: HashMap::new(),
                last_outcome: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ScanState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn agent_cache_state(&self) -> Arc<AgentCacheState> {
        self.cache_state.clone()
    }

    pub fn directory(&self) -> PathBuf {
        self.lock().directory.clone()
    }

    pub fn filter_pattern(&self) -> String {
        self.lock().filter.as_str().to_string()
    }

    pub fn last_scan(&self) -> Option<ScanOutcome> {
        self.lock().last_outcome.clone()
    }

    fn settings_changed(&self, state: &mut ScanState) {
        state.settings_version += 1;
        state.known.clear();
        state.last_outcome = None;
        self.cache_state.set_out_of_date();
    }
}

/// Names are matched with a trailing `/` for directories
fn is_excluded(entry: &DirEntry, filter: &Regex) -> bool {
    if entry.depth() == 0 {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    if entry.file_type().is_dir() {
        filter.is_match(&format!("{}/", name))
    } else {
        filter.is_match(&name)
    }
}

fn walk(directory: &Path, filter: &Regex) -> Result<HashMap<PathBuf, SystemTime>> {
    if !directory.is_dir() {
        return Err(eyre!("Distribution directory does not exist: {}", directory.display()));
    }

    let mut files = HashMap::new();
    let walker = WalkDir::new(directory)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| !is_excluded(entry, filter));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable distribution entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let modified = match entry.metadata() {
            Ok(metadata) => metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "Skipping distribution file without metadata");
                continue;
            }
        };
        let relative = entry.path().strip_prefix(directory).unwrap_or(entry.path()).to_path_buf();
        files.insert(relative, modified);
    }
    Ok(files)
}

impl FileDistribution for DirectoryDistribution {
    fn invalidate_cache(&self) {
        debug!("DirectoryDistribution::invalidate_cache: called");
        self.cache_state.set_out_of_date();
    }

    fn set_directory(&self, directory: PathBuf) {
        debug!(?directory, "DirectoryDistribution::set_directory: called");
        let mut state = self.lock();
        if state.directory == directory {
            return;
        }
        info!(from = %state.directory.display(), to = %directory.display(), "Distribution directory changed");
        state.directory = directory;
        self.settings_changed(&mut state);
    }

    fn set_filter_pattern(&self, pattern: Regex) {
        debug!(pattern = %pattern, "DirectoryDistribution::set_filter_pattern: called");
        let mut state = self.lock();
        if state.filter.as_str() == pattern.as_str() {
            return;
        }
        info!(pattern = %pattern, "Distribution file filter changed");
        state.filter = pattern;
        self.settings_changed(&mut state);
    }

    fn rescan(&self) -> Result<ScanOutcome> {
        let (directory, filter, version) = {
            let state = self.lock();
            (state.directory.clone(), state.filter.clone(), state.settings_version)
        };
        debug!(?directory, "DirectoryDistribution::rescan: called");

        let generation = self.cache_state.generation();
        let full = self.cache_state.is_out_of_date();

        // Walk without holding the lock; setters stay responsive during a long scan
        let files = walk(&directory, &filter)?;

        let mut state = self.lock();
        if state.settings_version != version {
            debug!("DirectoryDistribution::rescan: settings changed during scan, discarding");
            return Ok(ScanOutcome::default());
        }

        let mut pending: Vec<PathBuf> = if full {
            files.keys().cloned().collect()
        } else {
            files
                .iter()
                .filter(|(path, modified)| state.known.get(*path) != Some(*modified))
                .map(|(path, _)| path.clone())
                .collect()
        };
        pending.sort();

        let outcome = ScanOutcome {
            files: files.len(),
            pending,
            full,
        };
        state.known = files;
        state.last_outcome = Some(outcome.clone());
        drop(state);

        if full {
            self.cache_state.mark_up_to_date(generation);
        }
        if !outcome.pending.is_empty() {
            info!(pending = outcome.pending.len(), full, "Distribution files changed");
        }
        Ok(outcome)
    }
}
