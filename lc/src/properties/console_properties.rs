//! Console property store

use std::path::PathBuf;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use eyre::{Context, Result, eyre};
use regex::Regex;
use tracing::{debug, info, warn};

use super::{
    DISTRIBUTION_DIRECTORY_PROPERTY, DISTRIBUTION_FILE_FILTER_EXPRESSION_PROPERTY, PropertyChange, PropertyListener,
    PropertySource, PropertyValue, SCAN_DISTRIBUTION_FILES_PERIOD_PROPERTY,
};
use crate::config::ConsoleConfig;

#[derive(Debug, Clone)]
struct PropertyValues {
    distribution_directory: PathBuf,
    distribution_file_filter: Regex,
    scan_distribution_files_period: Duration,
}

/// Current console settings; setters notify listeners only when a value changes
pub struct ConsoleProperties {
    values: RwLock<PropertyValues>,
    listeners: RwLock<Vec<PropertyListener>>,
}

impl ConsoleProperties {
    pub fn from_config(config: &ConsoleConfig) -> Result<Self> {
        debug!(?config, "ConsoleProperties::from_config: called");
        let distribution_file_filter = config.file_filter()?;
        let scan_distribution_files_period = config.scan_period();
        if scan_distribution_files_period.is_zero() {
            return Err(eyre!("Scan period must be greater than zero"));
        }
        Ok(Self {
            values: RwLock::new(PropertyValues {
                distribution_directory: config.distribution_directory.clone(),
                distribution_file_filter,
                scan_distribution_files_period,
            }),
            listeners: RwLock::new(Vec::new()),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, PropertyValues> {
        self.values.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, PropertyValues> {
        self.values.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn distribution_directory(&self) -> PathBuf {
        self.read().distribution_directory.clone()
    }

    pub fn distribution_file_filter(&self) -> Regex {
        self.read().distribution_file_filter.clone()
    }

    /// Only read when the scan trigger is created; later changes are announced
    /// but do not reschedule a running trigger
    pub fn scan_distribution_files_period(&self) -> Duration {
        self.read().scan_distribution_files_period
    }

    pub fn set_distribution_directory(&self, directory: PathBuf) {
        debug!(?directory, "ConsoleProperties::set_distribution_directory: called");
        {
            let mut values = self.write();
            if values.distribution_directory == directory {
                return;
            }
            values.distribution_directory = directory.clone();
        }
        self.fire(PropertyChange::new(
            DISTRIBUTION_DIRECTORY_PROPERTY,
            PropertyValue::Directory(directory),
        ));
    }

    pub fn set_distribution_file_filter_expression(&self, expression: &str) -> Result<()> {
        debug!(%expression, "ConsoleProperties::set_distribution_file_filter_expression: called");
        let pattern = Regex::new(expression).context(format!("Bad filter expression: {}", expression))?;
        {
            let mut values = self.write();
            if values.distribution_file_filter.as_str() == pattern.as_str() {
                return Ok(());
            }
            values.distribution_file_filter = pattern.clone();
        }
        self.fire(PropertyChange::new(
            DISTRIBUTION_FILE_FILTER_EXPRESSION_PROPERTY,
            PropertyValue::Pattern(pattern),
        ));
        Ok(())
    }

    pub fn set_scan_distribution_files_period(&self, period: Duration) -> Result<()> {
        debug!(?period, "ConsoleProperties::set_scan_distribution_files_period: called");
        if period.is_zero() {
            return Err(eyre!("Scan period must be greater than zero"));
        }
        {
            let mut values = self.write();
            if values.scan_distribution_files_period == period {
                return Ok(());
            }
            values.scan_distribution_files_period = period;
        }
        self.fire(PropertyChange::new(
            SCAN_DISTRIBUTION_FILES_PERIOD_PROPERTY,
            PropertyValue::Period(period),
        ));
        Ok(())
    }

    fn fire(&self, change: PropertyChange) {
        info!(property = %change.name, "Console property changed");
        let listeners = self.listeners.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        for listener in listeners.iter() {
            if let Err(e) = listener(&change) {
                warn!(property = %change.name, error = %e, "Property listener failed");
            }
        }
    }
}

impl PropertySource for ConsoleProperties {
    fn add_listener(&self, listener: PropertyListener) {
        debug!("ConsoleProperties::add_listener: called");
        self.listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(listener);
    }
}

impl std::fmt::Debug for ConsoleProperties {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleProperties")
            .field("values", &*self.read())
            .field(
                "listeners",
                &self.listeners.read().unwrap_or_else(|poisoned| poisoned.into_inner()).len(),
            )
            .finish()
    }
}
