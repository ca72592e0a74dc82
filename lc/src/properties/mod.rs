//! Live console properties
//!
//! [`ConsoleProperties`] holds the current value of each runtime-adjustable
//! setting and tells listeners about every change. The reconfiguration
//! listener forwards the distribution settings to the distribution subsystem.

mod console_properties;
mod listener;

pub use console_properties::ConsoleProperties;
pub use listener::reconfiguration_listener;

use std::path::PathBuf;
use std::time::Duration;

use eyre::Result;
use regex::Regex;

pub const DISTRIBUTION_DIRECTORY_PROPERTY: &str = "loadconsole.distributionDirectory";
pub const DISTRIBUTION_FILE_FILTER_EXPRESSION_PROPERTY: &str = "loadconsole.distributionFileFilterExpression";
pub const SCAN_DISTRIBUTION_FILES_PERIOD_PROPERTY: &str = "loadconsole.scanDistributionFilesPeriod";

/// New value carried by a property change
#[derive(Debug, Clone)]
pub enum PropertyValue {
    Directory(PathBuf),
    Pattern(Regex),
    Period(Duration),
}

/// A property transition, delivered after the new value is in place
#[derive(Debug, Clone)]
pub struct PropertyChange {
    pub name: String,
    pub value: PropertyValue,
}

impl PropertyChange {
    pub fn new(name: impl Into<String>, value: PropertyValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Callback invoked on every property change
pub type PropertyListener = Box<dyn Fn(&PropertyChange) -> Result<()> + Send + Sync>;

/// Something that announces property changes to registered listeners
pub trait PropertySource: Send + Sync {
    fn add_listener(&self, listener: PropertyListener);
}
