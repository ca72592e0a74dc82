//! Pushes distribution settings into the distribution subsystem

use std::sync::Arc;

use eyre::{Result, eyre};
use tracing::debug;

use super::{
    DISTRIBUTION_DIRECTORY_PROPERTY, DISTRIBUTION_FILE_FILTER_EXPRESSION_PROPERTY, PropertyChange, PropertyListener,
    PropertyValue,
};
use crate::distribution::FileDistribution;

/// Listener that applies directory and filter changes; other names are ignored
pub fn reconfiguration_listener(distribution: Arc<dyn FileDistribution>) -> PropertyListener {
    Box::new(move |change: &PropertyChange| -> Result<()> {
        match change.name.as_str() {
            DISTRIBUTION_DIRECTORY_PROPERTY => match &change.value {
                PropertyValue::Directory(directory) => {
                    debug!(?directory, "reconfiguration_listener: distribution directory");
                    distribution.set_directory(directory.clone());
                    Ok(())
                }
                other => Err(eyre!("{} expects a directory, got {:?}", change.name, other)),
            },
            DISTRIBUTION_FILE_FILTER_EXPRESSION_PROPERTY => match &change.value {
                PropertyValue::Pattern(pattern) => {
                    debug!(pattern = %pattern, "reconfiguration_listener: distribution filter");
                    distribution.set_filter_pattern(pattern.clone());
                    Ok(())
                }
                other => Err(eyre!("{} expects a pattern, got {:?}", change.name, other)),
            },
            _ => Ok(()),
        }
    })
}
