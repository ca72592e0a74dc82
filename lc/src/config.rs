//! Console configuration types and loading

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::engine::DispatchFaultPolicy;

/// Files excluded from distribution unless configured otherwise
pub const DEFAULT_DISTRIBUTION_FILE_FILTER: &str =
    r"^CVS/$|^\.svn/$|^\.git/$|^.*~$|^(out_|error_|data_)\w+-\d+\.log\d*$";

/// Main console configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Distribution and dispatch settings
    pub console: ConsoleConfig,

    /// Process status tracking
    pub status: StatusConfig,

    /// Worker-facing transport
    pub transport: TransportConfig,
}

impl Config {
    /// Check values that serde cannot
    pub fn validate(&self) -> Result<()> {
        self.console.file_filter().context("Invalid distribution file filter expression")?;
        if self.console.scan_distribution_files_period_ms == 0 {
            return Err(eyre::eyre!("scan-distribution-files-period-ms must be greater than zero"));
        }
        if self.status.update_period_ms == 0 {
            return Err(eyre::eyre!("update-period-ms must be greater than zero"));
        }
        if self.transport.channel_buffer == 0 {
            return Err(eyre::eyre!("channel-buffer must be greater than zero"));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .loadconsole.yml
        let local_config = PathBuf::from(".loadconsole.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/loadconsole/loadconsole.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("loadconsole").join("loadconsole.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is set up
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        Self::load(config_path).ok().and_then(|config| config.log_level)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Distribution and dispatch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Root of the file tree distributed to agents
    #[serde(rename = "distribution-directory")]
    pub distribution_directory: PathBuf,

    /// Regex of file names to exclude; directories are matched with a trailing `/`
    #[serde(rename = "distribution-file-filter-expression")]
    pub distribution_file_filter_expression: String,

    /// Period between distribution directory scans in milliseconds
    #[serde(rename = "scan-distribution-files-period-ms")]
    pub scan_distribution_files_period_ms: u64,

    /// What the run loop does when a message cannot be handled
    #[serde(rename = "dispatch-fault-policy")]
    pub dispatch_fault_policy: DispatchFaultPolicy,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            distribution_directory: PathBuf::from("."),
            distribution_file_filter_expression: DEFAULT_DISTRIBUTION_FILE_FILTER.to_string(),
            scan_distribution_files_period_ms: 6000,
            dispatch_fault_policy: DispatchFaultPolicy::default(),
        }
    }
}

impl ConsoleConfig {
    pub fn scan_period(&self) -> Duration {
        Duration::from_millis(self.scan_distribution_files_period_ms)
    }

    pub fn file_filter(&self) -> Result<Regex> {
        Regex::new(&self.distribution_file_filter_expression).context(format!(
            "Bad filter expression: {}",
            self.distribution_file_filter_expression
        ))
    }
}

/// Process status tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    /// Period between published status snapshots in milliseconds
    #[serde(rename = "update-period-ms")]
    pub update_period_ms: u64,

    /// Agents silent for this many update periods are dropped
    #[serde(rename = "expiry-periods")]
    pub expiry_periods: u32,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            update_period_ms: 500,
            expiry_periods: 3,
        }
    }
}

impl StatusConfig {
    pub fn update_period(&self) -> Duration {
        Duration::from_millis(self.update_period_ms)
    }

    pub fn expiry(&self) -> Duration {
        self.update_period() * self.expiry_periods.max(1)
    }
}

/// Worker-facing transport
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Unix socket workers and agents connect to
    #[serde(rename = "socket-path")]
    pub socket_path: PathBuf,

    /// Messages buffered between connection readers and the run loop
    #[serde(rename = "channel-buffer")]
    pub channel_buffer: usize,

    /// Longest accepted message line in bytes
    #[serde(rename = "max-message-size")]
    pub max_message_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            channel_buffer: 1024,
            max_message_size: 1024 * 1024,
        }
    }
}

/// Socket path under the runtime directory
pub fn default_socket_path() -> PathBuf {
    dirs::runtime_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("loadconsole")
        .join("console.sock")
}
