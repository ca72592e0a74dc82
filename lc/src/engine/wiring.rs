//! Composition root
//!
//! Builds each collaborator in dependency order from [`Config`] and hands
//! them to the engine.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use eyre::{Context, Result};
use serde::Serialize;
use tracing::{debug, info};

use super::{Collaborators, ConsoleEngine, EngineConfig};
use crate::config::Config;
use crate::dispatch::{ClientCommands, RegisterMessageHandlers};
use crate::distribution::DirectoryDistribution;
use crate::maintenance::ScheduledTrigger;
use crate::messages::TestId;
use crate::model::ConsoleModel;
use crate::properties::ConsoleProperties;
use crate::status::ProcessStatusSource;
use crate::transport::SocketTransport;

/// Totals for one registered test
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestSummary {
    pub test: TestId,
    pub transactions: u64,
    pub errors: u64,
    pub mean_time_ms: Option<f64>,
}

/// What a console did over its run, printed when it stops
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConsoleSummary {
    pub messages_processed: u64,
    pub faults_logged: u64,
    pub agents: usize,
    pub rescan_trigger: String,
    pub rescans: u64,
    pub recording: bool,
    pub expressions: usize,
    pub tests: Vec<TestSummary>,
}

/// A fully wired console
pub struct Console {
    engine: Arc<ConsoleEngine>,
    properties: Arc<ConsoleProperties>,
    model: Arc<ConsoleModel>,
    distribution: Arc<DirectoryDistribution>,
    status: ProcessStatusSource,
    status_updates: ScheduledTrigger,
    socket_path: PathBuf,
}

impl Console {
    /// Build every collaborator and the engine; must run inside a tokio runtime
    pub fn build(config: &Config) -> Result<Self> {
        debug!("Console::build: called");
        config.validate().context("Invalid console configuration")?;

        let properties = Arc::new(ConsoleProperties::from_config(&config.console)?);
        let model = Arc::new(ConsoleModel::new());
        let distribution = Arc::new(DirectoryDistribution::new(
            properties.distribution_directory(),
            properties.distribution_file_filter(),
        ));

        let status = ProcessStatusSource::new(config.status.expiry());
        let status_updates = status.spawn_updates(config.status.update_period())?;

        let transport = Arc::new(
            SocketTransport::bind(
                &config.transport.socket_path,
                config.transport.channel_buffer,
                config.transport.max_message_size,
            )
            .context(format!(
                "Failed to bind console socket {}",
                config.transport.socket_path.display()
            ))?,
        );
        let socket_path = transport.socket_path().to_path_buf();

        let status_handlers: Arc<dyn RegisterMessageHandlers> = Arc::new(status.clone());
        let engine = ConsoleEngine::new(
            Collaborators {
                transport,
                model: model.clone(),
                distribution: distribution.clone(),
                status_source: Arc::new(status.clone()),
                property_source: properties.clone(),
                handler_sources: vec![status_handlers],
                client_commands: Arc::new(ClientCommands::new(model.clone())),
            },
            EngineConfig {
                scan_period: properties.scan_distribution_files_period(),
                fault_policy: config.console.dispatch_fault_policy,
            },
        )?;

        info!(
            socket = %socket_path.display(),
            directory = %distribution.directory().display(),
            "Console built"
        );
        Ok(Self {
            engine: Arc::new(engine),
            properties,
            model,
            distribution,
            status,
            status_updates,
            socket_path,
        })
    }

    pub fn engine(&self) -> Arc<ConsoleEngine> {
        self.engine.clone()
    }

    pub fn properties(&self) -> &Arc<ConsoleProperties> {
        &self.properties
    }

    pub fn model(&self) -> &Arc<ConsoleModel> {
        &self.model
    }

    pub fn distribution(&self) -> &Arc<DirectoryDistribution> {
        &self.distribution
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn summary(&self) -> ConsoleSummary {
        let snapshot = self.model.snapshot();
        let trigger = self.engine.scan_trigger();
        ConsoleSummary {
            messages_processed: self.engine.messages_processed(),
            faults_logged: self.engine.faults_logged(),
            agents: self.status.agent_count(),
            rescan_trigger: trigger.name().to_string(),
            rescans: trigger.runs(),
            recording: snapshot.recording,
            expressions: snapshot.expressions.len(),
            tests: snapshot
                .tests
                .into_iter()
                .map(|(test, statistics)| TestSummary {
                    test,
                    transactions: statistics.totals.transactions,
                    errors: statistics.totals.errors,
                    mean_time_ms: statistics.totals.mean_time_ms(),
                })
                .collect(),
        }
    }

    /// Run the engine until shutdown, then stop status updates
    pub async fn run(&self) -> Result<()> {
        debug!("Console::run: called");
        let result = self.engine.start().await;
        self.status_updates.stop();
        result.context("Console engine failed")
    }
}
