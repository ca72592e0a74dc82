//! Integration tests for the console engine
//!
//! These drive the engine through its public surface with an in-process
//! transport and recording collaborators.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use eyre::Result;
use regex::Regex;

use loadconsole::config::ConsoleConfig;
use loadconsole::distribution::{FileDistribution, ScanOutcome};
use loadconsole::engine::{Collaborators, ConsoleEngine, EngineConfig, EngineError, EngineState};
use loadconsole::messages::{
    AgentId, AgentProcessReport, ExpressionView, Message, ProcessState, StatisticsDelta, StatisticsSample, TestId,
};
use loadconsole::model::{Model, ModelError};
use loadconsole::properties::ConsoleProperties;
use loadconsole::status::ProcessStatusSource;
use loadconsole::transport::{ChannelTransport, MessageSender};
use loadconsole::{ClientCommands, RegisterMessageHandlers};

// =============================================================================
// Recording collaborators
// =============================================================================

#[derive(Debug, Default)]
struct RecordingModel {
    calls: Mutex<Vec<String>>,
}

impl RecordingModel {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Model for RecordingModel {
    fn register_tests(&self, tests: &[TestId]) -> Result<(), ModelError> {
        let names: Vec<&str> = tests.iter().map(|t| t.as_str()).collect();
        self.record(format!("register_tests {}", names.join(",")));
        Ok(())
    }

    fn add_statistics_delta(&self, delta: &StatisticsDelta) -> Result<(), ModelError> {
        for sample in &delta.samples {
            self.record(format!("delta {} {}", sample.test, sample.statistics.transactions));
        }
        Ok(())
    }

    fn register_expression(&self, view: &ExpressionView) -> Result<(), ModelError> {
        self.record(format!("expression {}", view.display_name));
        Ok(())
    }

    fn start_recording(&self) {
        self.record("start".to_string());
    }

    fn stop_recording(&self) {
        self.record("stop".to_string());
    }

    fn reset_recording(&self) {
        self.record("reset".to_string());
    }
}

#[derive(Debug, Default)]
struct RecordingDistribution {
    invalidations: AtomicUsize,
    rescans: AtomicUsize,
    directories: Mutex<Vec<PathBuf>>,
    patterns: Mutex<Vec<String>>,
}

impl FileDistribution for RecordingDistribution {
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

struct Harness {
    engine: Arc<ConsoleEngine>,
    sender: MessageSender,
    model: Arc<RecordingModel>,
    distribution: Arc<RecordingDistribution>,
    status: ProcessStatusSource,
    properties: Arc<ConsoleProperties>,
}

fn harness(scan_period: Duration) -> Harness {
    let (transport, sender) = ChannelTransport::new(32);
    let model = Arc::new(RecordingModel::default());
    let distribution = Arc::new(RecordingDistribution::default());
    let status = ProcessStatusSource::new(Duration::from_secs(60));
    let properties = Arc::new(ConsoleProperties::from_config(&ConsoleConfig::default()).expect("default properties"));
    let status_handlers: Arc<dyn RegisterMessageHandlers> = Arc::new(status.clone());

    let engine = ConsoleEngine::new(
        Collaborators {
            transport: Arc::new(transport),
            model: model.clone(),
            distribution: distribution.clone(),
            status_source: Arc::new(status.clone()),
            property_source: properties.clone(),
            handler_sources: vec![status_handlers],
            client_commands: Arc::new(ClientCommands::new(model.clone())),
        },
        EngineConfig {
            scan_period,
            ..EngineConfig::default()
        },
    )
    .expect("Failed to build engine");

    Harness {
        engine: Arc::new(engine),
        sender,
        model,
        distribution,
        status,
        properties,
    }
}

async fn run_until_processed(h: &Harness, count: u64) {
    let engine = h.engine.clone();
    let run = tokio::spawn(async move { engine.start().await });

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while h.engine.state() != EngineState::Running || h.engine.messages_processed() < count {
        assert!(tokio::time::Instant::now() < deadline, "engine stalled");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    h.engine.shutdown();

    let result = tokio::time::timeout(Duration::from_secs(5), run).await;
    assert!(result.is_ok(), "Engine should shut down after the transport closes");
    result.unwrap().unwrap().unwrap();
}

// =============================================================================
// Run loop
// =============================================================================

#[tokio::test]
async fn test_end_to_end_register_report_expression() {
    let h = harness(Duration::from_secs(60));

    h.sender.send(Message::register_tests(["T1", "T2"])).await.unwrap();
    h.sender
        .send(Message::report_statistics(StatisticsDelta::single(
            "T1",
            StatisticsSample {
                transactions: 4,
                errors: 0,
                total_time_ms: 200,
            },
        )))
        .await
        .unwrap();
    h.sender
        .send(Message::register_expression_view(ExpressionView::new(
            "mean-response",
            "(/ timedTestTime successfulTests)",
        )))
        .await
        .unwrap();

    run_until_processed(&h, 3).await;

    assert_eq!(
        h.model.calls(),
        vec!["register_tests T1,T2", "delta T1 4", "expression mean-response"]
    );
    assert_eq!(h.engine.state(), EngineState::Shutdown);
}

#[tokio::test]
async fn test_messages_dispatched_in_arrival_order() {
    let h = harness(Duration::from_secs(60));

    let mut expected = Vec::new();
    for i in 0..20u64 {
        let message = match i % 4 {
            0 => Message::StartRecording,
            1 => Message::report_statistics(StatisticsDelta::single(
                "T1",
                StatisticsSample {
                    transactions: i,
                    ..StatisticsSample::default()
                },
            )),
            2 => Message::StopRecording,
            _ => Message::ResetRecording,
        };
        expected.push(match i % 4 {
            0 => "start".to_string(),
            1 => format!("delta T1 {}", i),
            2 => "stop".to_string(),
            _ => "reset".to_string(),
        });
        h.sender.send(message).await.unwrap();
    }

    run_until_processed(&h, 20).await;

    assert_eq!(h.model.calls(), expected);
}

#[tokio::test]
async fn test_shutdown_is_single_shot() {
    let h = harness(Duration::from_secs(60));
    run_until_processed(&h, 0).await;

    h.engine.shutdown();
    h.engine.shutdown();

    assert_eq!(h.engine.state(), EngineState::Shutdown);
    assert!(matches!(
        h.engine.start().await,
        Err(EngineError::NotStartable {
            state: EngineState::Shutdown
        })
    ));
}

// =============================================================================
// Reactions outside the message loop
// =============================================================================

#[tokio::test]
async fn test_agent_reports_trigger_one_invalidation() {
    let h = harness(Duration::from_secs(60));

    h.sender
        .send(Message::AgentProcessReport(AgentProcessReport {
            agent: AgentId::new("agent-1"),
            name: "loadhost-1".to_string(),
            state: ProcessState::Running,
        }))
        .await
        .unwrap();
    run_until_processed(&h, 1).await;

    h.status.publish_update();
    h.status.publish_update();

    assert_eq!(h.distribution.invalidations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_property_changes_forwarded_to_distribution() {
    let h = harness(Duration::from_secs(60));

    h.properties.set_distribution_directory(PathBuf::from("/srv/grinder"));
    h.properties.set_distribution_directory(PathBuf::from("/srv/grinder"));
    h.properties
        .set_distribution_file_filter_expression(r"^.*\.class$")
        .unwrap();

    assert_eq!(*h.distribution.directories.lock().unwrap(), vec![PathBuf::from("/srv/grinder")]);
    assert_eq!(*h.distribution.patterns.lock().unwrap(), vec![r"^.*\.class$".to_string()]);
}

#[tokio::test]
async fn test_rescan_waits_one_period_then_repeats() {
    let h = harness(Duration::from_millis(150));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.distribution.rescans.load(Ordering::SeqCst), 0);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(h.distribution.rescans.load(Ordering::SeqCst) >= 2);
}
