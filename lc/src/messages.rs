//! Messages received from remote agents and workers
//!
//! Every message on the wire is a JSON object tagged by `type`. The tag is the
//! dispatch key: [`Message::tag`] extracts it and the dispatch registry routes on it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a test registered by a worker script
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestId(pub String);

impl TestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TestId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Identifier of a remote agent process
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Counters reported for one test over one reporting interval
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct StatisticsSample {
    pub transactions: u64,
    pub errors: u64,
    pub total_time_ms: u64,
}

impl StatisticsSample {
    /// Fold another sample into this one
    pub fn accumulate(&mut self, other: &StatisticsSample) {
        self.transactions += other.transactions;
        self.errors += other.errors;
        self.total_time_ms += other.total_time_ms;
    }

    /// Mean time per successful transaction, if any succeeded
    pub fn mean_time_ms(&self) -> Option<f64> {
        let successful = self.transactions.saturating_sub(self.errors);
        if successful == 0 {
            return None;
        }
        Some(self.total_time_ms as f64 / successful as f64)
    }
}

/// A sample for one test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSample {
    pub test: TestId,
    #[serde(flatten)]
    pub statistics: StatisticsSample,
}

/// Incremental statistics reported by a worker since its previous report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsDelta {
    pub samples: Vec<TestSample>,
}

impl StatisticsDelta {
    /// Convenience constructor for a delta covering a single test
    pub fn single(test: impl Into<TestId>, statistics: StatisticsSample) -> Self {
        Self {
            samples: vec![TestSample {
                test: test.into(),
                statistics,
            }],
        }
    }
}

/// A named derived-statistic expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ExpressionView {
    pub display_name: String,
    pub expression: String,
}

impl ExpressionView {
    pub fn new(display_name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            expression: expression.into(),
        }
    }
}

/// Lifecycle state of an agent or worker process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessState {
    Started,
    Running,
    Finished,
    Unknown,
}

/// Payload of [`Message::RegisterTests`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterTestsMessage {
    pub tests: Vec<TestId>,
}

/// Payload of [`Message::ReportStatistics`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportStatisticsMessage {
    pub delta: StatisticsDelta,
}

/// Payload of [`Message::RegisterExpressionView`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterExpressionViewMessage {
    pub view: ExpressionView,
}

/// An agent reporting its own state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AgentProcessReport {
    pub agent: AgentId,
    #[serde(default)]
    pub name: String,
    pub state: ProcessState,
}

/// An agent reporting the state of one of its workers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WorkerProcessReport {
    pub agent: AgentId,
    pub worker: String,
    pub state: ProcessState,
    #[serde(default)]
    pub running_threads: u32,
    #[serde(default)]
    pub maximum_threads: u32,
}

/// Messages consumed by the console
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Message {
    RegisterTests(RegisterTestsMessage),
    ReportStatistics(ReportStatisticsMessage),
    RegisterExpressionView(RegisterExpressionViewMessage),
    AgentProcessReport(AgentProcessReport),
    WorkerProcessReport(WorkerProcessReport),
    StartRecording,
    StopRecording,
    ResetRecording,
}

/// Dispatch key of a [`Message`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MessageTag {
    RegisterTests,
    ReportStatistics,
    RegisterExpressionView,
    AgentProcessReport,
    WorkerProcessReport,
    StartRecording,
    StopRecording,
    ResetRecording,
}

impl MessageTag {
    /// Wire name, matching the serde `type` field
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageTag::RegisterTests => "register-tests",
            MessageTag::ReportStatistics => "report-statistics",
            MessageTag::RegisterExpressionView => "register-expression-view",
            MessageTag::AgentProcessReport => "agent-process-report",
            MessageTag::WorkerProcessReport => "worker-process-report",
            MessageTag::StartRecording => "start-recording",
            MessageTag::StopRecording => "stop-recording",
            MessageTag::ResetRecording => "reset-recording",
        }
    }
}

impl fmt::Display for MessageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Message {
    pub fn tag(&self) -> MessageTag {
        match self {
            Message::RegisterTests(_) => MessageTag::RegisterTests,
            Message::ReportStatistics(_) => MessageTag::ReportStatistics,
            Message::RegisterExpressionView(_) => MessageTag::RegisterExpressionView,
            Message::AgentProcessReport(_) => MessageTag::AgentProcessReport,
            Message::WorkerProcessReport(_) => MessageTag::WorkerProcessReport,
            Message::StartRecording => MessageTag::StartRecording,
            Message::StopRecording => MessageTag::StopRecording,
            Message::ResetRecording => MessageTag::ResetRecording,
        }
    }

    pub fn register_tests<I, T>(tests: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TestId>,
    {
        Message::RegisterTests(RegisterTestsMessage {
            tests: tests.into_iter().map(Into::into).collect(),
        })
    }

    pub fn report_statistics(delta: StatisticsDelta) -> Self {
        Message::ReportStatistics(ReportStatisticsMessage { delta })
    }

    pub fn register_expression_view(view: ExpressionView) -> Self {
        Message::RegisterExpressionView(RegisterExpressionViewMessage { view })
    }
}

/// A message payload that can be routed to a typed handler
pub trait MessagePayload: Sized + 'static {
    const TAG: MessageTag;

    fn from_message(message: &Message) -> Option<&Self>;
}

impl MessagePayload for RegisterTestsMessage {
    const TAG: MessageTag = MessageTag::RegisterTests;

    fn from_message(message: &Message) -> Option<&Self> {
        match message {
            Message::RegisterTests(payload) => Some(payload),
            _ => None,
        }
    }
}

impl MessagePayload for ReportStatisticsMessage {
    const TAG: MessageTag = MessageTag::ReportStatistics;

    fn from_message(message: &Message) -> Option<&Self> {
        match message {
            Message::ReportStatistics(payload) => Some(payload),
            _ => None,
        }
    }
}

impl MessagePayload for RegisterExpressionViewMessage {
    const TAG: MessageTag = MessageTag::RegisterExpressionView;

    fn from_message(message: &Message) -> Option<&Self> {
        match message {
            Message::RegisterExpressionView(payload) => Some(payload),
            _ => None,
        }
    }
}

impl MessagePayload for AgentProcessReport {
    const TAG: MessageTag = MessageTag::AgentProcessReport;

    fn from_message(message: &Message) -> Option<&Self> {
        match message {
            Message::AgentProcessReport(payload) => Some(payload),
            _ => None,
        }
    }
}

impl MessagePayload for WorkerProcessReport {
    const TAG: MessageTag = MessageTag::WorkerProcessReport;

    fn from_message(message: &Message) -> Option<&Self> {
        match message {
            Message::WorkerProcessReport(payload) => Some(payload),
            _ => None,
        }
    }
}
