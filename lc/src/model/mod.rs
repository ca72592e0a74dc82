//! Test and statistics model
//!
//! The model is the target of the message handlers. Handlers only ever call it
//! from the message-processing context, so the order of calls is the arrival
//! order of the messages.

mod console_model;

pub use console_model::{ConsoleModel, ModelSnapshot, TestStatistics};

use thiserror::Error;

use crate::messages::{ExpressionView, StatisticsDelta, TestId};

/// Errors from model operations
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Statistics reported for unregistered test: {0}")]
    UnknownTest(TestId),

    #[error("Invalid expression view '{name}': {reason}")]
    InvalidExpression { name: String, reason: String },
}

/// Operations the console applies to its test/statistics model
pub trait Model: Send + Sync {
    /// Register tests; re-registering a known test is not an error
    fn register_tests(&self, tests: &[TestId]) -> Result<(), ModelError>;

    /// Fold an incremental statistics record into the running aggregates
    fn add_statistics_delta(&self, delta: &StatisticsDelta) -> Result<(), ModelError>;

    /// Register a named derived-statistic expression
    fn register_expression(&self, view: &ExpressionView) -> Result<(), ModelError>;

    fn start_recording(&self);

    fn stop_recording(&self);

    fn reset_recording(&self);
}
