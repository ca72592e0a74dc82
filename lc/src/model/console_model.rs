//! In-memory console model

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info};

use super::{Model, ModelError};
use crate::messages::{ExpressionView, StatisticsDelta, StatisticsSample, TestId};

/// Aggregates held for one registered test
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestStatistics {
    /// Everything reported since the test was registered
    pub totals: StatisticsSample,
    /// Everything reported while recording, since the last reset
    pub recorded: StatisticsSample,
    /// Number of deltas that carried a sample for this test
    pub deltas_applied: u64,
}

/// Point-in-time copy of the model, in registration order
#[derive(Debug, Clone, Default)]
pub struct ModelSnapshot {
    pub tests: Vec<(TestId, TestStatistics)>,
    pub expressions: Vec<ExpressionView>,
    pub recording: bool,
}

#[derive(Debug, Default)]
struct ModelState {
    order: Vec<TestId>,
    statistics: HashMap<TestId, TestStatistics>,
    expressions: Vec<ExpressionView>,
    recording: bool,
}

/// Model backed by process memory
#[derive(Debug, Default)]
pub struct ConsoleModel {
    state: RwLock<ModelState>,
}

impl ConsoleModel {
    pub fn new() -> Self {
        debug!("ConsoleModel::new: called");
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, ModelState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, ModelState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn registered_tests(&self) -> Vec<TestId> {
        self.read().order.clone()
    }

    pub fn statistics(&self, test: &TestId) -> Option<TestStatistics> {
        self.read().statistics.get(test).cloned()
    }

    pub fn expressions(&self) -> Vec<ExpressionView> {
        self.read().expressions.clone()
    }

    pub fn is_recording(&self) -> bool {
        self.read().recording
    }

    pub fn snapshot(&self) -> ModelSnapshot {
        let state = self.read();
        ModelSnapshot {
            tests: state
                .order
                .iter()
                .map(|id| (id.clone(), state.statistics.get(id).cloned().unwrap_or_default()))
                .collect(),
            expressions: state.expressions.clone(),
            recording: state.recording,
        }
    }
}

impl Model for ConsoleModel {
    fn register_tests(&self, tests: &[TestId]) -> Result<(), ModelError> {
        debug!(count = tests.len(), "ConsoleModel::register_tests: called");
        let mut state = self.write();
        let mut added = 0;
        for test in tests {
            if state.statistics.contains_key(test) {
                continue;
            }
            state.statistics.insert(test.clone(), TestStatistics::default());
            state.order.push(test.clone());
            added += 1;
        }
        if added > 0 {
            info!(added, total = state.order.len(), "Registered tests");
        }
        Ok(())
    }

    fn add_statistics_delta(&self, delta: &StatisticsDelta) -> Result<(), ModelError> {
        debug!(samples = delta.samples.len(), "ConsoleModel::add_statistics_delta: called");
        let mut state = self.write();

        // Reject the whole delta before touching any aggregate
        if let Some(unknown) = delta.samples.iter().find(|s| !state.statistics.contains_key(&s.test)) {
            return Err(ModelError::UnknownTest(unknown.test.clone()));
        }

        let recording = state.recording;
        for sample in &delta.samples {
            if let Some(entry) = state.statistics.get_mut(&sample.test) {
                entry.totals.accumulate(&sample.statistics);
                if recording {
                    entry.recorded.accumulate(&sample.statistics);
                }
                entry.deltas_applied += 1;
            }
        }
        Ok(())
    }

    fn register_expression(&self, view: &ExpressionView) -> Result<(), ModelError> {
        debug!(name = %view.display_name, "ConsoleModel::register_expression: called");
        if view.display_name.trim().is_empty() {
            return Err(ModelError::InvalidExpression {
                name: view.display_name.clone(),
                reason: "display name is empty".to_string(),
            });
        }
        if view.expression.trim().is_empty() {
            return Err(ModelError::InvalidExpression {
                name: view.display_name.clone(),
                reason: "expression is empty".to_string(),
            });
        }

        let mut state = self.write();
        if !state.expressions.contains(view) {
            state.expressions.push(view.clone());
        }
        Ok(())
    }

    fn start_recording(&self) {
        debug!("ConsoleModel::start_recording: called");
        self.write().recording = true;
        info!("Recording started");
    }

    fn stop_recording(&self) {
        debug!("ConsoleModel::stop_recording: called");
        self.write().recording = false;
        info!("Recording stopped");
    }

    fn reset_recording(&self) {
        debug!("ConsoleModel::reset_recording: called");
        let mut state = self.write();
        for entry in state.statistics.values_mut() {
            entry.recorded = StatisticsSample::default();
        }
        info!("Recorded statistics reset");
    }
}
