//! Process status
//!
//! Agents report their own state and their workers' states. The
//! [`ProcessStatusSource`] collects those reports and periodically publishes a
//! [`ProcessStatusSnapshot`] to its listeners, flagging snapshots in which an
//! agent appears that was absent from the previous one.

mod observer;
mod source;

pub use observer::new_agent_observer;
pub use source::ProcessStatusSource;

use chrono::{DateTime, Utc};
use eyre::Result;

use crate::messages::{AgentProcessReport, WorkerProcessReport};

/// Latest reports for one agent and its workers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessReports {
    pub agent: AgentProcessReport,
    pub workers: Vec<WorkerProcessReport>,
}

/// One published liveness snapshot
#[derive(Debug, Clone)]
pub struct ProcessStatusSnapshot {
    pub reports: Vec<ProcessReports>,
    /// An agent is present that was not in the previous snapshot
    pub new_agent: bool,
    pub taken_at: DateTime<Utc>,
}

impl ProcessStatusSnapshot {
    pub fn new(reports: Vec<ProcessReports>, new_agent: bool) -> Self {
        Self {
            reports,
            new_agent,
            taken_at: Utc::now(),
        }
    }
}

/// Callback invoked on the status source's own context for every snapshot
pub type StatusListener = Box<dyn Fn(&ProcessStatusSnapshot) -> Result<()> + Send + Sync>;

/// Something that delivers liveness snapshots to registered listeners
pub trait StatusSource: Send + Sync {
    fn add_listener(&self, listener: StatusListener);
}
