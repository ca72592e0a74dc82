//! Collects process reports and publishes liveness snapshots

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::{Duration, Instant};

use eyre::Result;
use tracing::{debug, info, warn};

use super::{ProcessReports, ProcessStatusSnapshot, StatusListener, StatusSource};
use crate::dispatch::{MessageDispatchRegistry, RegisterMessageHandlers};
use crate::maintenance::ScheduledTrigger;
use crate::messages::{AgentId, AgentProcessReport, ProcessState, WorkerProcessReport};

#[derive(Debug)]
struct AgentEntry {
    report: AgentProcessReport,
    workers: BTreeMap<String, WorkerProcessReport>,
    last_seen: Instant,
}

#[derive(Debug, Default)]
struct TrackerState {
    agents: BTreeMap<AgentId, AgentEntry>,
    /// Agents present in the last published snapshot
    published: BTreeSet<AgentId>,
}

/// Tracks agent and worker reports and notifies listeners on each update
///
/// Cloning gives another handle to the same tracker.
#[derive(Clone)]
pub struct ProcessStatusSource {
    expiry: Duration,
    state: Arc<Mutex<TrackerState>>,
    listeners: Arc<RwLock<Vec<StatusListener>>>,
}

impl ProcessStatusSource {
    /// Agents not heard from within `expiry` are dropped from snapshots
    pub fn new(expiry: Duration) -> Self {
        debug!(?expiry, "ProcessStatusSource::new: called");
        Self {
            expiry,
            state: Arc::new(Mutex::new(TrackerState::default())),
            listeners: Arc::new(RwLock::new(Vec::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record_agent_report(&self, report: &AgentProcessReport) {
        debug!(agent = %report.agent, state = ?report.state, "ProcessStatusSource::record_agent_report: called");
        let mut state = self.lock();
        let now = Instant::now();
        state
            .agents
            .entry(report.agent.clone())
            .and_modify(|entry| {
                entry.report = report.clone();
                entry.last_seen = now;
            })
            .or_insert_with(|| AgentEntry {
                report: report.clone(),
                workers: BTreeMap::new(),
                last_seen: now,
            });
    }

    pub fn record_worker_report(&self, report: &WorkerProcessReport) {
        debug!(agent = %report.agent, worker = %report.worker, "ProcessStatusSource::record_worker_report: called");
        let mut state = self.lock();
        let now = Instant::now();
        let entry = state.agents.entry(report.agent.clone()).or_insert_with(|| AgentEntry {
            report: AgentProcessReport {
                agent: report.agent.clone(),
                name: String::new(),
                state: ProcessState::Unknown,
            },
            workers: BTreeMap::new(),
            last_seen: now,
        });
        entry.last_seen = now;
        entry.workers.insert(report.worker.clone(), report.clone());
    }

    /// Build the next snapshot and deliver it to every listener
    ///
    /// A listener that fails is logged; the others still run.
    pub fn publish_update(&self) -> ProcessStatusSnapshot {
        let snapshot = {
            let mut state = self.lock();
            let now = Instant::now();
            let expiry = self.expiry;

            let before = state.agents.len();
            state.agents.retain(|_, entry| now.duration_since(entry.last_seen) <= expiry);
            let expired = before - state.agents.len();
            if expired > 0 {
                info!(expired, "Dropped agents that stopped reporting");
            }

            let current: BTreeSet<AgentId> = state.agents.keys().cloned().collect();
            let new_agent = current.iter().any(|agent| !state.published.contains(agent));
            state.published = current;

            let reports = state
                .agents
                .values()
                .map(|entry| ProcessReports {
                    agent: entry.report.clone(),
                    workers: entry.workers.values().cloned().collect(),
                })
                .collect();
            ProcessStatusSnapshot::new(reports, new_agent)
        };
        debug!(
            agents = snapshot.reports.len(),
            new_agent = snapshot.new_agent,
            "ProcessStatusSource::publish_update: publishing"
        );

        let listeners = self.listeners.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        for listener in listeners.iter() {
            if let Err(e) = listener(&snapshot) {
                warn!(error = %e, "Process status listener failed");
            }
        }
        snapshot
    }

    /// Publish an update every `period` on a maintenance trigger of its own
    pub fn spawn_updates(&self, period: Duration) -> Result<ScheduledTrigger> {
        debug!(?period, "ProcessStatusSource::spawn_updates: called");
        let source = self.clone();
        ScheduledTrigger::spawn("process-status", period, move || {
            source.publish_update();
            Ok(())
        })
    }

    pub fn agent_count(&self) -> usize {
        self.lock().agents.len()
    }
}

impl StatusSource for ProcessStatusSource {
    fn add_listener(&self, listener: StatusListener) {
        debug!("ProcessStatusSource::add_listener: called");
        self.listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(listener);
    }
}

impl RegisterMessageHandlers for ProcessStatusSource {
    fn register_message_handlers(&self, registry: &mut MessageDispatchRegistry) {
        debug!("ProcessStatusSource::register_message_handlers: called");

        let source = self.clone();
        registry.register::<AgentProcessReport, _>(move |report| {
            source.record_agent_report(report);
            Ok(())
        });

        let source = self.clone();
        registry.register::<WorkerProcessReport, _>(move |report| {
            source.record_worker_report(report);
            Ok(())
        });
    }
}
