//! Engine construction, run loop and lifecycle

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::{DispatchFaultPolicy, EngineError, EngineState};
use crate::dispatch::{MessageDispatchRegistry, RegisterMessageHandlers, install_model_handlers};
use crate::distribution::FileDistribution;
use crate::maintenance::ScheduledTrigger;
use crate::model::Model;
use crate::properties::{PropertySource, reconfiguration_listener};
use crate::status::{StatusSource, new_agent_observer};
use crate::transport::Transport;

/// Everything the engine talks to
pub struct Collaborators {
    pub transport: Arc<dyn Transport>,
    pub model: Arc<dyn Model>,
    pub distribution: Arc<dyn FileDistribution>,
    pub status_source: Arc<dyn StatusSource>,
    pub property_source: Arc<dyn PropertySource>,
    /// Installed after the model handlers, in order
    pub handler_sources: Vec<Arc<dyn RegisterMessageHandlers>>,
    /// Installed last, so its tags win any collision
    pub client_commands: Arc<dyn RegisterMessageHandlers>,
}

/// Engine settings
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub scan_period: Duration,
    pub fault_policy: DispatchFaultPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scan_period: Duration::from_secs(6),
            fault_policy: DispatchFaultPolicy::default(),
        }
    }
}

/// Routes transport messages to their handlers until the transport closes
pub struct ConsoleEngine {
    transport: Arc<dyn Transport>,
    registry: MessageDispatchRegistry,
    fault_policy: DispatchFaultPolicy,
    state: Mutex<EngineState>,
    messages_processed: AtomicU64,
    faults_logged: AtomicU64,
    scan_trigger: ScheduledTrigger,
}

impl ConsoleEngine {
    /// Wire the collaborators together
    ///
    /// Must be called from within a tokio runtime; the rescan trigger starts
    /// counting its first period immediately.
    pub fn new(collaborators: Collaborators, config: EngineConfig) -> Result<Self, EngineError> {
        debug!(?config, "ConsoleEngine::new: called");
        let Collaborators {
            transport,
            model,
            distribution,
            status_source,
            property_source,
            handler_sources,
            client_commands,
        } = collaborators;

        let mut registry = MessageDispatchRegistry::new();
        install_model_handlers(&mut registry, model);
        for source in &handler_sources {
            source.register_message_handlers(&mut registry);
        }
        client_commands.register_message_handlers(&mut registry);
        debug!(handlers = registry.len(), "ConsoleEngine::new: registry assembled");

        let scan_distribution = distribution.clone();
        let scan_trigger = ScheduledTrigger::spawn("distribution-rescan", config.scan_period, move || {
            scan_distribution.rescan().map(|_| ())
        })
        .map_err(|e| EngineError::Maintenance { reason: e.to_string() })?;

        status_source.add_listener(new_agent_observer(distribution.clone()));
        property_source.add_listener(reconfiguration_listener(distribution));

        info!(
            handlers = registry.len(),
            scan_period_ms = config.scan_period.as_millis() as u64,
            "Console engine constructed"
        );
        Ok(Self {
            transport,
            registry,
            fault_policy: config.fault_policy,
            state: Mutex::new(EngineState::Constructed),
            messages_processed: AtomicU64::new(0),
            faults_logged: AtomicU64::new(0),
            scan_trigger,
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> EngineState {
        *self.lock_state()
    }

    /// Messages handled successfully so far
    pub fn messages_processed(&self) -> u64 {
        self.messages_processed.load(Ordering::SeqCst)
    }

    /// Dispatch faults logged and skipped under [`DispatchFaultPolicy::LogAndContinue`]
    pub fn faults_logged(&self) -> u64 {
        self.faults_logged.load(Ordering::SeqCst)
    }

    pub fn scan_trigger(&self) -> &ScheduledTrigger {
        &self.scan_trigger
    }

    /// Run the message loop until the transport closes
    ///
    /// Returns `Ok(())` once the transport reports it is closed. Under the
    /// propagate policy a dispatch fault ends the loop, closes the transport
    /// and is returned. Can only be called once.
    pub async fn start(&self) -> Result<(), EngineError> {
        debug!("ConsoleEngine::start: called");
        {
            let mut state = self.lock_state();
            if *state != EngineState::Constructed {
                return Err(EngineError::NotStartable { state: *state });
            }
            *state = EngineState::Running;
        }
        info!("Console engine running");

        let result = self.run_loop().await;

        if let Err(e) = &result {
            error!(error = %e, "Console engine stopped on fault");
            let close = {
                let mut state = self.lock_state();
                let running = *state == EngineState::Running;
                if running {
                    *state = EngineState::Stopping;
                }
                running
            };
            if close {
                self.transport.close();
            }
        }

        *self.lock_state() = EngineState::Shutdown;
        info!(messages = self.messages_processed(), "Console engine shut down");
        result
    }

    async fn run_loop(&self) -> Result<(), EngineError> {
        while let Some(message) = self.transport.receive_next().await? {
            let tag = message.tag();
            debug!(%tag, "ConsoleEngine::run_loop: dispatching");

            match self.registry.dispatch(&message) {
                Ok(()) => {
                    self.messages_processed.fetch_add(1, Ordering::SeqCst);
                }
                Err(e) => match self.fault_policy {
                    DispatchFaultPolicy::Propagate => return Err(e.into()),
                    DispatchFaultPolicy::LogAndContinue => {
                        self.faults_logged.fetch_add(1, Ordering::SeqCst);
                        warn!(%tag, error = %e, "Message dispatch failed, continuing");
                    }
                },
            }
        }
        debug!("ConsoleEngine::run_loop: transport closed");
        Ok(())
    }

    /// Ask a running engine to stop
    ///
    /// Closes the transport once; the run loop returns when it sees the
    /// closure. Does nothing unless the engine is running.
    pub fn shutdown(&self) {
        debug!("ConsoleEngine::shutdown: called");
        {
            let mut state = self.lock_state();
            if *state != EngineState::Running {
                debug!(state = %*state, "ConsoleEngine::shutdown: not running, ignoring");
                return;
            }
            *state = EngineState::Stopping;
        }
        info!("Console engine shutdown requested");
        self.transport.close();
    }
}

impl std::fmt::Debug for ConsoleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleEngine")
            .field("state", &self.state())
            .field("fault_policy", &self.fault_policy)
            .field("handlers", &self.registry.len())
            .field("messages_processed", &self.messages_processed())
            .finish_non_exhaustive()
    }
}
