//! Console coordination engine
//!
//! [`ConsoleEngine`] owns the dispatch registry and the distribution rescan
//! trigger, hooks the new-agent observer and reconfiguration listener onto
//! their sources, and runs the message loop. [`Console`] is the composition
//! root that builds every collaborator from configuration.

mod core;
mod wiring;

pub use core::{Collaborators, ConsoleEngine, EngineConfig};
pub use wiring::{Console, ConsoleSummary, TestSummary};

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dispatch::DispatchError;
use crate::transport::TransportError;

/// What the run loop does when a message cannot be handled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DispatchFaultPolicy {
    /// End the run loop and return the fault to the caller of `start()`
    #[default]
    Propagate,
    /// Log the fault and carry on with the next message
    LogAndContinue,
}

/// Engine lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Constructed,
    Running,
    /// Shutdown requested; waiting for the run loop to observe the closed transport
    Stopping,
    Shutdown,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Constructed => "constructed",
            EngineState::Running => "running",
            EngineState::Stopping => "stopping",
            EngineState::Shutdown => "shutdown",
        };
        write!(f, "{}", name)
    }
}

/// Errors from constructing or running the engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Engine cannot start from the {state} state")]
    NotStartable { state: EngineState },

    #[error("Failed to schedule distribution rescans: {reason}")]
    Maintenance { reason: String },

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
