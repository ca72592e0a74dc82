//! Load-generation console
//!
//! Receives messages from remote worker agents and routes each one to the
//! subsystem that owns it, while a scheduled rescan keeps the distribution
//! file set current and agent status and property changes drive cache
//! invalidation and reconfiguration.
//!
//! # Architecture
//!
//! - **Engine**: run loop and lifecycle; owns the dispatch registry and rescan trigger
//! - **Dispatch**: routing table from message tag to handler
//! - **Model**: tests, statistics and expression views
//! - **Distribution**: file set sent to agents, and the agent cache state
//! - **Status**: agent and worker liveness snapshots
//! - **Properties**: live console settings and the reconfiguration listener
//! - **Transport**: where messages come from

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod distribution;
pub mod engine;
pub mod maintenance;
pub mod messages;
pub mod model;
pub mod properties;
pub mod status;
pub mod transport;

// Re-export commonly used types
pub use config::Config;
pub use dispatch::{ClientCommands, DispatchError, MessageDispatchRegistry, RegisterMessageHandlers};
pub use distribution::{AgentCacheState, DirectoryDistribution, FileDistribution};
pub use engine::{Collaborators, Console, ConsoleEngine, ConsoleSummary, DispatchFaultPolicy, EngineConfig, EngineError, EngineState};
pub use maintenance::ScheduledTrigger;
pub use messages::{Message, MessageTag, StatisticsDelta, StatisticsSample, TestId};
pub use model::{ConsoleModel, Model, ModelError};
pub use properties::{ConsoleProperties, PropertySource};
pub use status::{ProcessStatusSnapshot, ProcessStatusSource, StatusSource};
pub use transport::{ChannelTransport, MessageSender, SocketTransport, Transport, TransportError};
