//! Console client commands
//!
//! Recording control sent by console clients rather than by workers.

use std::sync::Arc;

use tracing::debug;

use super::registry::{HandlerFault, MessageDispatchRegistry};
use super::RegisterMessageHandlers;
use crate::messages::{Message, MessageTag};
use crate::model::Model;

/// Installs the recording-control handlers
pub struct ClientCommands {
    model: Arc<dyn Model>,
}

impl ClientCommands {
    pub fn new(model: Arc<dyn Model>) -> Self {
        Self { model }
    }
}

impl RegisterMessageHandlers for ClientCommands {
    fn register_message_handlers(&self, registry: &mut MessageDispatchRegistry) {
        debug!("ClientCommands::register_message_handlers: called");

        let model = self.model.clone();
        registry.set(
            MessageTag::StartRecording,
            Box::new(move |_: &Message| -> Result<(), HandlerFault> {
                model.start_recording();
                Ok(())
            }),
        );

        let model = self.model.clone();
        registry.set(
            MessageTag::StopRecording,
            Box::new(move |_: &Message| -> Result<(), HandlerFault> {
                model.stop_recording();
                Ok(())
            }),
        );

        let model = self.model.clone();
        registry.set(
            MessageTag::ResetRecording,
            Box::new(move |_: &Message| -> Result<(), HandlerFault> {
                model.reset_recording();
                Ok(())
            }),
        );
    }
}
