//! Routing table from message tag to handler

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};

use thiserror::Error;
use tracing::{debug, warn};

use crate::messages::{Message, MessagePayload, MessageTag};

/// Fault raised by a handler while applying a message
pub type HandlerFault = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A message handler
///
/// Handlers run on the message-processing context, one at a time, in arrival order.
/// They must not block: a blocked handler stalls every later message.
pub type Handler = Box<dyn Fn(&Message) -> Result<(), HandlerFault> + Send + Sync>;

/// Errors from dispatching a message
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Unhandled message type: {tag}")]
    Unhandled { tag: MessageTag },

    #[error("Handler for {tag} failed: {source}")]
    Handler {
        tag: MessageTag,
        #[source]
        source: HandlerFault,
    },
}

impl DispatchError {
    pub fn tag(&self) -> MessageTag {
        match self {
            DispatchError::Unhandled { tag } | DispatchError::Handler { tag, .. } => *tag,
        }
    }
}

/// Maps each message tag to exactly one handler
#[derive(Default)]
pub struct MessageDispatchRegistry {
    handlers: HashMap<MessageTag, Handler>,
}

impl MessageDispatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the handler for `tag`, returning the handler it replaces
    pub fn set(&mut self, tag: MessageTag, handler: Handler) -> Option<Handler> {
        debug!(%tag, "MessageDispatchRegistry::set: called");
        let previous = self.handlers.insert(tag, handler);
        if previous.is_some() {
            debug!(%tag, "MessageDispatchRegistry::set: replaced existing handler");
        }
        previous
    }

    /// Install a handler that receives the typed payload for `P::TAG`
    pub fn register<P, F>(&mut self, handler: F) -> Option<Handler>
    where
        P: MessagePayload,
        F: Fn(&P) -> Result<(), HandlerFault> + Send + Sync + 'static,
    {
        self.set(
            P::TAG,
            Box::new(move |message: &Message| match P::from_message(message) {
                Some(payload) => handler(payload),
                None => Err(format!("message {} routed to {} handler", message.tag(), P::TAG).into()),
            }),
        )
    }

    /// Route `message` to its handler and run it to completion
    pub fn dispatch(&self, message: &Message) -> Result<(), DispatchError> {
        let tag = message.tag();
        debug!(%tag, "MessageDispatchRegistry::dispatch: called");

        let Some(handler) = self.handlers.get(&tag) else {
            warn!(%tag, "No handler registered for message type");
            return Err(DispatchError::Unhandled { tag });
        };

        match panic::catch_unwind(AssertUnwindSafe(|| handler(message))) {
            Ok(result) => result.map_err(|source| DispatchError::Handler { tag, source }),
            Err(payload) => {
                let reason = panic_reason(payload.as_ref());
                warn!(%tag, %reason, "Message handler panicked");
                Err(DispatchError::Handler {
                    tag,
                    source: format!("handler panicked: {}", reason).into(),
                })
            }
        }
    }

    pub fn is_registered(&self, tag: MessageTag) -> bool {
        self.handlers.contains_key(&tag)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

fn panic_reason(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(reason) = payload.downcast_ref::<&str>() {
        reason.to_string()
    } else if let Some(reason) = payload.downcast_ref::<String>() {
        reason.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl std::fmt::Debug for MessageDispatchRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut tags: Vec<_> = self.handlers.keys().collect();
        tags.sort();
        f.debug_struct("MessageDispatchRegistry").field("tags", &tags).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{RegisterTestsMessage, TestId};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_handler(counter: Arc<AtomicUsize>) -> Handler {
        Box::new(move |_: &Message| -> Result<(), HandlerFault> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn test_dispatch_invokes_handler_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = MessageDispatchRegistry::new();
        registry.set(MessageTag::StartRecording, counting_handler(calls.clone()));

        registry.dispatch(&Message::StartRecording).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dispatch_unregistered_tag_is_error() {
        let registry = MessageDispatchRegistry::new();

        let err = registry.dispatch(&Message::StopRecording).unwrap_err();

        assert!(matches!(err, DispatchError::Unhandled { tag: MessageTag::StopRecording }));
        assert!(err.to_string().contains("stop-recording"));
    }

    #[test]
    fn test_last_registration_wins() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let mut registry = MessageDispatchRegistry::new();

        assert!(registry.set(MessageTag::ResetRecording, counting_handler(first.clone())).is_none());
        assert!(registry.set(MessageTag::ResetRecording, counting_handler(second.clone())).is_some());
        registry.dispatch(&Message::ResetRecording).unwrap();

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_typed_registration_receives_payload() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut registry = MessageDispatchRegistry::new();
        registry.register::<RegisterTestsMessage, _>(move |payload| {
            sink.lock().unwrap().extend(payload.tests.iter().cloned());
            Ok(())
        });

        registry.dispatch(&Message::register_tests(["T1", "T2"])).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![TestId::new("T1"), TestId::new("T2")]);
        assert!(registry.is_registered(MessageTag::RegisterTests));
    }

    #[test]
    fn test_handler_fault_is_surfaced_with_tag() {
        let mut registry = MessageDispatchRegistry::new();
        registry.set(
            MessageTag::StartRecording,
            Box::new(|_: &Message| -> Result<(), HandlerFault> { Err("model unavailable".into()) }),
        );

        let err = registry.dispatch(&Message::StartRecording).unwrap_err();

        assert_eq!(err.tag(), MessageTag::StartRecording);
        assert!(err.to_string().contains("model unavailable"));
    }

    #[test]
    fn test_panicking_handler_becomes_handler_fault() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = MessageDispatchRegistry::new();
        registry.set(
            MessageTag::StartRecording,
            Box::new(|_: &Message| -> Result<(), HandlerFault> { panic!("recording backend missing") }),
        );
        registry.set(MessageTag::StopRecording, counting_handler(calls.clone()));

        let err = registry.dispatch(&Message::StartRecording).unwrap_err();

        assert!(matches!(err, DispatchError::Handler { tag: MessageTag::StartRecording, .. }));
        assert!(err.to_string().contains("recording backend missing"));

        registry.dispatch(&Message::StopRecording).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
