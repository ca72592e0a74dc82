//! Message transports feeding the engine run loop
//!
//! A transport yields messages one at a time until it is closed. `close()` may
//! be called from any task while another task waits in `receive_next()`; the
//! waiter then sees `Ok(None)` and every later call does too.

mod channel;
mod socket;

pub use channel::{ChannelTransport, MessageSender};
pub use socket::{SocketTransport, send_messages};

use async_trait::async_trait;
use thiserror::Error;

use crate::messages::Message;

/// Errors raised while moving messages
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Transport I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to decode message: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Message of {size} bytes exceeds the {limit} byte limit")]
    MessageTooLarge { size: usize, limit: usize },

    #[error("Transport is closed")]
    Closed,
}

/// Source of inbound messages for the engine
#[async_trait]
pub trait Transport: Send + Sync {
    /// Wait for the next message; `Ok(None)` means the transport is closed for good
    async fn receive_next(&self) -> Result<Option<Message>, TransportError>;

    /// Close the transport, waking any pending `receive_next`
    fn close(&self);
}
