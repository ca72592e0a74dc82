//! In-process transport over a bounded tokio channel

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{Transport, TransportError};
use crate::messages::Message;

/// Receiving half; messages are yielded in the order they were sent
#[derive(Debug)]
pub struct ChannelTransport {
    receiver: Mutex<mpsc::Receiver<Message>>,
    closed: CancellationToken,
}

/// Sending half of a [`ChannelTransport`]
#[derive(Debug, Clone)]
pub struct MessageSender {
    sender: mpsc::Sender<Message>,
    closed: CancellationToken,
}

impl ChannelTransport {
    /// Create a transport buffering up to `buffer` messages
    pub fn new(buffer: usize) -> (Self, MessageSender) {
        debug!(buffer, "ChannelTransport::new: called");
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        let closed = CancellationToken::new();
        (
            Self {
                receiver: Mutex::new(receiver),
                closed: closed.clone(),
            },
            MessageSender { sender, closed },
        )
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

impl MessageSender {
    /// Queue a message, waiting for buffer space if needed
    pub async fn send(&self, message: Message) -> Result<(), TransportError> {
        if self.closed.is_cancelled() {
            return Err(TransportError::Closed);
        }
        self.sender.send(message).await.map_err(|_| TransportError::Closed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled() || self.sender.is_closed()
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn receive_next(&self) -> Result<Option<Message>, TransportError> {
        if self.closed.is_cancelled() {
            return Ok(None);
        }
        let mut receiver = self.receiver.lock().await;
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Ok(None),
            message = receiver.recv() => Ok(message),
        }
    }

    fn close(&self) {
        debug!("ChannelTransport::close: called");
        self.closed.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::TestId;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_messages_arrive_in_send_order() {
        let (transport, sender) = ChannelTransport::new(8);

        sender.send(Message::register_tests([TestId::new("T1")])).await.unwrap();
        sender.send(Message::StartRecording).await.unwrap();

        assert_eq!(
            transport.receive_next().await.unwrap().map(|m| m.tag()),
            Some(crate::messages::MessageTag::RegisterTests)
        );
        assert!(matches!(transport.receive_next().await.unwrap(), Some(Message::StartRecording)));
    }

    #[tokio::test]
    async fn test_close_wakes_pending_receive() {
        let (transport, _sender) = ChannelTransport::new(8);
        let transport = Arc::new(transport);

        let waiter = {
            let transport = transport.clone();
            tokio::spawn(async move { transport.receive_next().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        transport.close();

        let received = tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
        assert!(received.unwrap().is_none());
        assert!(transport.is_closed());
    }

    #[tokio::test]
    async fn test_closed_transport_stays_closed() {
        let (transport, sender) = ChannelTransport::new(8);
        sender.send(Message::StopRecording).await.unwrap();
        transport.close();

        assert!(transport.receive_next().await.unwrap().is_none());
        assert!(transport.receive_next().await.unwrap().is_none());
        assert!(matches!(sender.send(Message::StopRecording).await, Err(TransportError::Closed)));
        assert!(sender.is_closed());
    }

    #[tokio::test]
    async fn test_dropped_senders_end_stream() {
        let (transport, sender) = ChannelTransport::new(8);
        drop(sender);

        assert!(transport.receive_next().await.unwrap().is_none());
    }
}
