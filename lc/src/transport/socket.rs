//! Unix socket transport
//!
//! Workers and agents connect to the console socket and write one JSON
//! message per line. Each connection gets its own reader task; all of them
//! feed a single bounded channel, so messages from one connection keep their
//! order while different connections interleave.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{Transport, TransportError};
use crate::messages::Message;

/// Transport accepting newline-delimited JSON on a Unix domain socket
#[derive(Debug)]
pub struct SocketTransport {
    socket_path: PathBuf,
    receiver: Mutex<mpsc::Receiver<Message>>,
    closed: CancellationToken,
}

impl SocketTransport {
    /// Bind the socket and start accepting connections
    ///
    /// A stale socket file left by an earlier run is removed first. Must be
    /// called from within a tokio runtime.
    pub fn bind(
        socket_path: impl Into<PathBuf>,
        buffer: usize,
        max_message_size: usize,
    ) -> Result<Self, TransportError> {
        let socket_path = socket_path.into();
        debug!(?socket_path, buffer, max_message_size, "SocketTransport::bind: called");

        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if socket_path.exists() {
            debug!(?socket_path, "SocketTransport::bind: removing stale socket");
            std::fs::remove_file(&socket_path)?;
        }

        let listener = UnixListener::bind(&socket_path)?;
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        let closed = CancellationToken::new();
        tokio::spawn(accept_connections(listener, sender, closed.clone(), max_message_size));

        info!(socket = %socket_path.display(), "Console transport listening");
        Ok(Self {
            socket_path,
            receiver: Mutex::new(receiver),
            closed,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

async fn accept_connections(
    listener: UnixListener,
    sender: mpsc::Sender<Message>,
    closed: CancellationToken,
    max_message_size: usize,
) {
    loop {
        tokio::select! {
            biased;
            _ = closed.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    let connection = Uuid::now_v7();
                    debug!(%connection, "accept_connections: connection accepted");
                    tokio::spawn(read_connection(
                        connection,
                        stream,
                        sender.clone(),
                        closed.clone(),
                        max_message_size,
                    ));
                }
                Err(e) => {
                    warn!(error = %e, "Failed to accept transport connection");
                }
            },
        }
    }
    debug!("accept_connections: stopped");
}

async fn read_connection(
    connection: Uuid,
    stream: UnixStream,
    sender: mpsc::Sender<Message>,
    closed: CancellationToken,
    max_message_size: usize,
) {
    let mut reader = BufReader::new(stream);
    let mut line = Vec::new();
    let mut received = 0u64;

    loop {
        let read = tokio::select! {
            biased;
            _ = closed.cancelled() => break,
            read = read_bounded_line(&mut reader, &mut line, max_message_size) => read,
        };

        match read {
            Ok(LineRead::Eof) => break,
            Ok(LineRead::Line) => {}
            Ok(LineRead::Oversized { size }) => {
                let e = TransportError::MessageTooLarge {
                    size,
                    limit: max_message_size,
                };
                warn!(%connection, error = %e, "Dropping undeliverable line");
                continue;
            }
            Err(e) => {
                warn!(%connection, error = %e, "Transport connection read failed");
                break;
            }
        }

        let message = match decode_line(&line) {
            Ok(Some(message)) => message,
            Ok(None) => continue,
            Err(e) => {
                warn!(%connection, error = %e, "Dropping undeliverable line");
                continue;
            }
        };

        if sender.send(message).await.is_err() {
            break;
        }
        received += 1;
    }
    debug!(%connection, received, "read_connection: connection finished");
}

/// Outcome of reading one newline-terminated line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineRead {
    Eof,
    Line,
    /// The line exceeded the limit; its bytes were consumed and discarded
    Oversized { size: usize },
}

/// Read one line into `line`, never holding more than `limit` bytes
///
/// Once a line passes `limit` the rest of it is skipped up to the next
/// newline, so the reader stays aligned on the following message.
async fn read_bounded_line<R>(reader: &mut R, line: &mut Vec<u8>, limit: usize) -> std::io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    line.clear();
    let mut size = 0usize;
    let mut oversized = false;

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(match (size, oversized) {
                (0, _) => LineRead::Eof,
                (_, true) => LineRead::Oversized { size },
                (_, false) => LineRead::Line,
            });
        }

        let (used, complete) = match available.iter().position(|&b| b == b'\n') {
            Some(end) => (end + 1, true),
            None => (available.len(), false),
        };
        size += used;
        if !oversized {
            if size > limit {
                oversized = true;
                line.clear();
            } else {
                line.extend_from_slice(&available[..used]);
            }
        }
        reader.consume(used);

        if complete {
            return Ok(if oversized {
                LineRead::Oversized { size }
            } else {
                LineRead::Line
            });
        }
    }
}

/// Decode one line; blank lines yield `None`
fn decode_line(line: &[u8]) -> Result<Option<Message>, TransportError> {
    let trimmed = line.trim_ascii();
    if trimmed.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_slice(trimmed)?))
}

#[async_trait]
impl Transport for SocketTransport {
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
        debug!(socket_path = ?self.socket_path, "SocketTransport::close: called");
        if self.closed.is_cancelled() {
            return;
        }
        self.closed.cancel();
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(socket = %self.socket_path.display(), error = %e, "Failed to remove socket file");
            }
        }
        info!(socket = %self.socket_path.display(), "Console transport closed");
    }
}

impl Drop for SocketTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// Connect to a console socket and write `messages`, one JSON line each
///
/// Returns how many messages were written.
pub async fn send_messages(socket_path: &Path, messages: &[Message]) -> Result<usize, TransportError> {
    debug!(?socket_path, count = messages.len(), "send_messages: called");
    let mut stream = UnixStream::connect(socket_path).await?;

    for message in messages {
        let mut line = serde_json::to_vec(message)?;
        line.push(b'\n');
        stream.write_all(&line).await?;
    }
    stream.flush().await?;
    stream.shutdown().await?;

    Ok(messages.len())
}
