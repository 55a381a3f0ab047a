//! Per-connection request/response loop.
//!
//! ```text
//! 1. Client connects
//!        │
//!        ▼
//! 2. Handler task spawned
//!        │
//!        ▼
//! 3. Loop:
//!    ┌──────────────────────────────┐
//!    │ a. Decode one frame          │
//!    │ b. Extract the command       │
//!    │ c. Execute it                │
//!    │ d. Write and flush the reply │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 4. Client disconnects / protocol error
//!        │
//!        ▼
//! 5. Handler task ends, stream dropped
//! ```
//!
//! Frames that decode fine but are not a valid command (not an array, or an
//! array with non-string elements) get an error reply and the loop goes on.
//! A frame that cannot be decoded ends the connection without a reply.

use crate::commands::{Command, CommandHandler};
use crate::protocol::{ProtocolError, RespReader, RespWriter};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, info, trace, warn};

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Commands handed to the dispatcher
    pub commands_processed: AtomicU64,
    /// Frames answered with `expected array` / `invalid argument type`
    pub frames_rejected: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_rejected(&self) {
        self.frames_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written.fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// Malformed or truncated frame, or a failed read
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Failed to write a reply
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConnectionError {
    /// Resets and truncated frames are the client going away, not a fault on
    /// our side.
    fn is_disconnect(&self) -> bool {
        let io_err = match self {
            ConnectionError::Protocol(ProtocolError::Io(e)) | ConnectionError::Io(e) => e,
            ConnectionError::Protocol(ProtocolError::UnexpectedEof) => return true,
            ConnectionError::Protocol(_) => return false,
        };
        matches!(
            io_err.kind(),
            std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::BrokenPipe
        )
    }
}

/// Drives one client connection over any duplex byte stream.
pub struct ConnectionHandler<S> {
    reader: RespReader<ReadHalf<S>>,
    writer: RespWriter<WriteHalf<S>>,

    /// Client label for logging
    peer: String,

    /// The command handler (shares the storage engine)
    command_handler: CommandHandler,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,
}

impl<S: AsyncRead + AsyncWrite> ConnectionHandler<S> {
    /// Creates a handler for `stream`.
    ///
    /// `max_frame_size` caps the bytes buffered while waiting for one frame.
    pub fn new(
        stream: S,
        peer: impl Into<String>,
        command_handler: CommandHandler,
        stats: Arc<ConnectionStats>,
        max_frame_size: usize,
    ) -> Self {
        stats.connection_opened();

        let (read_half, write_half) = tokio::io::split(stream);

        Self {
            reader: RespReader::with_max_frame_size(read_half, max_frame_size),
            writer: RespWriter::new(write_half),
            peer: peer.into(),
            command_handler,
            stats,
        }
    }

    /// Runs the connection until the client disconnects or sends a frame
    /// that cannot be decoded.
    ///
    /// A clean close between frames returns `Ok(())`.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.peer, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => debug!(client = %self.peer, "Client disconnected"),
            Err(e) if e.is_disconnect() => {
                debug!(client = %self.peer, error = %e, "Connection dropped by client")
            }
            Err(e) => warn!(client = %self.peer, error = %e, "Closing connection"),
        }

        self.stats.connection_closed();
        result
    }

    /// The decode-execute-respond loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            let frame = match self.reader.decode().await {
                Ok(frame) => frame,
                Err(ProtocolError::ConnectionClosed) => return Ok(()),
                Err(e) => return Err(e.into()),
            };

            let reply = match Command::from_frame(frame) {
                Ok(command) => {
                    trace!(client = %self.peer, command = ?command.name(), "Executing command");
                    self.stats.command_processed();
                    self.command_handler.execute(command)
                }
                Err(err) => {
                    debug!(client = %self.peer, error = %err, "Rejected frame");
                    self.stats.frame_rejected();
                    err.into()
                }
            };

            let written = self.writer.write_value(&reply).await?;
            self.stats.bytes_written(written);
        }
    }
}

/// Handles a TCP client connection to completion.
///
/// Errors are logged by [`ConnectionHandler::run`]; nothing is returned.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    command_handler: CommandHandler,
    stats: Arc<ConnectionStats>,
    max_frame_size: usize,
) {
    let handler =
        ConnectionHandler::new(stream, addr.to_string(), command_handler, stats, max_frame_size);
    let _ = handler.run().await;
}
