//! Connection Handler Module
//!
//! This module handles individual client connections to BoltKV.
//! Each client gets its own handler task that runs in a loop,
//! reading requests, sending replies and forwarding pub/sub messages.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects (TCP handshake)
//!        │
//!        ▼
//! 2. ConnectionHandler spawned, registered with the broker
//!        │
//!        ▼
//! 3. ┌──────────────────────────────────────────────┐
//!    │      Main Loop                               │
//!    │                                              │
//!    │  ┌───────────────────┐  ┌──────────────────┐ │
//!    │  │ Read socket bytes │  │ Published message│ │
//!    │  └─────────┬─────────┘  └────────┬─────────┘ │
//!    │            ▼                     │           │
//!    │  ┌───────────────────┐           │           │
//!    │  │ Parse request(s)  │           │           │
//!    │  └─────────┬─────────┘           │           │
//!    │            ▼                     │           │
//!    │  ┌───────────────────┐           │           │
//!    │  │ Gate + execute    │           │           │
//!    │  └─────────┬─────────┘           │           │
//!    │            ▼                     ▼           │
//!    │  ┌──────────────────────────────────────┐    │
//!    │  │ Write frame to socket                │    │
//!    │  └──────────────────────────────────────┘    │
//!    └──────────────────────────────────────────────┘
//!        │
//!        ▼
//! 4. Client disconnects / framing error
//!        │
//!        ▼
//! 5. Unsubscribed from every channel, handler task ends
//! ```
//!
//! ## Subscribe Mode
//!
//! After a successful `SUBSCRIBE` the session only accepts `SUBSCRIBE`,
//! `UNSUBSCRIBE` and `PING`. It returns to normal once an `UNSUBSCRIBE`
//! leaves it with no channels.
//!
//! ## Buffer Management
//!
//! We use a BytesMut buffer to accumulate incoming data. TCP is a stream
//! protocol, so a read may hold part of a request or several requests.

use crate::commands::{table, CommandHandler};
use crate::protocol::parser::MAX_BULK_SIZE;
use crate::protocol::{ParseError, RequestParser, RespValue};
use crate::pubsub::Subscriber;
use bytes::{Bytes, BytesMut};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::mpsc::Receiver;
use tracing::{debug, error, info, trace, warn};

/// Maximum size for the read buffer: one maximal bulk string plus headroom
/// for its framing and the rest of the request.
const MAX_BUFFER_SIZE: usize = MAX_BULK_SIZE + 64 * 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Reply sent when a subscribed connection issues any other command.
const SUBSCRIBED_MODE_ERROR: &str = "only SUBSCRIBE/UNSUBSCRIBE/PING allowed";

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
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

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn accepted(&self) -> u64 {
        self.connections_accepted.load(Ordering::Relaxed)
    }

    pub fn active(&self) -> u64 {
        self.active_connections.load(Ordering::Relaxed)
    }

    pub fn commands(&self) -> u64 {
        self.commands_processed.load(Ordering::Relaxed)
    }
}

/// Whether the session is limited to pub/sub commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Normal,
    Subscribed,
}

/// Handles a single client connection.
///
/// Generic over the stream so tests can drive it with in-memory I/O.
pub struct ConnectionHandler<S> {
    /// The client stream, buffered for writes
    stream: BufWriter<S>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Buffer for incoming data
    buffer: BytesMut,

    /// The command handler (shared across connections)
    command_handler: CommandHandler,

    parser: RequestParser,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,

    /// This connection's broker handle
    subscriber: Subscriber,

    /// Published messages waiting to be written
    inbox: Receiver<Bytes>,

    state: SessionState,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new connection handler and registers it with the broker.
    pub fn new(
        stream: S,
        addr: SocketAddr,
        command_handler: CommandHandler,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();
        let (subscriber, inbox) = command_handler.broker().register();

        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            command_handler,
            parser: RequestParser::new(),
            stats,
            subscriber,
            inbox,
            state: SessionState::Normal,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Runs the connection until the client leaves or sends a malformed
    /// request, then removes it from every channel.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, id = self.subscriber.id(), "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected gracefully"),
            Err(e) => match e {
                ConnectionError::ClientDisconnected => {
                    debug!(client = %self.addr, "Client disconnected")
                }
                ConnectionError::IoError(io_err)
                    if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
                {
                    debug!(client = %self.addr, "Connection reset by client")
                }
                _ => warn!(client = %self.addr, error = %e, "Connection error"),
            },
        }

        let channels = self
            .command_handler
            .broker()
            .unsubscribe_all(&self.subscriber);
        if channels > 0 {
            debug!(client = %self.addr, channels = channels, "Removed subscriptions");
        }
        self.stats.connection_closed();
        result
    }

    /// The main read-execute-respond loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            // Serve every complete request already buffered, in order
            while let Some(args) = self.try_parse_request()? {
                let response = self.handle_request(args);
                self.send_response(&response).await?;
            }

            self.wait_for_input().await?;
        }
    }

    /// Applies the subscribe-mode gate, executes the request and updates
    /// the session state.
    fn handle_request(&mut self, args: Vec<Bytes>) -> RespValue {
        self.stats.command_processed();
        let verb = args.first().cloned().unwrap_or_default();

        if self.state == SessionState::Subscribed && !table::allowed_while_subscribed(&verb) {
            return RespValue::error(SUBSCRIBED_MODE_ERROR);
        }

        let response = self.command_handler.execute(args, &self.subscriber);

        match &verb[..] {
            b"SUBSCRIBE" if !response.is_error() => {
                self.state = SessionState::Subscribed;
            }
            b"UNSUBSCRIBE"
                if !self
                    .command_handler
                    .broker()
                    .is_subscribed(&self.subscriber) =>
            {
                self.state = SessionState::Normal;
            }
            _ => {}
        }

        response
    }

    /// Attempts to parse a request from the buffer.
    fn try_parse_request(&mut self) -> Result<Option<Vec<Bytes>>, ConnectionError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        match self.parser.parse(&self.buffer) {
            Ok(Some((args, consumed))) => {
                let _ = self.buffer.split_to(consumed);
                trace!(
                    client = %self.addr,
                    consumed = consumed,
                    remaining = self.buffer.len(),
                    "Parsed request"
                );
                Ok(Some(args))
            }
            Ok(None) => {
                trace!(
                    client = %self.addr,
                    buffered = self.buffer.len(),
                    "Incomplete request, need more data"
                );
                Ok(None)
            }
            Err(e) => {
                warn!(client = %self.addr, error = %e, "Parse error");
                Err(ConnectionError::ParseError(e))
            }
        }
    }

    /// Waits for more request bytes or a published message, whichever comes
    /// first. Published messages are written straight away.
    async fn wait_for_input(&mut self) -> Result<(), ConnectionError> {
        if self.buffer.len() >= MAX_BUFFER_SIZE {
            error!(
                client = %self.addr,
                size = self.buffer.len(),
                "Buffer size limit exceeded"
            );
            return Err(ConnectionError::BufferFull);
        }

        // Ensure we have some capacity
        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(4096);
        }

        tokio::select! {
            read = self.stream.get_mut().read_buf(&mut self.buffer) => {
                let n = read?;
                if n == 0 {
                    return if self.buffer.is_empty() {
                        Err(ConnectionError::ClientDisconnected)
                    } else {
                        // Partial request in buffer
                        Err(ConnectionError::UnexpectedEof)
                    };
                }
                self.stats.bytes_read(n);
                trace!(client = %self.addr, bytes = n, "Read data");
            }
            Some(frame) = self.inbox.recv() => {
                self.send_frame(&frame).await?;
                trace!(client = %self.addr, bytes = frame.len(), "Delivered message");
            }
        }

        Ok(())
    }

    /// Sends a response to the client.
    async fn send_response(&mut self, response: &RespValue) -> Result<(), ConnectionError> {
        let bytes = response.serialize();
        self.send_frame(&bytes).await
    }

    async fn send_frame(&mut self, bytes: &[u8]) -> Result<(), ConnectionError> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await?;
        self.stats.bytes_written(bytes.len());
        trace!(client = %self.addr, bytes = bytes.len(), "Sent frame");
        Ok(())
    }
}

/// Errors that can occur while handling a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Malformed request framing
    #[error("Parse error: {0}")]
    ParseError(#[from] ParseError),

    /// Client disconnected normally
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Unexpected end of stream (partial request)
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// Buffer size limit exceeded
    #[error("Buffer size limit exceeded")]
    BufferFull,
}

/// Handles a client connection to completion.
pub async fn handle_connection<S>(
    stream: S,
    addr: SocketAddr,
    command_handler: CommandHandler,
    stats: Arc<ConnectionStats>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let handler = ConnectionHandler::new(stream, addr, command_handler, stats);
    if let Err(e) = handler.run().await {
        match e {
            ConnectionError::ClientDisconnected => {}
            ConnectionError::IoError(ref io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset => {}
            _ => {
                debug!(client = %addr, error = %e, "Connection ended with error");
            }
        }
    }
}
