//! Minimal queue-store client speaking RESP over TCP.
//!
//! Only the three commands the job pipeline needs are implemented:
//! `PING`, `LPUSH` and `BRPOP`. Every operation dials a fresh connection and
//! drops it when the reply has been read; there is no pooling.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::protocol::{Command, ProtocolError, Value};

/// Default bound on how long establishing a TCP connection may take.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Acknowledgement expected in reply to `PING`.
const PONG: &str = "PONG";

/// `BRPOP` timeout argument meaning "block until an element arrives".
const BLOCK_FOREVER: &str = "0";

/// Initial read buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 4096;

/// Errors produced by [`QueueClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out connecting to {addr} after {timeout:?}")]
    ConnectTimeout { addr: String, timeout: Duration },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection closed by peer before a full reply was read")]
    Closed,

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("server replied with error: {0}")]
    Server(String),

    #[error("unexpected reply to {command}: {reply}")]
    UnexpectedReply { command: &'static str, reply: String },

    #[error("operation cancelled")]
    Cancelled,
}

impl ClientError {
    /// Returns `true` if the operation ended because its cancellation signal fired.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// A connectionless handle to the queue store.
///
/// Cloning is cheap; each clone dials its own connections.
///
/// # Examples
///
/// ```rust,no_run
/// use crucible::client::QueueClient;
///
/// # async fn run() -> Result<(), crucible::client::ClientError> {
/// let client = QueueClient::new("localhost:6379");
/// client.ping().await?;
/// client.lpush("jobs", b"payload").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct QueueClient {
    addr: String,
    dial_timeout: Duration,
}

impl QueueClient {
    /// Creates a client for the store at `addr` (`host:port`).
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
        }
    }

    /// Overrides the dial timeout.
    #[must_use]
    pub fn dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }

    /// Returns the address this client dials.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Checks that the store is reachable and answering.
    ///
    /// # Errors
    ///
    /// Any dial or I/O failure, or a reply other than `+PONG`.
    pub async fn ping(&self) -> Result<(), ClientError> {
        let mut conn = self.connect().await?;
        match conn.request(Command::new("PING")).await? {
            Value::Simple(ref ack) if ack.eq_ignore_ascii_case(PONG) => Ok(()),
            other => Err(ClientError::UnexpectedReply {
                command: "PING",
                reply: other.to_string(),
            }),
        }
    }

    /// Pushes `value` onto the head of the list at `key`.
    ///
    /// The reply (the new list length) is discarded.
    pub async fn lpush(&self, key: &str, value: &[u8]) -> Result<(), ClientError> {
        let mut conn = self.connect().await?;
        conn.request(Command::new("LPUSH").arg(key).arg(value)).await?;
        Ok(())
    }

    /// Removes and returns the tail of the list at `key`, blocking until one
    /// is available.
    ///
    /// When `cancel` fires before a reply arrives the connection is dropped,
    /// which closes the socket and unblocks the pending read.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Cancelled`]: `cancel` fired first.
    /// - [`ClientError::UnexpectedReply`]: the reply was not a two-element
    ///   array of bulk strings.
    /// - Any connectivity or protocol error.
    pub async fn brpop(&self, key: &str, cancel: &CancellationToken) -> Result<Bytes, ClientError> {
        let mut conn = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            conn = self.connect() => conn?,
        };

        let command = Command::new("BRPOP").arg(key).arg(BLOCK_FOREVER);
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            reply = conn.request(command) => Some(reply),
        };

        let Some(reply) = outcome else {
            debug!(key, "blocking pop cancelled, closing connection");
            drop(conn);
            return Err(ClientError::Cancelled);
        };

        popped_payload(reply?)
    }

    async fn connect(&self) -> Result<Connection, ClientError> {
        match tokio::time::timeout(self.dial_timeout, TcpStream::connect(&self.addr)).await {
            Ok(Ok(stream)) => {
                trace!(address = %self.addr, "connected");
                Ok(Connection::new(stream))
            }
            Ok(Err(source)) => Err(ClientError::Connect {
                addr: self.addr.clone(),
                source,
            }),
            Err(_) => Err(ClientError::ConnectTimeout {
                addr: self.addr.clone(),
                timeout: self.dial_timeout,
            }),
        }
    }
}

/// Extracts the value from a `BRPOP` reply of the form `[key, value]`.
fn popped_payload(reply: Value) -> Result<Bytes, ClientError> {
    if let Value::Array(Some(items)) = &reply {
        if let [Value::Bulk(Some(_)), Value::Bulk(Some(payload))] = items.as_slice() {
            return Ok(payload.clone());
        }
    }
    Err(ClientError::UnexpectedReply {
        command: "BRPOP",
        reply: reply.to_string(),
    })
}

/// One request/reply exchange over a single TCP stream.
struct Connection {
    stream: TcpStream,
    buf: BytesMut,
}

impl Connection {
    fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            buf: BytesMut::with_capacity(INITIAL_BUF_SIZE),
        }
    }

    /// Writes `command` and reads one reply. Error replies become
    /// [`ClientError::Server`].
    async fn request(&mut self, command: Command) -> Result<Value, ClientError> {
        trace!(command = command.name(), "sending command");
        self.stream.write_all(&command.into_bytes()).await?;
        self.stream.flush().await?;

        match self.read_value().await? {
            Value::Error(message) => Err(ClientError::Server(message)),
            value => Ok(value),
        }
    }

    async fn read_value(&mut self) -> Result<Value, ClientError> {
        loop {
            match Value::parse(&self.buf) {
                Ok((value, consumed)) => {
                    let _ = self.buf.split_to(consumed);
                    return Ok(value);
                }
                Err(ProtocolError::Incomplete) => {}
                Err(e) => return Err(e.into()),
            }

            if self.stream.read_buf(&mut self.buf).await? == 0 {
                return Err(ClientError::Closed);
            }
        }
    }
}
