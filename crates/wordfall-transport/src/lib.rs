//! Transport layer for Wordfall.
//!
//! A [`Transport`] accepts [`Connection`]s. A connection is immediately
//! [split](Connection::split) into a [`ConnectionSender`] and a
//! [`ConnectionReceiver`], so the handler can wait for client frames on
//! one task while room events are written from another, without any lock
//! held across a receive.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketReceiver, WebSocketSender, WebSocketTransport};

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Accepts new incoming connections.
pub trait Transport: Send + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;

    /// Waits for and accepts the next incoming connection.
    fn accept(&mut self) -> impl Future<Output = Result<Self::Connection, TransportError>> + Send;

    /// The address actually bound; useful after binding port 0.
    fn local_addr(&self) -> Result<SocketAddr, TransportError>;
}

/// A freshly accepted connection, before it is split.
pub trait Connection: Send + 'static {
    type Sender: ConnectionSender;
    type Receiver: ConnectionReceiver;

    fn id(&self) -> ConnectionId;

    fn peer_addr(&self) -> SocketAddr;

    fn split(self) -> (Self::Sender, Self::Receiver);
}

/// The write half of a connection.
pub trait ConnectionSender: Send + 'static {
    /// Sends one text frame.
    fn send_text(&mut self, text: String) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Sends a close frame. Further sends fail.
    fn close(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// The read half of a connection.
pub trait ConnectionReceiver: Send + 'static {
    /// Receives the next data frame, text or binary, as bytes.
    ///
    /// Returns `Ok(None)` when the peer closed the connection cleanly.
    fn recv(&mut self) -> impl Future<Output = Result<Option<Vec<u8>>, TransportError>> + Send;
}
