//! `WordfallServer` builder and accept loop.
//!
//! This is the entry point for running a Wordfall node. It ties the
//! layers together: transport → protocol → room registry, with the
//! leaderboard writer and the optional fan-out bus on the side.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;
use tokio::time::Instant;
use wordfall_protocol::JsonCodec;
use wordfall_room::{
    LeaderboardSink, LeaderboardWriter, MemoryLeaderboard, NodeId, PersistenceFailure, RoomConfig,
    RoomRegistry, SharedBus,
};
use wordfall_tick::SharedClock;
use wordfall_transport::{Transport, WebSocketTransport};

use crate::config::ServerConfig;
use crate::handler::handle_connection;
use crate::WordfallError;

/// The current protocol version. Clients must send this in their
/// handshake or be rejected.
pub const PROTOCOL_VERSION: u32 = 1;

/// Shared server state passed to each connection task.
pub(crate) struct ServerState<S> {
    pub(crate) rooms: RoomRegistry,
    pub(crate) leaderboard: Arc<S>,
    pub(crate) codec: JsonCodec,
    pub(crate) handshake_timeout: Duration,
    pub(crate) idle_timeout: Duration,
    started: Instant,
}

impl<S> ServerState<S> {
    /// Milliseconds since the server started. Used for envelope
    /// timestamps and `serverTime`.
    pub(crate) fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    pub(crate) fn started(&self) -> Instant {
        self.started
    }
}

/// Builder for configuring and starting a Wordfall server.
///
/// # Example
///
/// ```rust,no_run
/// use wordfall::prelude::*;
///
/// # async fn run() -> Result<(), WordfallError> {
/// let server = WordfallServer::builder()
///     .bind("0.0.0.0:3001")
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct WordfallServerBuilder<S = MemoryLeaderboard> {
    config: ServerConfig,
    leaderboard: Arc<S>,
    bus: Option<SharedBus>,
    clock: Option<SharedClock>,
}

impl WordfallServerBuilder {
    /// Default settings with an in-memory leaderboard.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            leaderboard: Arc::new(MemoryLeaderboard::new()),
            bus: None,
            clock: None,
        }
    }
}

impl Default for WordfallServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: LeaderboardSink> WordfallServerBuilder<S> {
    /// Replaces every setting at once, e.g. one built from parsed [`Args`](crate::Args).
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind = addr.to_string();
        self
    }

    pub fn room_config(mut self, room: RoomConfig) -> Self {
        self.config.room = room;
        self
    }

    /// Shares rooms with other nodes through `bus`. The node name comes
    /// from the config, or is generated when unset.
    pub fn bus(mut self, bus: SharedBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Overrides the clock every room ticks on.
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Where finished games are recorded.
    pub fn leaderboard<T: LeaderboardSink>(self, leaderboard: Arc<T>) -> WordfallServerBuilder<T> {
        WordfallServerBuilder {
            config: self.config,
            leaderboard,
            bus: self.bus,
            clock: self.clock,
        }
    }

    /// Binds the listener and starts the leaderboard writer.
    pub async fn build(self) -> Result<WordfallServer<S>, WordfallError> {
        let transport = WebSocketTransport::bind(self.config.bind.as_str()).await?;

        let writer = LeaderboardWriter::spawn(Arc::clone(&self.leaderboard), self.config.retry.clone());
        let mut rooms = RoomRegistry::new(self.config.room.clone()).with_leaderboard(writer.submitter());
        if let Some(clock) = self.clock {
            rooms = rooms.with_clock(clock);
        }
        if let Some(bus) = self.bus {
            let node = self.config.node.clone().unwrap_or_else(random_node_name);
            tracing::info!(%node, "joining fan-out bus");
            rooms = rooms.with_bus(bus, NodeId::new(node));
        } else if let Some(node) = &self.config.node {
            tracing::warn!(%node, "node name set without a fan-out bus, serving rooms locally");
        }

        let state = Arc::new(ServerState {
            rooms,
            leaderboard: self.leaderboard,
            codec: JsonCodec,
            handshake_timeout: self.config.handshake_timeout,
            idle_timeout: self.config.idle_timeout,
            started: Instant::now(),
        });

        Ok(WordfallServer {
            transport,
            state,
            writer,
        })
    }
}

fn random_node_name() -> String {
    format!("node-{:08x}", rand::rng().random::<u32>())
}

/// A bound Wordfall server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct WordfallServer<S = MemoryLeaderboard> {
    transport: WebSocketTransport,
    state: Arc<ServerState<S>>,
    writer: LeaderboardWriter,
}

impl WordfallServer {
    pub fn builder() -> WordfallServerBuilder {
        WordfallServerBuilder::new()
    }
}

impl<S: LeaderboardSink> WordfallServer<S> {
    /// The address actually bound; useful after binding port 0.
    pub fn local_addr(&self) -> Result<SocketAddr, WordfallError> {
        Ok(self.transport.local_addr()?)
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.state.rooms
    }

    /// Leaderboard entries the writer gave up on. Can be taken once;
    /// otherwise failures are only logged.
    pub fn take_persistence_failures(&mut self) -> Option<mpsc::UnboundedReceiver<PersistenceFailure>> {
        self.writer.take_failures()
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), WordfallError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `shutdown` resolves, then stops every
    /// room this node runs or relays.
    pub async fn run_until(mut self, shutdown: impl Future<Output = ()>) -> Result<(), WordfallError> {
        let mut shutdown = std::pin::pin!(shutdown);
        tracing::info!(node = %self.state.rooms.node(), "Wordfall server running");

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        let state = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(conn, state).await {
                                tracing::debug!(error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
            }
        }

        tracing::info!("shutting down");
        self.state.rooms.shutdown().await;
        Ok(())
    }
}
