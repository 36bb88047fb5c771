//! # Wordfall
//!
//! Server-authoritative multiplayer word-typing game. Words fall down a
//! shared field; players race to type them before they hit the bottom.
//!
//! This crate is the server node: it accepts WebSocket connections,
//! speaks the JSON protocol from `wordfall-protocol`, and hands players to
//! the room engine in `wordfall-room`, where each room runs as its own
//! actor with a 20 Hz tick loop.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use clap::Parser;
//! use wordfall::Args;
//! use wordfall::prelude::*;
//!
//! # async fn run() -> Result<(), WordfallError> {
//! let server = WordfallServer::builder()
//!     .config(ServerConfig::from(Args::parse()))
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod config;
mod error;
mod handler;
mod server;

pub use config::{Args, ServerConfig};
pub use error::WordfallError;
pub use server::{PROTOCOL_VERSION, WordfallServer, WordfallServerBuilder};

/// The types needed to embed a server.
pub mod prelude {
    pub use crate::{PROTOCOL_VERSION, ServerConfig, WordfallError, WordfallServer, WordfallServerBuilder};
    pub use wordfall_protocol::{ClientMessage, Difficulty, Envelope, Mode, ServerMessage};
    pub use wordfall_room::{
        FileLeaderboard, LeaderboardSink, MemoryBus, MemoryLeaderboard, RoomConfig, SharedBus,
    };
}
