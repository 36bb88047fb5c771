//! The Wordfall room simulation engine.
//!
//! Each room runs as an isolated Tokio task (actor model) that owns a
//! [`Game`]: its players, its falling words and its timers.
//!
//! # Key types
//!
//! - [`Game`]: the room state machine and per-tick simulation, with no I/O
//! - [`RoomRegistry`]: creates, finds and destroys rooms, routes players
//! - [`RoomHandle`]: send commands to a running room actor
//! - [`WordSpawner`], [`BotAgent`] and the [`scoring`] functions: the
//!   pieces `Game` is composed of
//! - [`LeaderboardWriter`]: background persistence of finished games
//! - [`FanoutBus`]: room ownership and event fan-out across processes

mod bot;
mod config;
mod error;
mod fanout;
mod game;
mod leaderboard;
mod registry;
mod relay;
mod room;
pub mod scoring;
mod spawner;

pub use bot::BotAgent;
pub use config::RoomConfig;
pub use error::RoomError;
pub use fanout::{BusError, FanoutBus, MemoryBus, NodeId, SharedBus, Topic};
pub use game::{Events, Game, RAMP_PERIOD, STARTING_LIVES, leaderboard_identity};
pub use leaderboard::{
    FileLeaderboard, LeaderboardError, LeaderboardSink, LeaderboardSubmitter, LeaderboardWriter,
    MemoryLeaderboard, PersistenceFailure, RetryPolicy,
};
pub use registry::{MAX_CODE_ATTEMPTS, RoomRegistry};
pub use room::{PlayerSender, RoomHandle, RoomInfo, RoomRequest};
pub use spawner::{SEED_WORDS, Word, WordSpawner, base_points, spawn_interval};
