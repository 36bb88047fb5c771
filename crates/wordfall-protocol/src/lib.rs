//! Wire protocol for Wordfall.
//!
//! This crate defines the "language" that clients, servers, and peer
//! server processes speak:
//!
//! - **Types** ([`Envelope`], [`ClientMessage`], [`ServerMessage`], ids,
//!   room options): the messages that travel on the wire.
//! - **Snapshot** ([`Snapshot`]): the versioned full-state schema with
//!   boundary validation.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those messages are
//!   converted to/from bytes.
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope) → Room engine (commands/events)
//! ```
//!
//! The protocol layer knows nothing about sockets or rooms; it only knows
//! the shape of messages.

mod codec;
mod error;
mod snapshot;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use snapshot::{
    FIELD_BOTTOM, MAX_RAMP, SNAPSHOT_VERSION, Snapshot, TeamView, WordView,
};
pub use types::{
    Channel, Claimant, ClientMessage, Difficulty, Envelope, ErrorReason,
    GameState, LeaderboardEntry, Mode, PlayerId, PlayerView, Recipient, RoomCode,
    ServerMessage, TeamId, Tier, Winner, WordId,
};
