//! Cross-process fan-out.
//!
//! Several server processes can share one room namespace. Each room has
//! exactly one *owner* node, the process running its actor; the claim is
//! recorded on a [`FanoutBus`]. A player connected to any other node gets
//! a relay actor on that node, which forwards the player's commands to the
//! owner over the room's command topic and delivers the owner's events
//! from the room's event topic.
//!
//! Frames on the bus are encoded with the same [`JsonCodec`] the client
//! sockets use, so a relayed `ServerMessage` is exactly what a local
//! client would have received.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::sync::mpsc;
use wordfall_protocol::{
    Codec, JsonCodec, PlayerId, ProtocolError, Recipient, RoomCode, ServerMessage,
};

use crate::RoomError;

/// Identifies one server process on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named channel on the bus. Every room has one of each.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Owner to relays: events, replies, closure.
    Events(RoomCode),
    /// Relays to owner: player commands.
    Commands(RoomCode),
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Events(code) => write!(f, "room:{code}:events"),
            Self::Commands(code) => write!(f, "room:{code}:commands"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// The bus connection is gone. Callers degrade to local-only rooms.
    #[error("fan-out bus disconnected")]
    Disconnected,

    #[error("bus frame codec error: {0}")]
    Codec(#[from] ProtocolError),
}

/// Shared pub/sub plus room ownership records.
///
/// Methods are synchronous: publishing never waits on subscribers, and
/// subscriptions are unbounded queues so a slow relay can't stall the
/// owner's tick loop.
pub trait FanoutBus: Send + Sync + 'static {
    /// Records `node` as owner of `code`. Returns `false` if another node
    /// already owns it; claiming a code you already own succeeds.
    fn claim(&self, code: &RoomCode, node: &NodeId) -> Result<bool, BusError>;

    fn owner(&self, code: &RoomCode) -> Result<Option<NodeId>, BusError>;

    /// Drops the claim if `node` still holds it.
    fn release(&self, code: &RoomCode, node: &NodeId) -> Result<(), BusError>;

    fn publish(&self, topic: &Topic, payload: Vec<u8>) -> Result<(), BusError>;

    /// Subscribes to a topic. The receiver yields `None` once the bus
    /// disconnects.
    fn subscribe(&self, topic: &Topic) -> Result<mpsc::UnboundedReceiver<Vec<u8>>, BusError>;
}

pub type SharedBus = Arc<dyn FanoutBus>;

// ---------------------------------------------------------------------------
// MemoryBus
// ---------------------------------------------------------------------------

/// A bus shared by several registries inside one process.
///
/// Used for tests and for running several logical nodes side by side.
#[derive(Default)]
pub struct MemoryBus {
    owners: DashMap<RoomCode, NodeId>,
    topics: DashMap<Topic, Vec<mpsc::UnboundedSender<Vec<u8>>>>,
    severed: AtomicBool,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Simulates losing the bus: every subscription ends and every later
    /// call fails with [`BusError::Disconnected`].
    pub fn sever(&self) {
        self.severed.store(true, Ordering::SeqCst);
        self.topics.clear();
        self.owners.clear();
    }

    fn check(&self) -> Result<(), BusError> {
        if self.severed.load(Ordering::SeqCst) {
            Err(BusError::Disconnected)
        } else {
            Ok(())
        }
    }
}

impl FanoutBus for MemoryBus {
    fn claim(&self, code: &RoomCode, node: &NodeId) -> Result<bool, BusError> {
        self.check()?;
        match self.owners.entry(code.clone()) {
            Entry::Occupied(owner) => Ok(owner.get() == node),
            Entry::Vacant(slot) => {
                slot.insert(node.clone());
                Ok(true)
            }
        }
    }

    fn owner(&self, code: &RoomCode) -> Result<Option<NodeId>, BusError> {
        self.check()?;
        Ok(self.owners.get(code).map(|owner| owner.value().clone()))
    }

    fn release(&self, code: &RoomCode, node: &NodeId) -> Result<(), BusError> {
        self.check()?;
        self.owners.remove_if(code, |_, owner| owner == node);
        Ok(())
    }

    fn publish(&self, topic: &Topic, payload: Vec<u8>) -> Result<(), BusError> {
        self.check()?;
        if let Some(mut subscribers) = self.topics.get_mut(topic) {
            subscribers.retain(|tx| tx.send(payload.clone()).is_ok());
        }
        Ok(())
    }

    fn subscribe(&self, topic: &Topic) -> Result<mpsc::UnboundedReceiver<Vec<u8>>, BusError> {
        self.check()?;
        let (tx, rx) = mpsc::unbounded_channel();
        self.topics.entry(topic.clone()).or_default().push(tx);
        Ok(rx)
    }
}

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

/// What a player on a relay node asked the room to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub(crate) enum RelayedCommand {
    Join { name: String },
    Leave,
    Request { request: crate::RoomRequest },
}

/// Relay to owner, on [`Topic::Commands`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CommandFrame {
    pub origin: NodeId,
    /// Correlates the owner's [`EventFrame::Reply`]. Zero for commands
    /// that expect no reply.
    pub request: u64,
    pub player_id: PlayerId,
    pub command: RelayedCommand,
}

/// Owner to relays, on [`Topic::Events`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub(crate) enum EventFrame {
    Event {
        recipient: Recipient,
        message: ServerMessage,
    },
    Reply {
        origin: NodeId,
        request: u64,
        result: Result<(), RoomError>,
    },
    /// The owner is gone; relays must drop their players.
    Closed,
}

pub(crate) fn encode_frame<T: Serialize>(frame: &T) -> Result<Vec<u8>, BusError> {
    Ok(JsonCodec.encode(frame)?)
}

pub(crate) fn decode_frame<T: DeserializeOwned>(payload: &[u8]) -> Result<T, BusError> {
    Ok(JsonCodec.decode(payload)?)
}
