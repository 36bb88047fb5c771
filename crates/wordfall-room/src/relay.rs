//! Relay actor: stands in for a room owned by another node.
//!
//! It accepts the same [`RoomCommand`]s as a room actor, so the registry
//! and connection handlers can't tell the two apart. Commands are
//! forwarded to the owner's command topic; events from the owner's event
//! topic are validated and delivered to the local players they address.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use wordfall_protocol::{Difficulty, GameState, Mode, PlayerId, RoomCode, ServerMessage, Snapshot};

use crate::fanout::{
    BusError, CommandFrame, EventFrame, NodeId, RelayedCommand, SharedBus, Topic, decode_frame,
    encode_frame,
};
use crate::room::{PlayerSender, RoomCommand, RoomHandle, RoomInfo};
use crate::{RoomConfig, RoomError};

pub(crate) struct RelayParts {
    pub code: RoomCode,
    pub node: NodeId,
    pub bus: SharedBus,
    pub config: RoomConfig,
    pub closed: mpsc::UnboundedSender<RoomCode>,
}

enum Pending {
    /// A join in flight. The player's sender is already registered so
    /// the owner's join events aren't lost; it is removed on rejection.
    Join(PlayerId, oneshot::Sender<Result<(), RoomError>>),
    Request(oneshot::Sender<Result<(), RoomError>>),
}

impl Pending {
    fn into_reply(self) -> oneshot::Sender<Result<(), RoomError>> {
        match self {
            Self::Join(_, reply) | Self::Request(reply) => reply,
        }
    }
}

struct RelayActor {
    code: RoomCode,
    node: NodeId,
    bus: SharedBus,
    capacity: usize,
    receiver: mpsc::Receiver<RoomCommand>,
    events: mpsc::UnboundedReceiver<Vec<u8>>,
    senders: HashMap<PlayerId, PlayerSender>,
    pending: HashMap<u64, Pending>,
    next_request: u64,
    /// Latest snapshot seen from the owner; answers `GetInfo`.
    last: Option<Snapshot>,
    closed: mpsc::UnboundedSender<RoomCode>,
    /// The last local player left; the registry is removing this relay.
    closing: bool,
}

enum Exit {
    /// Shut down locally; tell the owner our players left.
    Shutdown,
    /// The owner closed the room or the bus went away.
    Orphaned,
}

impl RelayActor {
    async fn run(mut self) {
        info!(room = %self.code, node = %self.node, "relay started");

        let exit = loop {
            tokio::select! {
                cmd = self.receiver.recv() => match cmd {
                    Some(RoomCommand::Shutdown) | None => break Exit::Shutdown,
                    Some(cmd) => {
                        if self.handle_command(cmd).is_err() {
                            break Exit::Orphaned;
                        }
                    }
                },
                payload = self.events.recv() => match payload {
                    Some(payload) => {
                        if self.handle_event(&payload) {
                            break Exit::Orphaned;
                        }
                    }
                    None => {
                        warn!(room = %self.code, "fan-out bus lost, dropping relayed room");
                        break Exit::Orphaned;
                    }
                },
            }
        };

        match exit {
            Exit::Shutdown => {
                let players: Vec<PlayerId> = self.senders.keys().copied().collect();
                for player_id in players {
                    let _ = self.forward(player_id, 0, RelayedCommand::Leave);
                }
            }
            Exit::Orphaned => {
                let message = RoomError::Unavailable(self.code.clone()).to_message();
                for sender in self.senders.values() {
                    let _ = sender.send(message.clone());
                }
                for (_, pending) in self.pending.drain() {
                    let _ = pending
                        .into_reply()
                        .send(Err(RoomError::Unavailable(self.code.clone())));
                }
                let _ = self.closed.send(self.code.clone());
            }
        }
        info!(room = %self.code, "relay stopped");
    }

    fn handle_command(&mut self, cmd: RoomCommand) -> Result<(), BusError> {
        match cmd {
            RoomCommand::Join {
                player_id,
                name,
                sender,
                reply,
            } => {
                if self.closing {
                    let _ = reply.send(Err(RoomError::RoomNotFound(self.code.clone())));
                    return Ok(());
                }
                self.senders.insert(player_id, sender);
                let request = self.next_request();
                self.pending.insert(request, Pending::Join(player_id, reply));
                self.forward(player_id, request, RelayedCommand::Join { name })?;
            }
            RoomCommand::Leave { player_id, reply } => {
                self.senders.remove(&player_id);
                self.closing = self.senders.is_empty();
                let _ = reply.send(self.senders.len());
                self.forward(player_id, 0, RelayedCommand::Leave)?;
            }
            RoomCommand::Request {
                player_id,
                request,
                reply,
            } => {
                let id = match reply {
                    Some(reply) => {
                        let id = self.next_request();
                        self.pending.insert(id, Pending::Request(reply));
                        id
                    }
                    None => 0,
                };
                self.forward(player_id, id, RelayedCommand::Request { request })?;
            }
            RoomCommand::GetInfo { reply } => {
                let _ = reply.send(self.info());
            }
            RoomCommand::Shutdown => {}
        }
        Ok(())
    }

    fn next_request(&mut self) -> u64 {
        self.next_request += 1;
        self.next_request
    }

    fn forward(&self, player_id: PlayerId, request: u64, command: RelayedCommand) -> Result<(), BusError> {
        let frame = CommandFrame {
            origin: self.node.clone(),
            request,
            player_id,
            command,
        };
        let result = encode_frame(&frame)
            .and_then(|payload| self.bus.publish(&Topic::Commands(self.code.clone()), payload));
        match result {
            Err(BusError::Disconnected) => Err(BusError::Disconnected),
            Err(e) => {
                warn!(room = %self.code, %player_id, error = %e, "failed to forward command");
                Ok(())
            }
            Ok(()) => Ok(()),
        }
    }

    /// Returns `true` when the owner closed the room.
    fn handle_event(&mut self, payload: &[u8]) -> bool {
        let frame: EventFrame = match decode_frame(payload) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(room = %self.code, error = %e, "dropping undecodable event frame");
                return false;
            }
        };

        match frame {
            EventFrame::Event { recipient, message } => {
                if let ServerMessage::GameUpdate { snapshot } | ServerMessage::GameState { snapshot } =
                    &message
                {
                    if let Err(e) = snapshot.validate() {
                        warn!(room = %self.code, error = %e, "dropping invalid snapshot from owner");
                        return false;
                    }
                    self.last = Some(snapshot.clone());
                }
                for (player_id, sender) in &self.senders {
                    if recipient.includes(*player_id) {
                        let _ = sender.send(message.clone());
                    }
                }
            }
            EventFrame::Reply {
                origin,
                request,
                result,
            } => {
                if origin != self.node {
                    return false;
                }
                let Some(pending) = self.pending.remove(&request) else {
                    debug!(room = %self.code, request, "reply for unknown request");
                    return false;
                };
                if let (Pending::Join(player_id, _), Err(_)) = (&pending, &result) {
                    self.senders.remove(player_id);
                }
                let _ = pending.into_reply().send(result);
            }
            EventFrame::Closed => {
                info!(room = %self.code, "owner closed the room");
                return true;
            }
        }
        false
    }

    fn info(&self) -> RoomInfo {
        let (mode, difficulty, state, player_count) = match &self.last {
            Some(snapshot) => (
                snapshot.mode,
                snapshot.difficulty,
                snapshot.state,
                snapshot.players.len(),
            ),
            None => (
                Mode::default(),
                Difficulty::default(),
                GameState::default(),
                self.senders.len(),
            ),
        };
        RoomInfo {
            code: self.code.clone(),
            mode,
            difficulty,
            state,
            player_count,
            capacity: self.capacity,
            relayed: true,
        }
    }
}

/// Subscribes to the owner's events and spawns a relay for `code`.
pub(crate) fn spawn_relay(parts: RelayParts) -> Result<(RoomHandle, JoinHandle<()>), BusError> {
    let RelayParts {
        code,
        node,
        bus,
        config,
        closed,
    } = parts;
    let events = bus.subscribe(&Topic::Events(code.clone()))?;
    let (tx, rx) = mpsc::channel(config.channel_size.max(1));
    let handle = RoomHandle::new(code.clone(), tx, config.reply_timeout);

    let actor = RelayActor {
        code,
        node,
        bus,
        capacity: config.capacity,
        receiver: rx,
        events,
        senders: HashMap::new(),
        pending: HashMap::new(),
        next_request: 0,
        last: None,
        closed,
        closing: false,
    };

    Ok((handle, tokio::spawn(actor.run())))
}
