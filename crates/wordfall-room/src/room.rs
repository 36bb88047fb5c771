//! Room actor: an isolated Tokio task that owns one [`Game`].
//!
//! Each room runs in its own task and talks to the outside world through
//! a bounded mpsc channel, so every mutation of a room is serialized. The
//! actor also owns the room's timers: a [`Countdown`] while counting down
//! and a [`TickScheduler`] while playing. Both are held as `Option`s and
//! dropped on every exit from their state, including actor shutdown.
//!
//! When the room is published on a fan-out bus, the actor additionally
//! consumes commands relayed from other nodes and republishes its events
//! for their players.

use std::collections::{HashMap, HashSet};
use std::future::pending;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use wordfall_protocol::{
    Difficulty, GameState, Mode, PlayerId, Recipient, RoomCode, ServerMessage,
};
use wordfall_tick::{Countdown, SharedClock, TickInfo, TickScheduler};

use crate::fanout::{
    BusError, CommandFrame, EventFrame, NodeId, RelayedCommand, SharedBus, Topic, decode_frame,
    encode_frame,
};
use crate::game::{Events, Game};
use crate::leaderboard::LeaderboardSubmitter;
use crate::{RoomConfig, RoomError};

/// Channel that delivers server messages to one player's connection.
pub type PlayerSender = mpsc::UnboundedSender<ServerMessage>;

/// A player command routed to the room they sit in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "request", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RoomRequest {
    StartGame,
    Input { word: String },
    RequestRematch,
}

/// Commands sent to a room actor (or a relay standing in for one).
///
/// The `oneshot::Sender`s are reply channels: the caller sends a command
/// and waits for the answer on that channel.
pub(crate) enum RoomCommand {
    Join {
        player_id: PlayerId,
        name: String,
        sender: PlayerSender,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },

    /// Replies with the number of players still seated.
    Leave {
        player_id: PlayerId,
        reply: oneshot::Sender<usize>,
    },

    /// `reply` is `None` for fire-and-forget input.
    Request {
        player_id: PlayerId,
        request: RoomRequest,
        reply: Option<oneshot::Sender<Result<(), RoomError>>>,
    },

    GetInfo {
        reply: oneshot::Sender<RoomInfo>,
    },

    Shutdown,
}

/// Room metadata (not the game state itself).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    pub code: RoomCode,
    pub mode: Mode,
    pub difficulty: Difficulty,
    pub state: GameState,
    pub player_count: usize,
    pub capacity: usize,
    /// `true` when another node owns the room and this one relays it.
    pub relayed: bool,
}

/// Handle to a running room actor.
///
/// Cheap to clone; it's an `mpsc::Sender` wrapper. Every call gives up
/// after the configured reply timeout and reports the room as
/// [`RoomError::Unavailable`].
#[derive(Clone)]
pub struct RoomHandle {
    code: RoomCode,
    sender: mpsc::Sender<RoomCommand>,
    reply_timeout: Duration,
}

impl RoomHandle {
    pub(crate) fn new(code: RoomCode, sender: mpsc::Sender<RoomCommand>, reply_timeout: Duration) -> Self {
        Self {
            code,
            sender,
            reply_timeout,
        }
    }

    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    /// `true` if both handles reach the same actor.
    pub fn same_room(&self, other: &RoomHandle) -> bool {
        self.sender.same_channel(&other.sender)
    }

    fn unavailable(&self) -> RoomError {
        RoomError::Unavailable(self.code.clone())
    }

    async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> RoomCommand,
    ) -> Result<T, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(build(reply_tx))
            .await
            .map_err(|_| self.unavailable())?;
        match tokio::time::timeout(self.reply_timeout, reply_rx).await {
            Ok(Ok(value)) => Ok(value),
            _ => Err(self.unavailable()),
        }
    }

    pub async fn join(
        &self,
        player_id: PlayerId,
        name: String,
        sender: PlayerSender,
    ) -> Result<(), RoomError> {
        self.call(|reply| RoomCommand::Join {
            player_id,
            name,
            sender,
            reply,
        })
        .await?
    }

    /// Returns how many players remain.
    pub async fn leave(&self, player_id: PlayerId) -> Result<usize, RoomError> {
        self.call(|reply| RoomCommand::Leave { player_id, reply }).await
    }

    /// Routes a player command. Input is fire-and-forget; the other
    /// requests wait for the room's verdict.
    pub async fn request(&self, player_id: PlayerId, request: RoomRequest) -> Result<(), RoomError> {
        if let RoomRequest::Input { .. } = request {
            return self
                .sender
                .send(RoomCommand::Request {
                    player_id,
                    request,
                    reply: None,
                })
                .await
                .map_err(|_| self.unavailable());
        }
        self.call(|reply| RoomCommand::Request {
            player_id,
            request,
            reply: Some(reply),
        })
        .await?
    }

    pub async fn info(&self) -> Result<RoomInfo, RoomError> {
        self.call(|reply| RoomCommand::GetInfo { reply }).await
    }

    /// Tells the room to stop. Doesn't wait for it.
    pub async fn shutdown(&self) -> Result<(), RoomError> {
        self.sender
            .send(RoomCommand::Shutdown)
            .await
            .map_err(|_| self.unavailable())
    }
}

/// The bus side of a room this node owns.
pub(crate) struct OwnerLink {
    pub bus: SharedBus,
    pub node: NodeId,
    pub commands: mpsc::UnboundedReceiver<Vec<u8>>,
}

/// Everything a room actor is built from.
pub(crate) struct RoomParts {
    pub game: Game,
    pub config: RoomConfig,
    pub clock: SharedClock,
    pub link: Option<OwnerLink>,
    pub leaderboard: Option<LeaderboardSubmitter>,
    /// Where the actor reports that it stopped on its own.
    pub closed: mpsc::UnboundedSender<RoomCode>,
}

enum Delivery {
    Local(PlayerSender),
    Remote,
}

/// The internal actor state. Runs inside a Tokio task.
struct RoomActor {
    game: Game,
    config: RoomConfig,
    clock: SharedClock,
    senders: HashMap<PlayerId, PlayerSender>,
    /// Players seated through a relay on another node.
    remote: HashSet<PlayerId>,
    countdown: Option<Countdown>,
    scheduler: Option<TickScheduler>,
    receiver: mpsc::Receiver<RoomCommand>,
    link: Option<OwnerLink>,
    leaderboard: Option<LeaderboardSubmitter>,
    closed: mpsc::UnboundedSender<RoomCode>,
    /// Set when the room emptied without the registry asking.
    abandoned: bool,
    /// Set when a local leave emptied the room. The registry is removing
    /// it, so late joins are refused.
    closing: bool,
}

impl RoomActor {
    async fn run(mut self) {
        info!(room = %self.game.code(), mode = %self.game.mode(), "room actor started");

        loop {
            tokio::select! {
                cmd = self.receiver.recv() => match cmd {
                    Some(RoomCommand::Shutdown) | None => {
                        info!(room = %self.game.code(), "room shutting down");
                        break;
                    }
                    Some(cmd) => self.handle_command(cmd),
                },
                payload = next_relayed(&mut self.link) => match payload {
                    Some(payload) => self.handle_relayed(&payload),
                    None => self.lose_bus(),
                },
                remaining = next_step(&mut self.countdown) => self.on_countdown(remaining),
                tick = next_tick(&mut self.scheduler) => self.on_tick(tick),
            }

            if self.abandoned {
                info!(room = %self.game.code(), "last remote player left, closing room");
                let _ = self.closed.send(self.game.code().clone());
                break;
            }
        }

        self.close();
    }

    fn handle_command(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::Join {
                player_id,
                name,
                sender,
                reply,
            } => {
                let result = self.join(player_id, name, Delivery::Local(sender));
                let _ = reply.send(result);
            }
            RoomCommand::Leave { player_id, reply } => {
                self.leave(player_id);
                let remaining = self.game.player_count();
                if remaining == 0 {
                    self.closing = true;
                }
                let _ = reply.send(remaining);
            }
            RoomCommand::Request {
                player_id,
                request,
                reply,
            } => {
                let result = self.handle_request(player_id, request);
                match reply {
                    Some(reply) => {
                        let _ = reply.send(result);
                    }
                    None => {
                        if let Err(e) = result {
                            self.send_to(player_id, e.to_message());
                        }
                    }
                }
            }
            RoomCommand::GetInfo { reply } => {
                let _ = reply.send(self.info());
            }
            RoomCommand::Shutdown => {}
        }
    }

    fn join(&mut self, player_id: PlayerId, name: String, delivery: Delivery) -> Result<(), RoomError> {
        if self.closing {
            return Err(RoomError::RoomNotFound(self.game.code().clone()));
        }
        let events = self.game.add_player(player_id, name)?;
        match delivery {
            Delivery::Local(sender) => {
                self.senders.insert(player_id, sender);
            }
            Delivery::Remote => {
                self.remote.insert(player_id);
            }
        }
        info!(
            room = %self.game.code(),
            %player_id,
            players = self.game.player_count(),
            remote = self.remote.contains(&player_id),
            "player joined"
        );
        self.dispatch(events);
        Ok(())
    }

    fn leave(&mut self, player_id: PlayerId) {
        self.senders.remove(&player_id);
        self.remote.remove(&player_id);
        if let Some(events) = self.game.remove_player(player_id) {
            info!(
                room = %self.game.code(),
                %player_id,
                players = self.game.player_count(),
                "player left"
            );
            self.dispatch(events);
        }
    }

    fn handle_request(&mut self, player_id: PlayerId, request: RoomRequest) -> Result<(), RoomError> {
        match request {
            RoomRequest::StartGame => {
                let events = self.game.start(player_id)?;
                self.sync_timers();
                self.dispatch(events);
            }
            RoomRequest::Input { word } => {
                let events = self.game.handle_input(player_id, &word);
                self.dispatch(events);
            }
            RoomRequest::RequestRematch => {
                let events = self.game.rematch(player_id)?;
                self.dispatch(events);
            }
        }
        Ok(())
    }

    /// Makes the timers match the game state: a countdown only while
    /// counting down, a scheduler only while playing.
    fn sync_timers(&mut self) {
        match self.game.state() {
            GameState::Countdown => {
                if self.countdown.is_none() {
                    self.countdown = Some(Countdown::new(
                        self.clock.clone(),
                        self.config.countdown_steps,
                        self.config.countdown_period,
                    ));
                }
                self.scheduler = None;
            }
            GameState::Playing => {
                self.countdown = None;
                if self.scheduler.is_none() {
                    self.scheduler = Some(TickScheduler::new(
                        self.config.tick_config(),
                        self.clock.clone(),
                    ));
                }
            }
            GameState::Lobby | GameState::GameOver => {
                self.countdown = None;
                self.scheduler = None;
            }
        }
    }

    fn on_countdown(&mut self, remaining: u32) {
        debug!(room = %self.game.code(), remaining, "countdown step");
        let events = self.game.countdown_step(remaining);
        self.sync_timers();
        self.dispatch(events);
    }

    fn on_tick(&mut self, tick: TickInfo) {
        let events = self.game.tick(tick.dt);
        self.dispatch(events);
        if let Some(scheduler) = self.scheduler.as_mut() {
            scheduler.record_tick_end();
        }

        if self.game.state() != GameState::Playing {
            if let Some(scheduler) = &self.scheduler {
                let metrics = scheduler.metrics();
                info!(
                    room = %self.game.code(),
                    ticks = metrics.total_ticks,
                    overruns = metrics.total_overruns,
                    max_tick_us = metrics.max_tick_time.as_micros() as u64,
                    "game over"
                );
            }
            self.sync_timers();
            self.submit_result();
        }
    }

    fn submit_result(&mut self) {
        let Some(entry) = self.game.take_leaderboard_entry() else {
            return;
        };
        match &self.leaderboard {
            Some(board) => {
                board.submit(entry);
            }
            None => debug!(room = %self.game.code(), identity = %entry.identity, "no leaderboard configured"),
        }
    }

    // -----------------------------------------------------------------
    // Relayed commands
    // -----------------------------------------------------------------

    fn handle_relayed(&mut self, payload: &[u8]) {
        let frame: CommandFrame = match decode_frame(payload) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(room = %self.game.code(), error = %e, "dropping undecodable command frame");
                return;
            }
        };
        let CommandFrame {
            origin,
            request,
            player_id,
            command,
        } = frame;
        debug!(room = %self.game.code(), %origin, %player_id, ?command, "relayed command");

        let result = match command {
            RelayedCommand::Join { name } => self.join(player_id, name, Delivery::Remote),
            RelayedCommand::Leave if self.remote.contains(&player_id) => {
                self.leave(player_id);
                if self.game.player_count() == 0 {
                    self.abandoned = true;
                }
                Ok(())
            }
            RelayedCommand::Request { request } if self.remote.contains(&player_id) => {
                self.handle_request(player_id, request)
            }
            RelayedCommand::Leave | RelayedCommand::Request { .. } => {
                Err(RoomError::NotInRoom(player_id))
            }
        };

        if request != 0 {
            self.publish(&EventFrame::Reply {
                origin,
                request,
                result,
            });
        } else if let Err(e) = result {
            self.publish(&EventFrame::Event {
                recipient: Recipient::Player(player_id),
                message: e.to_message(),
            });
        }
    }

    /// The bus is gone: keep serving local players, drop the remote ones.
    fn lose_bus(&mut self) {
        warn!(room = %self.game.code(), "fan-out bus lost, room is now local-only");
        self.link = None;
        let stranded: Vec<PlayerId> = self.remote.drain().collect();
        for player_id in stranded {
            if let Some(events) = self.game.remove_player(player_id) {
                self.dispatch(events);
            }
        }
        if self.game.player_count() == 0 {
            self.abandoned = true;
        }
    }

    fn publish(&mut self, frame: &EventFrame) {
        let Some(link) = &self.link else {
            return;
        };
        let result = encode_frame(frame)
            .and_then(|payload| link.bus.publish(&Topic::Events(self.game.code().clone()), payload));
        match result {
            Ok(()) => {}
            Err(BusError::Disconnected) => self.lose_bus(),
            Err(e) => warn!(room = %self.game.code(), error = %e, "failed to publish event frame"),
        }
    }

    // -----------------------------------------------------------------
    // Delivery
    // -----------------------------------------------------------------

    /// Sends each event to the local players it addresses, and onto the
    /// bus when any player is seated remotely.
    fn dispatch(&mut self, events: Events) {
        for (recipient, message) in events {
            for (player_id, sender) in &self.senders {
                if recipient.includes(*player_id) {
                    // A closed receiver means the player is disconnecting;
                    // their leave is already on its way.
                    let _ = sender.send(message.clone());
                }
            }
            if !self.remote.is_empty() {
                self.publish(&EventFrame::Event { recipient, message });
            }
        }
    }

    fn send_to(&self, player_id: PlayerId, message: ServerMessage) {
        if let Some(sender) = self.senders.get(&player_id) {
            let _ = sender.send(message);
        }
    }

    fn info(&self) -> RoomInfo {
        RoomInfo {
            code: self.game.code().clone(),
            mode: self.game.mode(),
            difficulty: self.game.difficulty(),
            state: self.game.state(),
            player_count: self.game.player_count(),
            capacity: self.config.capacity,
            relayed: false,
        }
    }

    fn close(&mut self) {
        self.countdown = None;
        self.scheduler = None;
        if let Some(link) = self.link.take() {
            let code = self.game.code().clone();
            let published = encode_frame(&EventFrame::Closed)
                .and_then(|payload| link.bus.publish(&Topic::Events(code.clone()), payload));
            if let Err(e) = published {
                debug!(room = %code, error = %e, "could not announce room closure");
            }
            if let Err(e) = link.bus.release(&code, &link.node) {
                debug!(room = %code, error = %e, "could not release room on the bus");
            }
        }
        info!(room = %self.game.code(), "room actor stopped");
    }
}

async fn next_relayed(link: &mut Option<OwnerLink>) -> Option<Vec<u8>> {
    match link {
        Some(link) => link.commands.recv().await,
        None => pending().await,
    }
}

async fn next_step(countdown: &mut Option<Countdown>) -> u32 {
    match countdown {
        Some(countdown) => countdown.next_step().await,
        None => pending().await,
    }
}

async fn next_tick(scheduler: &mut Option<TickScheduler>) -> TickInfo {
    match scheduler {
        Some(scheduler) => scheduler.wait_for_tick().await,
        None => pending().await,
    }
}

/// Spawns a room actor and returns a handle plus its task.
///
/// The channel is bounded by `config.channel_size`; when it fills up,
/// senders wait.
pub(crate) fn spawn_room(parts: RoomParts) -> (RoomHandle, JoinHandle<()>) {
    let RoomParts {
        game,
        config,
        clock,
        link,
        leaderboard,
        closed,
    } = parts;
    let (tx, rx) = mpsc::channel(config.channel_size.max(1));
    let handle = RoomHandle::new(game.code().clone(), tx, config.reply_timeout);

    let actor = RoomActor {
        game,
        config,
        clock,
        senders: HashMap::new(),
        remote: HashSet::new(),
        countdown: None,
        scheduler: None,
        receiver: rx,
        link,
        leaderboard,
        closed,
        abandoned: false,
        closing: false,
    };

    (handle, tokio::spawn(actor.run()))
}
