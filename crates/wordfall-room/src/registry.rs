//! Room registry: creates, tracks, and routes players to rooms.

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::PoisonError;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use wordfall_protocol::{Difficulty, Mode, PlayerId, RoomCode};
use wordfall_tick::{SharedClock, TokioClock};

use crate::fanout::{NodeId, SharedBus, Topic};
use crate::game::Game;
use crate::leaderboard::LeaderboardSubmitter;
use crate::relay::{RelayParts, spawn_relay};
use crate::room::{OwnerLink, RoomParts, spawn_room};
use crate::{PlayerSender, RoomConfig, RoomError, RoomHandle, RoomInfo, RoomRequest};

/// How many codes `create` draws before giving up.
pub const MAX_CODE_ATTEMPTS: usize = 32;

struct RoomEntry {
    handle: RoomHandle,
    task: JoinHandle<()>,
    relayed: bool,
}

/// Draws candidate room codes.
type CodeSource = Box<dyn FnMut() -> RoomCode + Send>;

enum Claim {
    Owned(OwnerLink),
    Taken,
    LocalOnly,
}

/// Every room this node runs or relays, and which room each player is in.
///
/// This is the entry point for room operations from the connection
/// handlers. Methods take `&self`; the maps sit behind async mutexes
/// that are only held for map reads and writes, never while waiting on
/// a room.
pub struct RoomRegistry {
    node: NodeId,
    node_tag: u64,
    config: RoomConfig,
    clock: SharedClock,
    bus: Option<SharedBus>,
    leaderboard: Option<LeaderboardSubmitter>,
    rooms: Mutex<HashMap<RoomCode, RoomEntry>>,
    /// A player can be in at most one room at a time.
    players: Mutex<HashMap<PlayerId, RoomCode>>,
    closed_tx: mpsc::UnboundedSender<RoomCode>,
    closed_rx: Mutex<mpsc::UnboundedReceiver<RoomCode>>,
    next_player: AtomicU64,
    codes: std::sync::Mutex<CodeSource>,
}

impl RoomRegistry {
    /// A local-only registry on the Tokio clock.
    pub fn new(config: RoomConfig) -> Self {
        let (closed_tx, closed_rx) = mpsc::unbounded_channel();
        let node = NodeId::new("local");
        let codes: CodeSource = Box::new(|| RoomCode::generate(&mut rand::rng()));
        Self {
            node_tag: node_tag(&node),
            node,
            config,
            clock: TokioClock::shared(),
            bus: None,
            leaderboard: None,
            rooms: Mutex::new(HashMap::new()),
            players: Mutex::new(HashMap::new()),
            closed_tx,
            closed_rx: Mutex::new(closed_rx),
            next_player: AtomicU64::new(1),
            codes: std::sync::Mutex::new(codes),
        }
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Shares the room namespace with other nodes on `bus`.
    pub fn with_bus(mut self, bus: SharedBus, node: NodeId) -> Self {
        self.node_tag = node_tag(&node);
        self.node = node;
        self.bus = Some(bus);
        self
    }

    /// Replaces the random room code generator.
    pub fn with_code_source(mut self, source: impl FnMut() -> RoomCode + Send + 'static) -> Self {
        let source: CodeSource = Box::new(source);
        self.codes = std::sync::Mutex::new(source);
        self
    }

    pub fn with_leaderboard(mut self, submitter: LeaderboardSubmitter) -> Self {
        self.leaderboard = Some(submitter);
        self
    }

    pub fn node(&self) -> &NodeId {
        &self.node
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    /// A fresh player id, unique across nodes with distinct names.
    pub fn allocate_player_id(&self) -> PlayerId {
        let n = self.next_player.fetch_add(1, Ordering::Relaxed);
        PlayerId(self.node_tag << 32 | (n & 0xffff_ffff))
    }

    /// Creates a room and returns its code.
    ///
    /// Codes colliding with a local room or owned by another node are
    /// redrawn, at most [`MAX_CODE_ATTEMPTS`] times.
    pub async fn create(&self, mode: Mode, difficulty: Difficulty) -> Result<RoomCode, RoomError> {
        self.reap().await;
        let mut rooms = self.rooms.lock().await;

        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let code = self.draw_code();
            if rooms.contains_key(&code) {
                debug!(%code, attempt, "room code collides locally");
                continue;
            }
            let link = match self.claim(&code) {
                Claim::Owned(link) => Some(link),
                Claim::LocalOnly => None,
                Claim::Taken => {
                    debug!(%code, attempt, "room code owned by another node");
                    continue;
                }
            };

            let game = Game::new(code.clone(), mode, difficulty, &self.config);
            let (handle, task) = spawn_room(RoomParts {
                game,
                config: self.config.clone(),
                clock: self.clock.clone(),
                link,
                leaderboard: self.leaderboard.clone(),
                closed: self.closed_tx.clone(),
            });
            rooms.insert(
                code.clone(),
                RoomEntry {
                    handle,
                    task,
                    relayed: false,
                },
            );
            info!(room = %code, %mode, %difficulty, rooms = rooms.len(), "room created");
            return Ok(code);
        }

        warn!(attempts = MAX_CODE_ATTEMPTS, "no free room code");
        Err(RoomError::NoFreeCode(MAX_CODE_ATTEMPTS))
    }

    fn draw_code(&self) -> RoomCode {
        let mut source = self.codes.lock().unwrap_or_else(PoisonError::into_inner);
        (*source)()
    }

    fn claim(&self, code: &RoomCode) -> Claim {
        let Some(bus) = &self.bus else {
            return Claim::LocalOnly;
        };
        match bus.claim(code, &self.node) {
            Ok(false) => Claim::Taken,
            Ok(true) => match bus.subscribe(&Topic::Commands(code.clone())) {
                Ok(commands) => Claim::Owned(OwnerLink {
                    bus: bus.clone(),
                    node: self.node.clone(),
                    commands,
                }),
                Err(e) => {
                    warn!(room = %code, error = %e, "fan-out bus unavailable, creating local-only room");
                    let _ = bus.release(code, &self.node);
                    Claim::LocalOnly
                }
            },
            Err(e) => {
                warn!(room = %code, error = %e, "fan-out bus unavailable, creating local-only room");
                Claim::LocalOnly
            }
        }
    }

    /// Seats `player` in room `code`.
    pub async fn join(
        &self,
        code: &RoomCode,
        player: PlayerId,
        name: String,
        sender: PlayerSender,
    ) -> Result<(), RoomError> {
        self.reap().await;
        if let Some(room) = self.players.lock().await.get(&player) {
            return Err(RoomError::AlreadyInRoom {
                player,
                room: room.clone(),
            });
        }

        let (handle, fresh_relay) = self.handle_for(code).await?;
        if let Err(e) = handle.join(player, name, sender).await {
            if fresh_relay {
                self.remove(code).await;
            }
            return Err(e);
        }

        // The room may have been removed while the join was in flight.
        let rooms = self.rooms.lock().await;
        if rooms.get(code).is_some_and(|entry| entry.handle.same_room(&handle)) {
            self.players.lock().await.insert(player, code.clone());
            return Ok(());
        }
        drop(rooms);
        debug!(room = %code, %player, "room went away during join");
        let _ = handle.leave(player).await;
        Err(RoomError::RoomNotFound(code.clone()))
    }

    /// Finds the local handle for `code`, spawning a relay when another
    /// node owns it. The flag is `true` for a relay spawned by this call.
    async fn handle_for(&self, code: &RoomCode) -> Result<(RoomHandle, bool), RoomError> {
        let mut rooms = self.rooms.lock().await;
        if let Some(entry) = rooms.get(code) {
            return Ok((entry.handle.clone(), false));
        }

        let not_found = || RoomError::RoomNotFound(code.clone());
        let bus = self.bus.as_ref().ok_or_else(not_found)?;
        let owner = match bus.owner(code) {
            Ok(Some(owner)) if owner != self.node => owner,
            Ok(_) => return Err(not_found()),
            Err(e) => {
                warn!(room = %code, error = %e, "fan-out bus unavailable, cannot look up remote room");
                return Err(not_found());
            }
        };

        let (handle, task) = spawn_relay(RelayParts {
            code: code.clone(),
            node: self.node.clone(),
            bus: bus.clone(),
            config: self.config.clone(),
            closed: self.closed_tx.clone(),
        })
        .map_err(|e| {
            warn!(room = %code, error = %e, "could not relay remote room");
            not_found()
        })?;
        info!(room = %code, %owner, "relaying remote room");
        rooms.insert(
            code.clone(),
            RoomEntry {
                handle: handle.clone(),
                task,
                relayed: true,
            },
        );
        Ok((handle, true))
    }

    /// Unseats `player`. Removes the room when they were the last one.
    /// Returns how many players remain.
    pub async fn leave(&self, player: PlayerId) -> Result<usize, RoomError> {
        self.reap().await;
        let code = self
            .players
            .lock()
            .await
            .remove(&player)
            .ok_or(RoomError::NotInRoom(player))?;

        let handle = self.rooms.lock().await.get(&code).map(|e| e.handle.clone());
        let Some(handle) = handle else {
            return Ok(0);
        };

        let remaining = match handle.leave(player).await {
            Ok(remaining) => remaining,
            Err(e) => {
                warn!(room = %code, %player, error = %e, "leave failed, discarding room");
                0
            }
        };
        if remaining == 0 {
            self.remove(&code).await;
        }
        Ok(remaining)
    }

    /// Routes a command to the player's room.
    pub async fn route(&self, player: PlayerId, request: RoomRequest) -> Result<(), RoomError> {
        let code = self
            .player_room(player)
            .await
            .ok_or(RoomError::NotInRoom(player))?;
        let handle = self
            .rooms
            .lock()
            .await
            .get(&code)
            .map(|e| e.handle.clone())
            .ok_or_else(|| RoomError::RoomNotFound(code.clone()))?;
        handle.request(player, request).await
    }

    /// Shuts a room down and waits for its actor to stop, aborting it
    /// after the grace period. Nothing is emitted once this returns.
    /// Returns `false` if there was no such room.
    pub async fn remove(&self, code: &RoomCode) -> bool {
        let Some(entry) = self.rooms.lock().await.remove(code) else {
            return false;
        };
        self.players.lock().await.retain(|_, room| room != code);

        let RoomEntry {
            handle,
            mut task,
            relayed,
        } = entry;
        let _ = handle.shutdown().await;
        if tokio::time::timeout(self.config.shutdown_grace, &mut task)
            .await
            .is_err()
        {
            warn!(room = %code, "room did not stop in time, aborting");
            task.abort();
            let _ = task.await;
        }
        info!(room = %code, relayed, "room removed");
        true
    }

    /// Removes every room. Used on server shutdown.
    pub async fn shutdown(&self) {
        for code in self.room_codes().await {
            self.remove(&code).await;
        }
    }

    pub async fn room_count(&self) -> usize {
        self.reap().await;
        self.rooms.lock().await.len()
    }

    pub async fn room_codes(&self) -> Vec<RoomCode> {
        self.reap().await;
        let mut codes: Vec<RoomCode> = self.rooms.lock().await.keys().cloned().collect();
        codes.sort();
        codes
    }

    pub async fn room_info(&self, code: &RoomCode) -> Result<RoomInfo, RoomError> {
        let handle = self
            .rooms
            .lock()
            .await
            .get(code)
            .map(|e| e.handle.clone())
            .ok_or_else(|| RoomError::RoomNotFound(code.clone()))?;
        handle.info().await
    }

    pub async fn player_room(&self, player: PlayerId) -> Option<RoomCode> {
        self.players.lock().await.get(&player).cloned()
    }

    /// Drops rooms whose actors stopped on their own: owners emptied by
    /// remote leaves, relays whose owner went away.
    async fn reap(&self) {
        let closed: Vec<RoomCode> = {
            let mut rx = self.closed_rx.lock().await;
            std::iter::from_fn(|| rx.try_recv().ok()).collect()
        };
        if closed.is_empty() {
            return;
        }

        let mut rooms = self.rooms.lock().await;
        let mut players = self.players.lock().await;
        for code in closed {
            if rooms.remove(&code).is_some() {
                players.retain(|_, room| *room != code);
                debug!(room = %code, "reaped stopped room");
            }
        }
    }
}

fn node_tag(node: &NodeId) -> u64 {
    let mut hasher = DefaultHasher::new();
    node.hash(&mut hasher);
    hasher.finish() & 0xffff
}
