//! The authoritative simulation of one room.
//!
//! [`Game`] is a plain value with no I/O and no timers: every method takes
//! the current input (a command, a tick's `dt`, a countdown step) and
//! returns the events to fan out as `(Recipient, ServerMessage)` pairs.
//! The room actor owns one and is the only thing that ever mutates it, so
//! every operation here runs to completion before the next one starts.

use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info};
use wordfall_protocol::{
    Claimant, Difficulty, GameState, LeaderboardEntry, MAX_RAMP, Mode, PlayerId,
    PlayerView, Recipient, RoomCode, SNAPSHOT_VERSION, ServerMessage, Snapshot, TeamId,
    TeamView, Winner, WordId, FIELD_BOTTOM,
};

use crate::bot::BotAgent;
use crate::scoring::{award_points, coop_winner, ffa_winner};
use crate::spawner::{Word, WordSpawner};
use crate::{RoomConfig, RoomError};

/// Lives shown on scoreboards. Nothing ever takes one away.
pub const STARTING_LIVES: u32 = 5;

/// Simulation time it takes the ramp to grow by 1.0.
pub const RAMP_PERIOD: Duration = Duration::from_secs(60);

/// Events produced by one game operation, in emission order.
pub type Events = Vec<(Recipient, ServerMessage)>;

#[derive(Debug, Clone)]
struct Player {
    id: PlayerId,
    name: String,
    score: u64,
    combo: u32,
    lives: u32,
}

impl Player {
    fn new(id: PlayerId, name: String) -> Self {
        Self {
            id,
            name,
            score: 0,
            combo: 0,
            lives: STARTING_LIVES,
        }
    }

    fn reset(&mut self) {
        self.score = 0;
        self.combo = 0;
        self.lives = STARTING_LIVES;
    }
}

/// One room's game: players, words, teams, clocks and the lifecycle state.
pub struct Game {
    code: RoomCode,
    mode: Mode,
    difficulty: Difficulty,
    state: GameState,
    capacity: usize,
    min_players: usize,
    duration: Duration,
    countdown_steps: u32,
    countdown: u32,
    /// Join order is significant: it breaks free-for-all ties.
    players: Vec<Player>,
    /// Spawn order is significant: the oldest match wins a claim.
    words: Vec<Word>,
    human_score: u64,
    bot_score: u64,
    elapsed: Duration,
    ramp: f64,
    winner: Option<Winner>,
    pending_entry: Option<LeaderboardEntry>,
    spawner: WordSpawner,
    bot: BotAgent,
    rng: StdRng,
}

impl Game {
    pub fn new(code: RoomCode, mode: Mode, difficulty: Difficulty, config: &RoomConfig) -> Self {
        Self::with_rng(code, mode, difficulty, config, StdRng::from_rng(&mut rand::rng()))
    }

    /// A game whose word stream and bot trials are reproducible.
    pub fn with_seed(
        code: RoomCode,
        mode: Mode,
        difficulty: Difficulty,
        config: &RoomConfig,
        seed: u64,
    ) -> Self {
        Self::with_rng(code, mode, difficulty, config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        code: RoomCode,
        mode: Mode,
        difficulty: Difficulty,
        config: &RoomConfig,
        rng: StdRng,
    ) -> Self {
        Self {
            code,
            mode,
            difficulty,
            state: GameState::Lobby,
            capacity: config.capacity,
            min_players: config.min_players.max(1),
            duration: config.game_duration,
            countdown_steps: config.countdown_steps,
            countdown: 0,
            players: Vec::new(),
            words: Vec::new(),
            human_score: 0,
            bot_score: 0,
            elapsed: Duration::ZERO,
            ramp: 0.0,
            winner: None,
            pending_entry: None,
            spawner: WordSpawner::new(),
            bot: BotAgent::for_difficulty(difficulty),
            rng,
        }
    }

    // -----------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------

    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    pub fn state(&self) -> GameState {
        self.state
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn contains(&self, player: PlayerId) -> bool {
        self.players.iter().any(|p| p.id == player)
    }

    pub fn winner(&self) -> Option<&Winner> {
        self.winner.as_ref()
    }

    /// The leaderboard entry earned by the last finished game, if any.
    /// Taken at most once.
    pub fn take_leaderboard_entry(&mut self) -> Option<LeaderboardEntry> {
        self.pending_entry.take()
    }

    // -----------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------

    /// Seats a player. Only possible in the lobby with a free seat.
    pub fn add_player(&mut self, id: PlayerId, name: String) -> Result<Events, RoomError> {
        if self.contains(id) {
            return Err(RoomError::AlreadyInRoom {
                player: id,
                room: self.code.clone(),
            });
        }
        if !self.state.is_joinable() {
            return Err(RoomError::GameInProgress(self.code.clone()));
        }
        if self.players.len() >= self.capacity {
            return Err(RoomError::RoomFull(self.code.clone()));
        }

        let player = Player::new(id, name);
        let view = self.player_view(&player);
        self.players.push(player);
        let players = self.player_views();

        debug!(room = %self.code, player_id = %id, players = players.len(), "player seated");

        Ok(vec![
            (
                Recipient::Player(id),
                ServerMessage::RoomJoined {
                    room: self.code.clone(),
                    player: view.clone(),
                    players: players.clone(),
                },
            ),
            (
                Recipient::AllExcept(id),
                ServerMessage::PlayerJoined {
                    player: view,
                    players,
                },
            ),
            (Recipient::All, self.state_message()),
        ])
    }

    /// Unseats a player in any state. `None` if they weren't seated.
    pub fn remove_player(&mut self, id: PlayerId) -> Option<Events> {
        let idx = self.players.iter().position(|p| p.id == id)?;
        self.players.remove(idx);
        debug!(room = %self.code, player_id = %id, players = self.players.len(), "player unseated");

        Some(vec![(
            Recipient::All,
            ServerMessage::PlayerLeft {
                player_id: id,
                players: self.player_views(),
            },
        )])
    }

    // -----------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------

    /// Lobby → Countdown.
    pub fn start(&mut self, requester: PlayerId) -> Result<Events, RoomError> {
        self.check_transition(GameState::Countdown)?;
        if !self.contains(requester) {
            return Err(RoomError::NotInRoom(requester));
        }
        if self.players.len() < self.min_players {
            return Err(RoomError::InvalidTransition {
                from: self.state,
                to: GameState::Countdown,
            });
        }

        self.state = GameState::Countdown;
        self.countdown = self.countdown_steps;
        info!(room = %self.code, player_id = %requester, "countdown started");

        let mut events = vec![(Recipient::All, self.state_message())];
        if self.countdown > 0 {
            events.push((
                Recipient::All,
                ServerMessage::Countdown {
                    count: self.countdown,
                },
            ));
        } else {
            events.extend(self.begin_playing());
        }
        Ok(events)
    }

    /// Applies one countdown step. Reaching zero starts the game.
    pub fn countdown_step(&mut self, remaining: u32) -> Events {
        if self.state != GameState::Countdown {
            return Vec::new();
        }
        self.countdown = remaining;
        if remaining > 0 {
            vec![(Recipient::All, ServerMessage::Countdown { count: remaining })]
        } else {
            self.begin_playing()
        }
    }

    /// Countdown → Playing: fresh scores, fresh field, three seeded words.
    fn begin_playing(&mut self) -> Events {
        self.state = GameState::Playing;
        self.countdown = 0;
        self.reset_round();
        self.spawner.reset_timer();
        let seeded = self.spawner.seed(&mut self.rng);
        self.words.extend(seeded);

        info!(
            room = %self.code,
            mode = %self.mode,
            difficulty = %self.difficulty,
            players = self.players.len(),
            "game started"
        );
        vec![(Recipient::All, self.state_message())]
    }

    /// GameOver → Lobby. Scores, combos and words are cleared.
    pub fn rematch(&mut self, requester: PlayerId) -> Result<Events, RoomError> {
        self.check_transition(GameState::Lobby)?;
        if !self.contains(requester) {
            return Err(RoomError::NotInRoom(requester));
        }

        self.state = GameState::Lobby;
        self.reset_round();
        info!(room = %self.code, player_id = %requester, "rematch requested");
        Ok(vec![(Recipient::All, self.state_message())])
    }

    fn check_transition(&self, to: GameState) -> Result<(), RoomError> {
        if self.state.can_transition_to(to) {
            Ok(())
        } else {
            Err(RoomError::InvalidTransition {
                from: self.state,
                to,
            })
        }
    }

    fn reset_round(&mut self) {
        for player in &mut self.players {
            player.reset();
        }
        self.words.clear();
        self.human_score = 0;
        self.bot_score = 0;
        self.elapsed = Duration::ZERO;
        self.ramp = 0.0;
        self.winner = None;
    }

    // -----------------------------------------------------------------
    // Simulation
    // -----------------------------------------------------------------

    /// Advances the simulation by one fixed step.
    ///
    /// Order within a tick: clock and ramp, spawn, fall and expire, bot
    /// trial, snapshot, and finally the end-of-game check.
    pub fn tick(&mut self, dt: Duration) -> Events {
        if self.state != GameState::Playing {
            return Vec::new();
        }
        let mut events = Vec::new();

        self.elapsed += dt;
        let ramp = (self.elapsed.as_secs_f64() / RAMP_PERIOD.as_secs_f64()).min(MAX_RAMP);
        self.ramp = self.ramp.max(ramp);

        if let Some(word) = self.spawner.advance(&mut self.rng, dt, self.ramp) {
            self.words.push(word);
        }

        self.advance_words(&mut events);

        if self.mode == Mode::Coop {
            self.bot_turn(&mut events);
        }

        events.push((
            Recipient::All,
            ServerMessage::GameUpdate {
                snapshot: self.snapshot(),
            },
        ));

        if self.elapsed >= self.duration {
            events.extend(self.finish());
        }
        events
    }

    fn advance_words(&mut self, events: &mut Events) {
        let mut missed = Vec::new();
        self.words.retain_mut(|word| {
            word.y += word.speed;
            if word.y >= FIELD_BOTTOM {
                missed.push((word.id, word.points));
                false
            } else {
                true
            }
        });

        for (word_id, points) in missed {
            match self.mode {
                Mode::Ffa => {
                    for player in &mut self.players {
                        player.combo = 0;
                    }
                }
                Mode::Coop => {
                    self.human_score = self.human_score.saturating_sub(u64::from(points));
                }
            }
            events.push((Recipient::All, ServerMessage::WordMissed { word_id }));
        }
    }

    fn bot_turn(&mut self, events: &mut Events) {
        let candidates: Vec<usize> = self
            .words
            .iter()
            .enumerate()
            .filter(|(_, w)| w.claimed_by.is_none())
            .map(|(idx, _)| idx)
            .collect();

        let Some(pick) = self.bot.attempt(&mut self.rng, candidates.len()) else {
            return;
        };
        let mut word = self.words.remove(candidates[pick]);
        word.claimed_by = Some(Claimant::Bot);
        self.bot_score += u64::from(word.points);

        debug!(room = %self.code, word_id = %word.id, points = word.points, "bot claimed word");
        events.push((
            Recipient::All,
            ServerMessage::WordClaimed {
                word_id: word.id,
                claimant: Claimant::Bot,
                points: word.points,
                combo: None,
                team: Some(TeamId::Bot),
            },
        ));
    }

    /// Validates a typed word against the live field.
    ///
    /// Submissions outside `Playing` or from strangers are dropped without
    /// a reply.
    pub fn handle_input(&mut self, id: PlayerId, submission: &str) -> Events {
        if self.state != GameState::Playing {
            return Vec::new();
        }
        let Some(pidx) = self.players.iter().position(|p| p.id == id) else {
            return Vec::new();
        };

        let typed = submission.trim();
        let hit = self
            .words
            .iter()
            .position(|w| w.claimed_by.is_none() && w.text.eq_ignore_ascii_case(typed));

        let Some(widx) = hit else {
            let player = &mut self.players[pidx];
            player.combo = 0;
            return vec![(
                Recipient::Player(id),
                ServerMessage::WrongWord { combo: player.combo },
            )];
        };

        // Removed in the same step that claims it: nobody else can see it.
        let mut word = self.words.remove(widx);
        word.claimed_by = Some(Claimant::Player(id));

        let player = &mut self.players[pidx];
        player.combo = player.combo.saturating_add(1);
        let points = award_points(word.points, player.combo);
        player.score += u64::from(points);
        let combo = player.combo;

        let team = match self.mode {
            Mode::Coop => {
                self.human_score += u64::from(points);
                Some(TeamId::Human)
            }
            Mode::Ffa => None,
        };

        debug!(room = %self.code, player_id = %id, word_id = %word.id, points, combo, "word claimed");
        vec![(
            Recipient::All,
            ServerMessage::WordClaimed {
                word_id: word.id,
                claimant: Claimant::Player(id),
                points,
                combo: Some(combo),
                team,
            },
        )]
    }

    /// Playing → GameOver: decide the winner and the leaderboard entry.
    fn finish(&mut self) -> Events {
        self.state = GameState::GameOver;
        self.words.clear();

        let mut ranked = self.player_views();
        // Stable: equal scores keep join order.
        ranked.sort_by(|a, b| b.score.cmp(&a.score));

        let scores: Vec<u64> = self.players.iter().map(|p| p.score).collect();
        let top = ffa_winner(&scores).map(|idx| &self.players[idx]);

        let (winner, human_side_won) = match self.mode {
            Mode::Coop => {
                let team = coop_winner(self.human_score, self.bot_score);
                (Some(Winner::Team { team }), team == TeamId::Human)
            }
            Mode::Ffa => {
                let winner = top.map(|p| Winner::Player {
                    player_id: p.id,
                    name: p.name.clone(),
                });
                (winner, true)
            }
        };

        self.pending_entry = match top {
            Some(p) if human_side_won && p.score > 0 => Some(LeaderboardEntry {
                identity: leaderboard_identity(&p.name, p.id),
                score: p.score,
            }),
            _ => None,
        };
        self.winner = winner.clone();

        info!(
            room = %self.code,
            winner = ?self.winner,
            human = self.human_score,
            bot = self.bot_score,
            "game over"
        );

        let mut events = Vec::new();
        if let Some(winner) = winner {
            events.push((
                Recipient::All,
                ServerMessage::GameOver {
                    players: ranked,
                    winner,
                },
            ));
        }
        events.push((Recipient::All, self.state_message()));
        events
    }

    // -----------------------------------------------------------------
    // Views
    // -----------------------------------------------------------------

    /// The complete current state.
    pub fn snapshot(&self) -> Snapshot {
        let teams = match self.mode {
            Mode::Coop => vec![
                TeamView {
                    id: TeamId::Human,
                    score: self.human_score,
                },
                TeamView {
                    id: TeamId::Bot,
                    score: self.bot_score,
                },
            ],
            Mode::Ffa => Vec::new(),
        };

        Snapshot {
            version: SNAPSHOT_VERSION,
            room: self.code.clone(),
            mode: self.mode,
            difficulty: self.difficulty,
            state: self.state,
            countdown: self.countdown,
            elapsed_ms: duration_ms(self.elapsed),
            time_remaining_ms: duration_ms(self.duration.saturating_sub(self.elapsed)),
            ramp: self.ramp,
            words: self.words.iter().map(Word::view).collect(),
            players: self.player_views(),
            teams,
            winner: self.winner.clone(),
        }
    }

    pub fn player_views(&self) -> Vec<PlayerView> {
        self.players.iter().map(|p| self.player_view(p)).collect()
    }

    fn player_view(&self, player: &Player) -> PlayerView {
        PlayerView {
            id: player.id,
            name: player.name.clone(),
            score: player.score,
            combo: player.combo,
            lives: player.lives,
            team: (self.mode == Mode::Coop).then_some(TeamId::Human),
        }
    }

    fn state_message(&self) -> ServerMessage {
        ServerMessage::GameState {
            snapshot: self.snapshot(),
        }
    }

    /// Ids of the live words, oldest first.
    pub fn word_ids(&self) -> Vec<WordId> {
        self.words.iter().map(|w| w.id).collect()
    }
}

/// `"<name>#<low 16 bits of the id in hex>"`, e.g. `"ada#002a"`.
pub fn leaderboard_identity(name: &str, id: PlayerId) -> String {
    format!("{name}#{:04x}", id.0 & 0xffff)
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
