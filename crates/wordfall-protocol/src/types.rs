//! Core protocol types for Wordfall's wire format.
//!
//! Every type in this module travels "on the wire": it gets serialized to
//! JSON, sent over a WebSocket (or a fan-out bus between server processes),
//! and deserialized on the other side. The room engine builds these values;
//! clients only ever read them.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{ProtocolError, Snapshot};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a connected player.
///
/// Newtype wrapper around `u64` so a `PlayerId` can never be confused with
/// a `WordId`. `#[serde(transparent)]` serializes it as the bare number.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

/// Identifier of a falling word. Unique within its room and never reused.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct WordId(pub u64);

impl fmt::Display for WordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "W-{}", self.0)
    }
}

/// The short public code players type to join a room, e.g. `"K3ZQ9A"`.
///
/// Codes are always [`RoomCode::LEN`] characters from `A-Z0-9`. Parsing is
/// forgiving about case and surrounding whitespace (players type these by
/// hand) but strict about everything else.
///
/// `#[serde(try_from = "String")]` routes deserialization through
/// [`RoomCode::parse`], so a malformed code is rejected at the boundary
/// instead of travelling into the registry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomCode(String);

impl RoomCode {
    /// Number of characters in a room code.
    pub const LEN: usize = 6;

    const ALPHABET: &'static [u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

    /// Draws a fresh random code. Collisions are possible; callers that
    /// need uniqueness must check and regenerate.
    pub fn generate<R: Rng>(rng: &mut R) -> Self {
        let code = (0..Self::LEN)
            .map(|_| {
                let idx = rng.random_range(0..Self::ALPHABET.len());
                Self::ALPHABET[idx] as char
            })
            .collect();
        Self(code)
    }

    /// Normalizes and validates user input into a room code.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let code = raw.trim().to_ascii_uppercase();
        if code.len() != Self::LEN {
            return Err(ProtocolError::InvalidMessage(format!(
                "room code must be {} characters, got {:?}",
                Self::LEN,
                raw
            )));
        }
        if !code.bytes().all(|b| Self::ALPHABET.contains(&b)) {
            return Err(ProtocolError::InvalidMessage(format!(
                "room code must be alphanumeric, got {raw:?}"
            )));
        }
        Ok(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RoomCode {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RoomCode {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RoomCode> for String {
    fn from(code: RoomCode) -> Self {
        code.0
    }
}

// ---------------------------------------------------------------------------
// Room options
// ---------------------------------------------------------------------------

/// How players compete inside a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Free-for-all: everyone for themselves, no teams, no bot.
    #[default]
    Ffa,
    /// Cooperative: all humans share a team against a simulated bot team.
    Coop,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ffa => f.write_str("ffa"),
            Self::Coop => f.write_str("coop"),
        }
    }
}

/// Room-wide difficulty setting. Drives the bot's aggressiveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Easy => f.write_str("easy"),
            Self::Medium => f.write_str("medium"),
            Self::Hard => f.write_str("hard"),
        }
    }
}

/// Difficulty bucket of a single word (its pool and base point value).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Easy,
    Medium,
    Hard,
}

/// Team identifiers. Teams only exist in cooperative rooms.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TeamId {
    Human,
    Bot,
}

// ---------------------------------------------------------------------------
// GameState: the room's lifecycle
// ---------------------------------------------------------------------------

/// The lifecycle state of a room's game.
///
/// The transitions form a fixed cycle:
///
/// ```text
/// Lobby → Countdown → Playing → GameOver
///   ↑                              │
///   └──────── requestRematch ──────┘
/// ```
///
/// - **Lobby**: accepting joins, waiting for someone to press start.
/// - **Countdown**: 3, 2, 1. Not cancellable, no joins.
/// - **Playing**: the tick loop is running and input is accepted.
/// - **GameOver**: final scores are frozen until a rematch.
///
/// Destroying a room is not a state: an empty room simply stops existing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameState {
    #[default]
    Lobby,
    Countdown,
    Playing,
    GameOver,
}

impl GameState {
    /// Returns `true` if new players may join.
    pub fn is_joinable(&self) -> bool {
        matches!(self, Self::Lobby)
    }

    /// Returns the single legal successor of this state.
    pub fn next(self) -> Self {
        match self {
            Self::Lobby => Self::Countdown,
            Self::Countdown => Self::Playing,
            Self::Playing => Self::GameOver,
            Self::GameOver => Self::Lobby,
        }
    }

    /// Returns `true` if transitioning to `target` is legal.
    pub fn can_transition_to(self, target: Self) -> bool {
        self.next() == target
    }
}

impl fmt::Display for GameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lobby => f.write_str("Lobby"),
            Self::Countdown => f.write_str("Countdown"),
            Self::Playing => f.write_str("Playing"),
            Self::GameOver => f.write_str("GameOver"),
        }
    }
}

// ---------------------------------------------------------------------------
// Recipient and Channel
// ---------------------------------------------------------------------------

/// Who should receive a server message.
///
/// The room engine returns `(Recipient, ServerMessage)` pairs; the room
/// actor (and, across processes, the relay) uses this to fan them out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Recipient {
    /// Every player in the room.
    All,
    /// One specific player.
    Player(PlayerId),
    /// Everyone except the given player.
    AllExcept(PlayerId),
}

impl Recipient {
    /// Returns `true` if `player` is addressed by this recipient.
    pub fn includes(&self, player: PlayerId) -> bool {
        match self {
            Self::All => true,
            Self::Player(p) => *p == player,
            Self::AllExcept(p) => *p != player,
        }
    }
}

/// The delivery guarantee requested for a message.
///
/// Snapshots are sent 20 times per second and each one supersedes the
/// last, so losing one is harmless; everything else must arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub enum Channel {
    #[default]
    ReliableOrdered,
    ReliableUnordered,
    Unreliable,
}

// ---------------------------------------------------------------------------
// Envelope: the top-level wire format
// ---------------------------------------------------------------------------

/// The top-level message wrapper. Every frame on the socket is one of these.
///
/// Generic over the payload so the same envelope carries [`ClientMessage`]
/// inbound and [`ServerMessage`] outbound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<P> {
    /// Per-direction sequence number.
    pub seq: u64,
    /// Milliseconds since the sender started.
    pub timestamp: u64,
    /// Delivery guarantee requested for this message.
    #[serde(default)]
    pub channel: Channel,
    pub payload: P,
}

// ---------------------------------------------------------------------------
// Views embedded in events
// ---------------------------------------------------------------------------

/// Who claimed a word: a human player or the cooperative-mode bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Claimant {
    Player(PlayerId),
    Bot,
}

impl fmt::Display for Claimant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Player(id) => write!(f, "{id}"),
            Self::Bot => f.write_str("bot-ai"),
        }
    }
}

/// Public view of a player, as shown on scoreboards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub id: PlayerId,
    pub name: String,
    pub score: u64,
    pub combo: u32,
    pub lives: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<TeamId>,
}

/// The decided winner of a finished game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Winner {
    /// Cooperative rooms are won by a team.
    Team { team: TeamId },
    /// Free-for-all rooms are won by a single player.
    Player { player_id: PlayerId, name: String },
}

/// One row of the global leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// Display name plus a short identity suffix, e.g. `"ada#002a"`.
    pub identity: String,
    pub score: u64,
}

/// Machine-readable category of an [`ServerMessage::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorReason {
    RoomNotFound,
    RoomFull,
    GameInProgress,
    InvalidTransition,
    AlreadyInRoom,
    NotInRoom,
    BadRequest,
    Unavailable,
}

// ---------------------------------------------------------------------------
// Client → Server
// ---------------------------------------------------------------------------

/// Commands a client can send.
///
/// `#[serde(tag = "type")]` produces internally tagged JSON, e.g.
/// `{ "type": "input", "word": "python" }`, which is pleasant to build
/// from JavaScript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// First message on every connection.
    Handshake { version: u32 },
    /// Keep-alive; echoed back with the server's clock.
    Heartbeat { client_time: u64 },
    /// Create a room and join it as its first player.
    CreateRoom {
        #[serde(default)]
        mode: Mode,
        #[serde(default)]
        difficulty: Difficulty,
        name: String,
    },
    /// Join an existing room by its public code.
    JoinRoom { room: String, name: String },
    /// Lobby → Countdown.
    StartGame,
    /// A typed word.
    Input { word: String },
    /// GameOver → Lobby.
    RequestRematch,
    /// Leave the current room without closing the connection.
    LeaveRoom,
    /// Read the global top scores.
    GetLeaderboard {
        #[serde(default)]
        limit: Option<usize>,
    },
    /// Polite goodbye; the connection is closed afterwards.
    Disconnect { reason: String },
}

// ---------------------------------------------------------------------------
// Server → Client
// ---------------------------------------------------------------------------

/// Events the server emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    HandshakeAck {
        player_id: PlayerId,
        server_time: u64,
    },
    HeartbeatAck {
        client_time: u64,
        server_time: u64,
    },
    RoomCreated {
        room: RoomCode,
    },
    /// Sent to the joining player only.
    RoomJoined {
        room: RoomCode,
        player: PlayerView,
        players: Vec<PlayerView>,
    },
    /// Sent to everyone already in the room.
    PlayerJoined {
        player: PlayerView,
        players: Vec<PlayerView>,
    },
    PlayerLeft {
        player_id: PlayerId,
        players: Vec<PlayerView>,
    },
    Error {
        code: u16,
        reason: ErrorReason,
        message: String,
    },
    /// Full-state snapshot, once per tick while playing.
    GameUpdate {
        snapshot: Snapshot,
    },
    /// Full-state snapshot on discrete transitions (join, start, end...).
    GameState {
        snapshot: Snapshot,
    },
    Countdown {
        count: u32,
    },
    WordClaimed {
        word_id: WordId,
        claimant: Claimant,
        points: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        combo: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        team: Option<TeamId>,
    },
    WordMissed {
        word_id: WordId,
    },
    /// Feedback to a player whose submission matched nothing.
    WrongWord {
        combo: u32,
    },
    GameOver {
        players: Vec<PlayerView>,
        winner: Winner,
    },
    Leaderboard {
        entries: Vec<LeaderboardEntry>,
    },
}

impl ServerMessage {
    /// The delivery channel this message should travel on.
    pub fn channel(&self) -> Channel {
        match self {
            Self::GameUpdate { .. } => Channel::Unreliable,
            _ => Channel::ReliableOrdered,
        }
    }

    /// Checks the embedded snapshot, if any, against the schema.
    ///
    /// Called wherever a message crosses a process boundary.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        match self {
            Self::GameUpdate { snapshot } | Self::GameState { snapshot } => {
                snapshot.validate()
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_generated_room_code_is_valid() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let code = RoomCode::generate(&mut rng);
            assert_eq!(code.as_str().len(), RoomCode::LEN);
            assert_eq!(RoomCode::parse(code.as_str()).unwrap(), code);
        }
    }

    #[test]
    fn test_room_code_parse_normalizes_case_and_whitespace() {
        let code = RoomCode::parse("  ab12cd ").unwrap();
        assert_eq!(code.as_str(), "AB12CD");
    }

    #[test]
    fn test_room_code_parse_rejects_bad_input() {
        assert!(RoomCode::parse("ABC").is_err());
        assert!(RoomCode::parse("ABCDEFG").is_err());
        assert!(RoomCode::parse("AB-12C").is_err());
    }

    #[test]
    fn test_room_code_deserialize_validates() {
        let ok: Result<RoomCode, _> = serde_json::from_str("\"xy99zz\"");
        assert_eq!(ok.unwrap().as_str(), "XY99ZZ");
        let bad: Result<RoomCode, _> = serde_json::from_str("\"nope\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_game_state_transitions_follow_cycle() {
        use GameState::*;
        assert!(Lobby.can_transition_to(Countdown));
        assert!(Countdown.can_transition_to(Playing));
        assert!(Playing.can_transition_to(GameOver));
        assert!(GameOver.can_transition_to(Lobby));

        assert!(!Lobby.can_transition_to(Playing));
        assert!(!Countdown.can_transition_to(Lobby));
        assert!(!Playing.can_transition_to(Lobby));
        assert!(!GameOver.can_transition_to(Countdown));
    }

    #[test]
    fn test_only_lobby_is_joinable() {
        assert!(GameState::Lobby.is_joinable());
        assert!(!GameState::Countdown.is_joinable());
        assert!(!GameState::Playing.is_joinable());
        assert!(!GameState::GameOver.is_joinable());
    }

    #[test]
    fn test_recipient_includes() {
        let a = PlayerId(1);
        let b = PlayerId(2);
        assert!(Recipient::All.includes(a));
        assert!(Recipient::Player(a).includes(a));
        assert!(!Recipient::Player(a).includes(b));
        assert!(!Recipient::AllExcept(a).includes(a));
        assert!(Recipient::AllExcept(a).includes(b));
    }

    #[test]
    fn test_client_message_json_shape() {
        let json = r#"{"type":"createRoom","mode":"coop","difficulty":"hard","name":"ada"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert_eq!(
            msg,
            ClientMessage::CreateRoom {
                mode: Mode::Coop,
                difficulty: Difficulty::Hard,
                name: "ada".into(),
            }
        );

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"startGame"}"#).unwrap();
        assert_eq!(msg, ClientMessage::StartGame);
    }

    #[test]
    fn test_word_claimed_omits_empty_optionals() {
        let msg = ServerMessage::WordClaimed {
            word_id: WordId(9),
            claimant: Claimant::Bot,
            points: 25,
            combo: None,
            team: Some(TeamId::Bot),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "wordClaimed");
        assert_eq!(json["wordId"], 9);
        assert_eq!(json["claimant"], "bot");
        assert_eq!(json["team"], "bot");
        assert!(json.get("combo").is_none());
    }

    #[test]
    fn test_snapshot_messages_are_unreliable_only_for_ticks() {
        let snap = Snapshot::empty(RoomCode::parse("AAAAAA").unwrap());
        let update = ServerMessage::GameUpdate { snapshot: snap.clone() };
        let state = ServerMessage::GameState { snapshot: snap };
        assert_eq!(update.channel(), Channel::Unreliable);
        assert_eq!(state.channel(), Channel::ReliableOrdered);
    }
}
