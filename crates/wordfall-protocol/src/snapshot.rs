//! The versioned full-state snapshot.
//!
//! A snapshot is the complete authoritative state of one room at one tick.
//! Rooms broadcast one every tick while playing (`gameUpdate`) and on every
//! discrete transition (`gameState`). Snapshots are never deltas: clients
//! keep whichever one they received last, because the transport makes no
//! ordering promise for the unreliable channel.
//!
//! Bumping [`SNAPSHOT_VERSION`] is required for any change to the shape
//! of these structs.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{
    Claimant, Difficulty, GameState, Mode, PlayerView, ProtocolError, RoomCode,
    TeamId, Tier, Winner, WordId,
};

/// Current snapshot schema version.
pub const SNAPSHOT_VERSION: u16 = 1;

/// Vertical coordinate of the expiry line. Words at or past it are gone.
pub const FIELD_BOTTOM: f64 = 100.0;

/// Upper bound of the difficulty ramp multiplier.
pub const MAX_RAMP: f64 = 2.0;

/// Public view of a live word.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordView {
    pub id: WordId,
    pub text: String,
    /// Horizontal position, percent of field width.
    pub x: f64,
    /// Vertical position: 0 is the top, [`FIELD_BOTTOM`] the expiry line.
    pub y: f64,
    /// Distance fallen per tick.
    pub speed: f64,
    pub points: u32,
    pub tier: Tier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_by: Option<Claimant>,
}

/// Aggregate score of a cooperative team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamView {
    pub id: TeamId,
    pub score: u64,
}

/// Complete state of a room, schema version [`SNAPSHOT_VERSION`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub version: u16,
    pub room: RoomCode,
    pub mode: Mode,
    pub difficulty: Difficulty,
    pub state: GameState,
    /// Remaining countdown steps; only meaningful in `Countdown`.
    pub countdown: u32,
    pub elapsed_ms: u64,
    pub time_remaining_ms: u64,
    pub ramp: f64,
    /// Live words, oldest first.
    pub words: Vec<WordView>,
    /// Players in join order.
    pub players: Vec<PlayerView>,
    /// Empty outside cooperative mode.
    pub teams: Vec<TeamView>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<Winner>,
}

impl Snapshot {
    /// A lobby snapshot with nobody in it. Handy as a starting point.
    pub fn empty(room: RoomCode) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            room,
            mode: Mode::default(),
            difficulty: Difficulty::default(),
            state: GameState::Lobby,
            countdown: 0,
            elapsed_ms: 0,
            time_remaining_ms: 0,
            ramp: 0.0,
            words: Vec::new(),
            players: Vec::new(),
            teams: Vec::new(),
            winner: None,
        }
    }

    /// Checks that a decoded snapshot is one this build can trust.
    ///
    /// Structural problems (missing fields, wrong types) are already
    /// rejected by serde. This catches values that parse but can't come
    /// from a correct room: out-of-range positions, duplicate word ids,
    /// teams in a free-for-all room, and so on.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(ProtocolError::UnsupportedVersion {
                found: self.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        if !self.ramp.is_finite() || !(0.0..=MAX_RAMP).contains(&self.ramp) {
            return Err(invalid(format!("ramp {} out of range", self.ramp)));
        }

        let mut seen = HashSet::with_capacity(self.words.len());
        for word in &self.words {
            if !seen.insert(word.id) {
                return Err(invalid(format!("duplicate word id {}", word.id)));
            }
            if !word.y.is_finite() || !(0.0..FIELD_BOTTOM).contains(&word.y) {
                return Err(invalid(format!(
                    "word {} has y {} outside the field",
                    word.id, word.y
                )));
            }
            if !word.x.is_finite() || !(0.0..=FIELD_BOTTOM).contains(&word.x) {
                return Err(invalid(format!(
                    "word {} has x {} outside the field",
                    word.id, word.x
                )));
            }
            if !word.speed.is_finite() || word.speed <= 0.0 {
                return Err(invalid(format!(
                    "word {} has non-positive speed",
                    word.id
                )));
            }
        }

        if self.mode == Mode::Ffa && !self.teams.is_empty() {
            return Err(invalid("teams present in a free-for-all room".into()));
        }
        if self.mode == Mode::Coop && self.players.iter().any(|p| p.team.is_none()) {
            return Err(invalid("cooperative player without a team".into()));
        }
        if self.winner.is_some() && self.state != GameState::GameOver {
            return Err(invalid(format!("winner set in state {}", self.state)));
        }
        Ok(())
    }
}

fn invalid(msg: String) -> ProtocolError {
    ProtocolError::InvalidMessage(msg)
}
