//! Room configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use wordfall_tick::{TickConfig, TickPolicy};

/// Settings shared by every room a registry creates.
///
/// The defaults are the production rules: six seats, a 20 Hz tick, a
/// two-minute game and a three-second countdown. Tests shrink the timings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomConfig {
    /// Maximum players per room.
    pub capacity: usize,

    /// Minimum players required to start a game.
    pub min_players: usize,

    /// Simulation rate in Hz.
    pub tick_rate: u32,

    /// Whether late ticks are dropped or replayed.
    #[serde(skip)]
    pub tick_policy: TickPolicy,

    /// Length of the `Playing` phase, in simulation time.
    pub game_duration: Duration,

    /// Countdown starting value (3 means "3, 2, 1").
    pub countdown_steps: u32,

    /// Time between countdown steps.
    pub countdown_period: Duration,

    /// Bounded command channel size of each room actor.
    pub channel_size: usize,

    /// How long `remove` waits for an actor to stop before aborting it.
    pub shutdown_grace: Duration,

    /// How long a caller waits for a room (or a remote owner) to answer.
    pub reply_timeout: Duration,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            capacity: 6,
            min_players: 1,
            tick_rate: 20,
            tick_policy: TickPolicy::Skip,
            game_duration: Duration::from_secs(120),
            countdown_steps: 3,
            countdown_period: Duration::from_secs(1),
            channel_size: 64,
            shutdown_grace: Duration::from_secs(2),
            reply_timeout: Duration::from_secs(5),
        }
    }
}

impl RoomConfig {
    /// Scheduler settings for a room's tick loop.
    pub fn tick_config(&self) -> TickConfig {
        TickConfig {
            policy: self.tick_policy,
            ..TickConfig::with_rate(self.tick_rate)
        }
    }
}
