//! Process-level settings.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use wordfall_room::{RetryPolicy, RoomConfig};
use wordfall_tick::TickPolicy;

/// Command line of the `wordfall` binary. Every flag can also come from
/// its `WORDFALL_*` environment variable.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
pub struct Args {
    /// Address to listen on
    #[arg(short, long, env = "WORDFALL_BIND", default_value = ServerConfig::DEFAULT_BIND)]
    pub bind: String,

    /// Node name on the fan-out bus (random when unset)
    #[arg(short, long, env = "WORDFALL_NODE")]
    pub node: Option<String>,

    /// JSON file for top scores (kept in memory when unset)
    #[arg(short, long, env = "WORDFALL_LEADERBOARD")]
    pub leaderboard: Option<PathBuf>,

    /// Simulation rate in Hz
    #[arg(
        short,
        long,
        env = "WORDFALL_TICK_RATE",
        default_value_t = 20,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub tick_rate: u32,

    /// Replay up to this many late ticks instead of dropping them
    #[arg(long, env = "WORDFALL_MAX_CATCHUP", value_parser = clap::value_parser!(u32).range(1..))]
    pub max_catchup: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub node: Option<String>,
    pub leaderboard_path: Option<PathBuf>,
    pub room: RoomConfig,
    pub retry: RetryPolicy,
    /// How long a new connection has to send its handshake.
    pub handshake_timeout: Duration,
    /// Connections silent for longer than this are dropped. Clients
    /// heartbeat well inside it.
    pub idle_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: Self::DEFAULT_BIND.to_string(),
            node: None,
            leaderboard_path: None,
            room: RoomConfig::default(),
            retry: RetryPolicy::default(),
            handshake_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    pub const DEFAULT_BIND: &'static str = "0.0.0.0:3001";
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        let mut config = Self {
            bind: args.bind,
            node: args.node,
            leaderboard_path: args.leaderboard,
            ..Self::default()
        };
        config.room.tick_rate = args.tick_rate;
        if let Some(max_catchup) = args.max_catchup {
            config.room.tick_policy = TickPolicy::CatchUp { max_catchup };
        }
        config
    }
}
