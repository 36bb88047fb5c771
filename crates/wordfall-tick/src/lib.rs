//! Timing primitives for Wordfall rooms.
//!
//! - [`Clock`]: the injectable time source ([`TokioClock`], [`ManualClock`]).
//! - [`TickScheduler`]: fixed-timestep tick loop with overrun handling and
//!   budget logging.
//! - [`Countdown`]: the pre-game 3, 2, 1 sub-timer.
//!
//! # Integration
//!
//! Both timers sit inside a room actor's `tokio::select!` loop and are
//! owned as `Option`s, so dropping one is how it gets cancelled:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* handle commands */ }
//!         step = next_countdown(&mut countdown) => { /* 2, 1, go */ }
//!         info = next_tick(&mut scheduler) => {
//!             game.tick(info.dt);
//!             scheduler.record_tick_end();
//!         }
//!     }
//! }
//! ```

mod clock;
mod countdown;
mod scheduler;

pub use clock::{Clock, ManualClock, SharedClock, TokioClock};
pub use countdown::Countdown;
pub use scheduler::{TickConfig, TickInfo, TickMetrics, TickPolicy, TickScheduler};
