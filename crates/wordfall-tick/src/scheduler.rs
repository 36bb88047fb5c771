use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::SharedClock;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What to do when a tick wakes up late.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TickPolicy {
    /// Forget the missed ticks and schedule the next one from now.
    /// Game time then runs slightly slower than wall time under load.
    #[default]
    Skip,
    /// Fire missed ticks back to back, at most `max_catchup` of them,
    /// so game time keeps pace with wall time.
    CatchUp { max_catchup: u32 },
}

/// Configuration for a [`TickScheduler`].
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Tick rate in Hz. Clamped to `1..=MAX_TICK_RATE_HZ`.
    pub tick_rate_hz: u32,
    pub policy: TickPolicy,
    /// Fraction of the tick budget (0.0–1.0) at which a slow tick is logged.
    pub budget_warn_threshold: f64,
    /// Random delay (0–max µs) added to the first tick so rooms started
    /// in the same instant don't all tick together.
    pub initial_jitter_us: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 20,
            policy: TickPolicy::default(),
            budget_warn_threshold: 0.80,
            initial_jitter_us: 2_000,
        }
    }
}

impl TickConfig {
    pub const MAX_TICK_RATE_HZ: u32 = 128;

    pub fn with_rate(tick_rate_hz: u32) -> Self {
        Self {
            tick_rate_hz,
            ..Default::default()
        }
    }

    /// Clamps out-of-range values. Called by [`TickScheduler::new`].
    pub fn validated(mut self) -> Self {
        let clamped = self.tick_rate_hz.clamp(1, Self::MAX_TICK_RATE_HZ);
        if clamped != self.tick_rate_hz {
            warn!(
                rate = self.tick_rate_hz,
                clamped, "tick_rate_hz out of range, clamping"
            );
            self.tick_rate_hz = clamped;
        }
        self.budget_warn_threshold = self.budget_warn_threshold.clamp(0.0, 1.0);
        self
    }

    /// Duration of a single tick (the fixed simulation `dt`).
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_rate_hz.max(1)))
    }
}

// ---------------------------------------------------------------------------
// Tick info and metrics
// ---------------------------------------------------------------------------

/// Returned by [`TickScheduler::wait_for_tick`] for every tick.
#[derive(Debug, Clone)]
pub struct TickInfo {
    /// Tick number, starting at 1.
    pub tick: u64,
    /// Fixed delta time. Simulation must advance by this, never by
    /// measured wall time.
    pub dt: Duration,
    /// `true` if the tick woke more than 10% of `dt` late.
    pub overrun: bool,
    /// Ticks dropped because of the overrun.
    pub ticks_skipped: u64,
}

/// Counters kept by the scheduler.
#[derive(Debug, Clone, Default)]
pub struct TickMetrics {
    pub total_ticks: u64,
    pub total_overruns: u64,
    pub total_skipped: u64,
    /// Longest game-logic execution time reported via
    /// [`TickScheduler::record_tick_end`].
    pub max_tick_time: Duration,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Fixed-timestep tick scheduler. One per playing room.
///
/// The room actor owns it as an `Option`: it is created when the room
/// enters `Playing` and dropped when the room leaves it, which is all the
/// cancellation a tick loop needs.
pub struct TickScheduler {
    config: TickConfig,
    clock: SharedClock,
    dt: Duration,
    tick_count: u64,
    next_tick: Instant,
    tick_started: Option<std::time::Instant>,
    metrics: TickMetrics,
}

impl TickScheduler {
    pub fn new(config: TickConfig, clock: SharedClock) -> Self {
        let config = config.validated();
        let dt = config.tick_duration();
        let jitter = if config.initial_jitter_us > 0 {
            Duration::from_micros(rand::rng().random_range(0..config.initial_jitter_us))
        } else {
            Duration::ZERO
        };
        let next_tick = clock.now() + dt + jitter;

        debug!(
            rate_hz = config.tick_rate_hz,
            budget_ms = dt.as_secs_f64() * 1000.0,
            policy = ?config.policy,
            "tick scheduler created"
        );

        Self {
            config,
            clock,
            dt,
            tick_count: 0,
            next_tick,
            tick_started: None,
            metrics: TickMetrics::default(),
        }
    }

    /// Sleeps until the next tick is due.
    ///
    /// Cancel-safe: if the future is dropped inside `select!` before it
    /// resolves, no tick is consumed and the deadline is unchanged.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        let due = self.next_tick;
        self.clock.sleep_until(due).await;

        let now = self.clock.now();
        self.tick_count += 1;
        self.tick_started = Some(std::time::Instant::now());

        let late_by = now.saturating_duration_since(due);
        let overrun = late_by > self.dt / 10;
        let behind = (late_by.as_nanos() / self.dt.as_nanos()) as u64;
        let mut ticks_skipped = 0;

        self.next_tick = match self.config.policy {
            TickPolicy::Skip => {
                ticks_skipped = behind;
                now + self.dt
            }
            TickPolicy::CatchUp { max_catchup } if behind <= u64::from(max_catchup) => {
                due + self.dt
            }
            TickPolicy::CatchUp { max_catchup } => {
                ticks_skipped = behind - u64::from(max_catchup);
                now + self.dt
            }
        };

        if overrun {
            self.metrics.total_overruns += 1;
            if behind > 0 {
                warn!(
                    tick = self.tick_count,
                    behind,
                    skipped = ticks_skipped,
                    late_ms = late_by.as_secs_f64() * 1000.0,
                    "tick overrun"
                );
            }
        }
        self.metrics.total_ticks += 1;
        self.metrics.total_skipped += ticks_skipped;

        trace!(tick = self.tick_count, overrun, "tick fired");

        TickInfo {
            tick: self.tick_count,
            dt: self.dt,
            overrun,
            ticks_skipped,
        }
    }

    /// Marks the end of the current tick's game logic and logs it if it
    /// used too much of the budget.
    pub fn record_tick_end(&mut self) {
        let Some(started) = self.tick_started.take() else {
            return;
        };
        let elapsed = started.elapsed();
        self.metrics.max_tick_time = self.metrics.max_tick_time.max(elapsed);

        let utilization = elapsed.as_secs_f64() / self.dt.as_secs_f64();
        if utilization >= 1.0 {
            warn!(
                tick = self.tick_count,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                "tick exceeded its budget"
            );
        } else if utilization >= self.config.budget_warn_threshold {
            debug!(
                tick = self.tick_count,
                utilization_pct = format!("{:.1}", utilization * 100.0),
                "tick approaching budget"
            );
        }
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn dt(&self) -> Duration {
        self.dt
    }

    pub fn metrics(&self) -> &TickMetrics {
        &self.metrics
    }
}
