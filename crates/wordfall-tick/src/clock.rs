//! Time source abstraction.
//!
//! Every timer in a room (the tick loop and the countdown) reads time and
//! sleeps through a [`Clock`] instead of calling `tokio::time` directly.
//! Production uses [`TokioClock`]. Tests either use `TokioClock` under
//! `#[tokio::test(start_paused = true)]` or drive a [`ManualClock`] by hand.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::watch;
use tokio::time::Instant;

/// A source of "now" plus the ability to sleep until a deadline.
pub trait Clock: Send + Sync + 'static {
    /// The current instant according to this clock.
    fn now(&self) -> Instant;

    /// Resolves once [`now`](Self::now) has reached `deadline`.
    ///
    /// The returned future owns everything it needs, so it can be held
    /// across `select!` iterations.
    fn sleep_until(&self, deadline: Instant) -> BoxFuture<'static, ()>;
}

/// Shared handle to a clock. One per server, cloned into every room.
pub type SharedClock = Arc<dyn Clock>;

/// The real clock, backed by `tokio::time`.
///
/// Honours tokio's paused test time, so `start_paused = true` tests get
/// deterministic, instantly-advancing timers for free.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl TokioClock {
    pub fn shared() -> SharedClock {
        Arc::new(Self)
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep_until(&self, deadline: Instant) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep_until(deadline))
    }
}

/// A clock that only moves when told to.
///
/// Sleepers are woken through a `watch` channel whenever [`advance`]
/// moves the current instant, and resolve once it reaches their deadline.
///
/// [`advance`]: ManualClock::advance
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<watch::Sender<Instant>>,
}

impl ManualClock {
    /// A manual clock starting at the real current instant.
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(start: Instant) -> Self {
        let (tx, _rx) = watch::channel(start);
        Self { now: Arc::new(tx) }
    }

    /// Moves time forward by `by`, waking every sleeper whose deadline
    /// has now passed.
    pub fn advance(&self, by: Duration) {
        self.now.send_modify(|now| *now += by);
    }

    /// Type-erased handle for passing into schedulers.
    pub fn shared(&self) -> SharedClock {
        Arc::new(self.clone())
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.borrow()
    }

    fn sleep_until(&self, deadline: Instant) -> BoxFuture<'static, ()> {
        let mut rx = self.now.subscribe();
        Box::pin(async move {
            loop {
                if *rx.borrow_and_update() >= deadline {
                    return;
                }
                if rx.changed().await.is_err() {
                    // Clock dropped: time will never reach the deadline.
                    std::future::pending::<()>().await;
                }
            }
        })
    }
}
