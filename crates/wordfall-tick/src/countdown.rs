use std::time::Duration;

use tokio::time::Instant;

use crate::SharedClock;

/// A fixed-cadence descending counter, e.g. 3, 2, 1.
///
/// The owner reports the starting value itself when it creates the
/// countdown. Every call to [`next_step`](Self::next_step) then waits one
/// period and yields the decremented value; `0` means the countdown is
/// over. Dropping a `Countdown` cancels it.
pub struct Countdown {
    clock: SharedClock,
    remaining: u32,
    period: Duration,
    next: Instant,
}

impl Countdown {
    pub fn new(clock: SharedClock, steps: u32, period: Duration) -> Self {
        let next = clock.now() + period;
        Self {
            clock,
            remaining: steps,
            period,
            next,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn is_finished(&self) -> bool {
        self.remaining == 0
    }

    /// Waits for the next step and returns the new remaining count.
    ///
    /// Cancel-safe in the same way as [`TickScheduler::wait_for_tick`]:
    /// the deadline only moves once the sleep has completed.
    ///
    /// [`TickScheduler::wait_for_tick`]: crate::TickScheduler::wait_for_tick
    pub async fn next_step(&mut self) -> u32 {
        if self.remaining == 0 {
            return 0;
        }
        self.clock.sleep_until(self.next).await;
        self.remaining -= 1;
        self.next += self.period;
        self.remaining
    }
}
