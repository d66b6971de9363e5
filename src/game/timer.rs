//! Round countdown state machine

use std::future;
use std::time::Duration;

use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use crate::util::time::COUNTDOWN_PERIOD;

/// Countdown timer state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Stopped,
    Running,
}

/// Owns the recurring one-second countdown callback.
///
/// The callback only exists while the timer is running; `stop` (or dropping
/// the controller) drops the underlying interval, so nothing can fire after
/// the owning room is gone. Must be started from within a tokio runtime.
#[derive(Debug)]
pub struct TimerController {
    period: Duration,
    ticker: Option<Interval>,
}

impl TimerController {
    pub fn new() -> Self {
        Self::with_period(COUNTDOWN_PERIOD)
    }

    pub fn with_period(period: Duration) -> Self {
        Self {
            period,
            ticker: None,
        }
    }

    pub fn state(&self) -> TimerState {
        if self.ticker.is_some() {
            TimerState::Running
        } else {
            TimerState::Stopped
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == TimerState::Running
    }

    /// Stopped -> Running. Returns false (and changes nothing) if already running.
    pub fn start(&mut self) -> bool {
        if self.is_running() {
            return false;
        }
        // First decrement lands one full period after start
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
        self.ticker = Some(ticker);
        true
    }

    /// Running -> Stopped. Returns false if it was already stopped.
    pub fn stop(&mut self) -> bool {
        self.ticker.take().is_some()
    }

    /// Resolves at the next countdown second; never resolves while stopped.
    pub async fn next_second(&mut self) {
        match self.ticker.as_mut() {
            Some(ticker) => {
                ticker.tick().await;
            }
            None => future::pending::<()>().await,
        }
    }

    /// One countdown step, floored at zero
    pub fn countdown(time_remaining: u32) -> u32 {
        time_remaining.saturating_sub(1)
    }
}

impl Default for TimerController {
    fn default() -> Self {
        Self::new()
    }
}
