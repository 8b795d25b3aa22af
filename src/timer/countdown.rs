use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use super::elapsed::ElapsedClock;
use crate::error::ConfigError;
use crate::host::Clock;

/// Default time between two ticks
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(50);

/// Progress reported on every tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Progress {
    /// Milliseconds spent so far
    pub spent_ms: u64,
    /// Milliseconds left before the maximum duration
    pub left_ms: u64,
    /// `100 * spent / max`
    pub percentage: f64,
}

impl Progress {
    fn running(spent: Duration, max: Duration) -> Self {
        let spent_ms = spent.as_millis() as u64;
        let max_ms = max.as_millis() as u64;
        Self {
            spent_ms,
            left_ms: max_ms.saturating_sub(spent_ms),
            percentage: spent_ms as f64 * 100.0 / max_ms as f64,
        }
    }

    fn complete(max: Duration) -> Self {
        Self {
            spent_ms: max.as_millis() as u64,
            left_ms: 0,
            percentage: 100.0,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.left_ms == 0
    }
}

/// Callback invoked on every tick
pub type TickCallback = Arc<dyn Fn(Progress) + Send + Sync>;

/// Timer status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerStatus {
    Inactive,
    Paused,
    Active,
}

struct TimerState {
    status: TimerStatus,
    elapsed: ElapsedClock,
    ticker: Option<JoinHandle<()>>,
    // Bumped on every (re)start so a cancelled ticker can never tick again
    run: u64,
}

struct Shared {
    state: Mutex<TimerState>,
    callback: TickCallback,
    max_duration: Duration,
    interval: Duration,
    clock: Arc<dyn Clock>,
}

/// Repeating countdown that reports progress until a maximum duration
///
/// Ticks fire every `interval` while active, plus one immediate tick on
/// `start`/`resume` and a final one on `pause`/`stop`. When the maximum is
/// reached the timer reports `(max, 0, 100)` and stops itself.
///
/// The ticker runs as a tokio task, so the timer must be driven from within a
/// tokio runtime.
pub struct CountdownTimer {
    shared: Arc<Shared>,
}

impl CountdownTimer {
    pub fn new<F>(
        callback: F,
        max_duration: Duration,
        interval: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(Progress) + Send + Sync + 'static,
    {
        if interval.is_zero() || max_duration <= interval {
            return Err(ConfigError::InvalidTimer {
                max_ms: max_duration.as_millis() as u64,
                interval_ms: interval.as_millis() as u64,
            });
        }

        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(TimerState {
                    status: TimerStatus::Inactive,
                    elapsed: ElapsedClock::default(),
                    ticker: None,
                    run: 0,
                }),
                callback: Arc::new(callback),
                max_duration,
                interval,
                clock,
            }),
        })
    }

    pub fn status(&self) -> TimerStatus {
        self.shared.state.lock().status
    }

    /// Time counted so far (excluding paused periods)
    pub fn elapsed(&self) -> Duration {
        let now = self.shared.clock.now();
        self.shared.state.lock().elapsed.elapsed_at(now)
    }

    /// Start counting from zero; no-op unless inactive
    pub fn start(&self) {
        let progress = {
            let mut state = self.shared.state.lock();
            if state.status != TimerStatus::Inactive {
                return;
            }
            let now = self.shared.clock.now();
            state.elapsed.start(now);
            state.status = TimerStatus::Active;
            let progress = Progress::running(state.elapsed.elapsed_at(now), self.shared.max_duration);
            self.spawn_ticker(&mut state);
            progress
        };

        (self.shared.callback)(progress);
    }

    /// Freeze the countdown; no-op unless active
    pub fn pause(&self) {
        let progress = {
            let mut state = self.shared.state.lock();
            if state.status != TimerStatus::Active {
                return;
            }
            Self::cancel_ticker(&mut state);
            let now = self.shared.clock.now();
            let progress = self.sample(&mut state, now);
            if state.status == TimerStatus::Active {
                state.status = TimerStatus::Paused;
            }
            state.elapsed.pause(now);
            progress
        };

        (self.shared.callback)(progress);
    }

    /// Continue a paused countdown; no-op unless paused
    pub fn resume(&self) {
        let progress = {
            let mut state = self.shared.state.lock();
            if state.status != TimerStatus::Paused {
                return;
            }
            let now = self.shared.clock.now();
            state.elapsed.resume(now);
            state.status = TimerStatus::Active;
            self.spawn_ticker(&mut state);
            Progress::running(state.elapsed.elapsed_at(now), self.shared.max_duration)
        };

        (self.shared.callback)(progress);
    }

    /// Stop counting; fires a final tick if the maximum was not reached
    pub fn stop(&self) {
        let progress = {
            let mut state = self.shared.state.lock();
            if state.status == TimerStatus::Inactive {
                return;
            }
            state.status = TimerStatus::Inactive;
            Self::cancel_ticker(&mut state);
            let now = self.shared.clock.now();
            state.elapsed.pause(now);
            let spent = state.elapsed.elapsed_at(now);
            (spent < self.shared.max_duration)
                .then(|| Progress::running(spent, self.shared.max_duration))
        };

        if let Some(progress) = progress {
            (self.shared.callback)(progress);
        }
    }

    /// Current progress; marks the timer inactive once the maximum is reached
    fn sample(&self, state: &mut TimerState, now: tokio::time::Instant) -> Progress {
        sample(&self.shared, state, now)
    }

    fn spawn_ticker(&self, state: &mut TimerState) {
        state.run += 1;
        let run = state.run;
        let shared = Arc::clone(&self.shared);

        state.ticker = Some(tokio::spawn(async move {
            let period = shared.interval;
            let mut ticks = tokio::time::interval_at(shared.clock.now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticks.tick().await;

                let progress = {
                    let mut state = shared.state.lock();
                    if state.status != TimerStatus::Active || state.run != run {
                        return;
                    }
                    let now = shared.clock.now();
                    sample(&shared, &mut state, now)
                };

                (shared.callback)(progress);

                if progress.is_complete() {
                    debug!("Countdown reached {}ms, timer stopped", progress.spent_ms);
                    return;
                }
            }
        }));
    }

    fn cancel_ticker(state: &mut TimerState) {
        state.run += 1;
        if let Some(ticker) = state.ticker.take() {
            ticker.abort();
        }
    }
}

fn sample(shared: &Shared, state: &mut TimerState, now: tokio::time::Instant) -> Progress {
    let spent = state.elapsed.elapsed_at(now);
    if spent < shared.max_duration {
        return Progress::running(spent, shared.max_duration);
    }

    // Self-stop. The running ticker (if any) is detached, not aborted, since
    // this may be executing inside it.
    state.status = TimerStatus::Inactive;
    state.elapsed.pause(now);
    state.ticker = None;
    Progress::complete(shared.max_duration)
}

impl Drop for CountdownTimer {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        Self::cancel_ticker(&mut state);
    }
}

impl std::fmt::Debug for CountdownTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountdownTimer")
            .field("status", &self.status())
            .field("max_duration", &self.shared.max_duration)
            .field("interval", &self.shared.interval)
            .finish()
    }
}
