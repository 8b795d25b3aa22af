use std::time::Duration;
use tokio::time::Instant;

/// Elapsed time across start/pause/resume cycles
///
/// `anchor` is set only while running; `accumulated` holds the time banked by
/// earlier running periods.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ElapsedClock {
    anchor: Option<Instant>,
    accumulated: Duration,
}

impl ElapsedClock {
    /// Begin a fresh measurement at `now`
    pub fn start(&mut self, now: Instant) {
        self.anchor = Some(now);
        self.accumulated = Duration::ZERO;
    }

    /// Bank the running period; no-op when already stopped
    pub fn pause(&mut self, now: Instant) {
        if let Some(anchor) = self.anchor.take() {
            self.accumulated += now.saturating_duration_since(anchor);
        }
    }

    /// Start a new running period on top of the banked time
    pub fn resume(&mut self, now: Instant) {
        if self.anchor.is_none() {
            self.anchor = Some(now);
        }
    }

    pub fn elapsed_at(&self, now: Instant) -> Duration {
        elapsed_at(self.anchor, self.accumulated, now)
    }
}

/// Elapsed time given an optional running anchor and banked time
pub fn elapsed_at(anchor: Option<Instant>, accumulated: Duration, now: Instant) -> Duration {
    match anchor {
        Some(anchor) => accumulated + now.saturating_duration_since(anchor),
        None => accumulated,
    }
}
