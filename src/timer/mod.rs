//! Progress timing
//!
//! `CountdownTimer` reports progress towards a maximum duration on a fixed
//! cadence; `ElapsedClock` does the pause-aware elapsed-time bookkeeping shared
//! with the recorder.

pub mod countdown;
pub mod elapsed;

pub use countdown::{CountdownTimer, Progress, TickCallback, TimerStatus, DEFAULT_TICK_INTERVAL};
pub use elapsed::ElapsedClock;
