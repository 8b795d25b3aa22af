//! Recording session
//!
//! - `Recorder`: public handle, cheap to clone
//! - `RecorderSession`: the state machine, run as one tokio task
//! - `Recording`: assembled result delivered with the `stop` event

pub mod format;
pub mod handle;
pub mod recording;
mod session;
pub mod settings;

pub use format::AudioFormat;
pub use handle::Recorder;
pub use recording::Recording;
pub use session::RecorderStatus;
pub use settings::{RecorderSettings, ValidatedSettings};
