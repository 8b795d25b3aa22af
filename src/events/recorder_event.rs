use crate::capture::StreamInfo;
use crate::error::CaptureFault;
use crate::recorder::Recording;
use crate::timer::Progress;

pub const START: &str = "start";
pub const RECORDING: &str = "recording";
pub const PAUSE: &str = "pause";
pub const RESUME: &str = "resume";
pub const STOP: &str = "stop";
pub const MICROPHONE_AVAILABLE: &str = "microphoneAvailable";
pub const MICROPHONE_DISMISSED: &str = "microphoneDismissed";
pub const ERROR: &str = "error";

/// Every event name a recorder publishes, in declaration order
pub const RECORDER_EVENTS: [&str; 8] = [
    START,
    RECORDING,
    PAUSE,
    RESUME,
    STOP,
    MICROPHONE_AVAILABLE,
    MICROPHONE_DISMISSED,
    ERROR,
];

/// Payload delivered to recorder event handlers
#[derive(Debug, Clone)]
pub enum RecorderEvent {
    /// Capture is about to begin
    Start,
    /// Timer tick while a recording is running
    Recording(Progress),
    /// The capture device acknowledged a pause
    Pause,
    /// The capture device acknowledged a resume
    Resume,
    /// Capture finished; carries the assembled recording
    Stop(Recording),
    /// Microphone permission granted
    MicrophoneAvailable(StreamInfo),
    /// Microphone released
    MicrophoneDismissed,
    /// Permission or hardware failure
    Error(CaptureFault),
}

impl RecorderEvent {
    /// Name under which this event is published
    pub fn name(&self) -> &'static str {
        match self {
            RecorderEvent::Start => START,
            RecorderEvent::Recording(_) => RECORDING,
            RecorderEvent::Pause => PAUSE,
            RecorderEvent::Resume => RESUME,
            RecorderEvent::Stop(_) => STOP,
            RecorderEvent::MicrophoneAvailable(_) => MICROPHONE_AVAILABLE,
            RecorderEvent::MicrophoneDismissed => MICROPHONE_DISMISSED,
            RecorderEvent::Error(_) => ERROR,
        }
    }
}
