pub mod capture;
pub mod config;
pub mod error;
pub mod events;
pub mod host;
pub mod recorder;
pub mod time_format;
pub mod timer;

pub use capture::{
    CaptureDevice, DeviceEvent, DeviceState, Microphone, StreamInfo, VirtualMicrophone,
    VirtualMicrophoneOptions,
};
#[cfg(feature = "cpal-backend")]
pub use capture::CpalMicrophone;
pub use config::{BackendKind, Config, HostConfig};
pub use error::{BusError, CaptureFault, ConfigError, RecorderError};
pub use events::{EventBus, HandlerId, RecorderEvent, RECORDER_EVENTS};
pub use host::{Clock, HostProfile, HostServices, TokioClock};
pub use recorder::{AudioFormat, Recorder, RecorderSettings, RecorderStatus, Recording};
pub use time_format::{milliseconds_to_time, time_to_milliseconds};
pub use timer::{CountdownTimer, Progress, TimerStatus};
