//! Microphone acquisition and capture control
//!
//! - `Microphone`: permission-gated access to an input device
//! - `CaptureDevice`: start/pause/resume/stop of a granted stream, confirmed
//!   asynchronously through `DeviceEvent`s

pub mod device;
pub mod virtual_mic;

#[cfg(feature = "cpal-backend")]
pub mod cpal_mic;

pub use device::{
    CaptureDevice, DeviceEvent, DeviceEventSender, DeviceState, Microphone, StreamInfo,
};
pub use virtual_mic::{VirtualMicrophone, VirtualMicrophoneOptions};

#[cfg(feature = "cpal-backend")]
pub use cpal_mic::CpalMicrophone;
