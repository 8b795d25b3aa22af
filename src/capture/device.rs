use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::CaptureFault;

/// Description of a granted input stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamInfo {
    /// Stable identifier of the stream
    pub id: String,
    /// Human-readable device label
    pub label: String,
}

/// State of the capture device, as the device itself reports it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceState {
    Inactive,
    Recording,
    Paused,
}

/// Notification sent by a capture device
///
/// Control calls on [`CaptureDevice`] return immediately; the device confirms
/// them later with one of these events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// Capture has begun
    Started,
    /// A pause request took effect
    Paused,
    /// A resume request took effect
    Resumed,
    /// Capture has ended; no further data follows
    Stopped,
    /// One encoded fragment of audio
    Data(Vec<u8>),
    /// Runtime failure reported by the host
    Fault(CaptureFault),
}

/// Channel on which a device reports its events
pub type DeviceEventSender = mpsc::UnboundedSender<DeviceEvent>;

/// Permission-gated access to a microphone
///
/// Implementations:
/// - `VirtualMicrophone`: deterministic software source (tests, demo)
/// - `CpalMicrophone`: default input device via cpal (feature `cpal-backend`)
#[async_trait::async_trait]
pub trait Microphone: Send + Sync {
    /// Ask the host for microphone access
    ///
    /// Resolves once the user (or host policy) has answered. The returned device
    /// reports acknowledgments and data on `events`.
    async fn acquire(&self, events: DeviceEventSender)
        -> Result<Box<dyn CaptureDevice>, CaptureFault>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// Control surface of a granted capture stream
pub trait CaptureDevice: Send {
    fn info(&self) -> StreamInfo;

    /// Current device state (updated synchronously by the control calls)
    fn state(&self) -> DeviceState;

    fn start(&mut self) -> Result<(), CaptureFault>;

    fn pause(&mut self) -> Result<(), CaptureFault>;

    fn resume(&mut self) -> Result<(), CaptureFault>;

    /// Request the end of capture; the device flushes pending data, then sends `Stopped`
    fn stop(&mut self) -> Result<(), CaptureFault>;

    /// Release the underlying hardware tracks
    fn stop_tracks(&mut self);
}

/// Fault reported when a control call does not fit the device state
pub(crate) fn invalid_state(operation: &str, state: DeviceState) -> CaptureFault {
    CaptureFault::new(
        "InvalidStateError",
        format!("cannot {} while the device is {:?}", operation, state).to_lowercase(),
    )
}
