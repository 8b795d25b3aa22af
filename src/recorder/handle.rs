use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

use super::format::AudioFormat;
use super::session::{Command, RecorderSession, RecorderStatus, SessionParts};
use super::settings::RecorderSettings;
use crate::capture::Microphone;
use crate::error::{ConfigError, RecorderError};
use crate::events::{EventBus, HandlerId, RecorderEvent, RECORDER_EVENTS};
use crate::host::HostServices;
use crate::time_format;
use crate::timer::CountdownTimer;

/// Voice recorder
///
/// Coordinates microphone acquisition, the recording state machine, the
/// progress timer and event notification. Control methods enqueue a request and
/// return immediately; outcomes are reported through events:
///
/// | event                 | payload                          |
/// |-----------------------|----------------------------------|
/// | `start`               | -                                |
/// | `recording`           | [`crate::timer::Progress`]       |
/// | `pause` / `resume`    | -                                |
/// | `stop`                | [`crate::Recording`]             |
/// | `microphoneAvailable` | [`crate::capture::StreamInfo`]   |
/// | `microphoneDismissed` | -                                |
/// | `error`               | [`crate::CaptureFault`]          |
///
/// Handlers run on the recorder task. A panicking handler terminates it, after
/// which every control method returns [`RecorderError::Closed`].
///
/// Must be created inside a tokio runtime.
#[derive(Clone)]
pub struct Recorder {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<RecorderStatus>,
    bus: Arc<EventBus<RecorderEvent>>,
    format: AudioFormat,
    max_duration: Duration,
}

impl Recorder {
    pub fn new(
        settings: RecorderSettings,
        microphone: Arc<dyn Microphone>,
        host: HostServices,
    ) -> Result<Self, ConfigError> {
        let settings = settings.validate()?;

        let bus = Arc::new(EventBus::new(RECORDER_EVENTS)?);
        let (tick_tx, ticks) = mpsc::unbounded_channel();
        let timer = CountdownTimer::new(
            move |progress| {
                let _ = tick_tx.send(progress);
            },
            settings.max_duration,
            settings.tick_interval,
            Arc::clone(&host.clock),
        )?;

        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (status_tx, status) = watch::channel(RecorderStatus::Inactive);

        let session = RecorderSession::new(SessionParts {
            format: settings.format,
            max_duration: settings.max_duration,
            microphone,
            host,
            bus: Arc::clone(&bus),
            timer,
            status_tx,
            commands,
            ticks,
        });
        tokio::spawn(session.run());

        Ok(Self {
            commands: commands_tx,
            status,
            bus,
            format: settings.format,
            max_duration: settings.max_duration,
        })
    }

    /// Ask for microphone access (no-op if already granted or pending)
    pub fn request_mic(&self) -> Result<(), RecorderError> {
        self.send(Command::RequestMic)
    }

    pub fn request_microphone(&self) -> Result<(), RecorderError> {
        self.request_mic()
    }

    /// Stop any capture and release the microphone
    pub fn dismiss_mic(&self) -> Result<(), RecorderError> {
        self.send(Command::DismissMic)
    }

    pub fn dismiss_microphone(&self) -> Result<(), RecorderError> {
        self.dismiss_mic()
    }

    /// Start recording, or start as soon as the microphone becomes available
    pub fn start(&self) -> Result<(), RecorderError> {
        self.send(Command::Start)
    }

    pub fn pause(&self) -> Result<(), RecorderError> {
        self.send(Command::Pause)
    }

    pub fn resume(&self) -> Result<(), RecorderError> {
        self.send(Command::Resume)
    }

    /// Stop recording; the result arrives with the `stop` event
    pub fn stop(&self) -> Result<(), RecorderError> {
        self.send(Command::Stop)
    }

    /// Dismiss the microphone and end the recorder task
    pub async fn shutdown(&self) -> Result<(), RecorderError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(Command::Shutdown(done_tx))?;
        done_rx.await.map_err(|_| RecorderError::Closed)
    }

    pub fn status(&self) -> RecorderStatus {
        *self.status.borrow()
    }

    pub fn get_status(&self) -> RecorderStatus {
        self.status()
    }

    /// Subscribe to one of the recorder events
    pub fn on<F>(&self, event: &str, handler: F) -> Result<HandlerId, RecorderError>
    where
        F: Fn(&RecorderEvent) + Send + Sync + 'static,
    {
        let id = self.bus.subscribe(event, handler)?;
        debug!("Subscribed handler {} to {}", id.value(), event);
        Ok(id)
    }

    /// Unsubscribe one handler, or all handlers of `event` when `id` is `None`
    pub fn off(&self, event: &str, id: Option<HandlerId>) -> Result<(), RecorderError> {
        self.bus.unsubscribe(event, id)?;
        Ok(())
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn max_duration(&self) -> Duration {
        self.max_duration
    }

    pub fn time_to_milliseconds(time: &str) -> Result<u64, ConfigError> {
        time_format::time_to_milliseconds(time)
    }

    pub fn milliseconds_to_time(milliseconds: u64, minutes_only: bool) -> String {
        time_format::milliseconds_to_time(milliseconds, minutes_only)
    }

    fn send(&self, command: Command) -> Result<(), RecorderError> {
        self.commands.send(command).map_err(|_| RecorderError::Closed)
    }
}

impl std::fmt::Debug for Recorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recorder")
            .field("status", &self.status())
            .field("format", &self.format)
            .field("max_duration", &self.max_duration)
            .finish()
    }
}
