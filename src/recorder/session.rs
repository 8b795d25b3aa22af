use serde::Serialize;
use std::fmt;
use std::future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::format::AudioFormat;
use super::recording::Recording;
use crate::capture::{CaptureDevice, DeviceEvent, DeviceState, Microphone};
use crate::error::CaptureFault;
use crate::events::{EventBus, RecorderEvent};
use crate::host::HostServices;
use crate::timer::{CountdownTimer, ElapsedClock, Progress};

/// Watchdog margin past the remaining budget when capture starts
const START_MARGIN: Duration = Duration::from_millis(450);

/// Watchdog margin past the remaining budget when capture resumes
const RESUME_MARGIN: Duration = Duration::from_millis(400);

/// Recording status as seen by callers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecorderStatus {
    #[default]
    Inactive,
    Recording,
    Paused,
}

impl fmt::Display for RecorderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RecorderStatus::Inactive => "inactive",
            RecorderStatus::Recording => "recording",
            RecorderStatus::Paused => "paused",
        })
    }
}

/// Requests sent by the [`crate::Recorder`] handle
#[derive(Debug)]
pub(crate) enum Command {
    RequestMic,
    DismissMic,
    Start,
    Pause,
    Resume,
    Stop,
    Shutdown(oneshot::Sender<()>),
}

type GrantResult = Result<Box<dyn CaptureDevice>, CaptureFault>;

/// Permission request in flight, with the channel its device will report on
struct PendingGrant {
    task: JoinHandle<GrantResult>,
    events: mpsc::UnboundedReceiver<DeviceEvent>,
}

/// Recorder state, owned by a single task
///
/// Every input (caller commands, permission results, device acknowledgments
/// and data, timer ticks, the watchdog) is handled one at a time by `run`, so
/// no transition ever observes another one half-done.
pub(crate) struct RecorderSession {
    format: AudioFormat,
    max_duration: Duration,
    microphone: Arc<dyn Microphone>,
    host: HostServices,
    bus: Arc<EventBus<RecorderEvent>>,
    timer: CountdownTimer,

    status: RecorderStatus,
    status_tx: watch::Sender<RecorderStatus>,

    commands: mpsc::UnboundedReceiver<Command>,
    ticks: mpsc::UnboundedReceiver<Progress>,

    pending: Option<PendingGrant>,
    device: Option<Box<dyn CaptureDevice>>,
    device_events: Option<mpsc::UnboundedReceiver<DeviceEvent>>,

    chunks: Vec<Vec<u8>>,
    // True from hardware start until the stop acknowledgment is assembled
    collecting: bool,
    started_latch: bool,
    elapsed: ElapsedClock,
    watchdog: Option<Instant>,
    pause_acknowledged: bool,
}

pub(crate) struct SessionParts {
    pub format: AudioFormat,
    pub max_duration: Duration,
    pub microphone: Arc<dyn Microphone>,
    pub host: HostServices,
    pub bus: Arc<EventBus<RecorderEvent>>,
    pub timer: CountdownTimer,
    pub status_tx: watch::Sender<RecorderStatus>,
    pub commands: mpsc::UnboundedReceiver<Command>,
    pub ticks: mpsc::UnboundedReceiver<Progress>,
}

impl RecorderSession {
    pub(crate) fn new(parts: SessionParts) -> Self {
        Self {
            format: parts.format,
            max_duration: parts.max_duration,
            microphone: parts.microphone,
            host: parts.host,
            bus: parts.bus,
            timer: parts.timer,
            status: RecorderStatus::Inactive,
            status_tx: parts.status_tx,
            commands: parts.commands,
            ticks: parts.ticks,
            pending: None,
            device: None,
            device_events: None,
            chunks: Vec::new(),
            collecting: false,
            started_latch: false,
            elapsed: ElapsedClock::default(),
            watchdog: None,
            pause_acknowledged: false,
        }
    }

    pub(crate) async fn run(mut self) {
        info!(
            "Recorder ready ({}, max {}ms, microphone: {})",
            self.format,
            self.max_duration.as_millis(),
            self.microphone.name()
        );

        loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(Command::Shutdown(done)) => {
                        self.close();
                        let _ = done.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command),
                    None => {
                        self.close();
                        break;
                    }
                },

                Some(progress) = self.ticks.recv() => self.on_tick(progress),

                event = next_device_event(&mut self.device_events) => match event {
                    Some(event) => self.on_device_event(event),
                    None => self.device_events = None,
                },

                grant = next_grant(&mut self.pending) => self.on_grant(grant),

                _ = watchdog_expired(self.watchdog) => {
                    self.watchdog = None;
                    self.on_watchdog();
                }
            }
        }

        info!("Recorder closed");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::RequestMic => self.request_mic(),
            Command::DismissMic => self.dismiss_mic(),
            Command::Start => self.start(),
            Command::Pause => self.pause(),
            Command::Resume => self.resume(),
            Command::Stop => self.stop(),
            // Handled by the run loop
            Command::Shutdown(_) => {}
        }
    }

    // -- Transitions --------------------------------------------------------

    fn request_mic(&mut self) {
        if self.device.is_some() {
            debug!("Microphone already available");
            return;
        }
        if self.pending.is_some() {
            debug!("Microphone request already in flight");
            return;
        }

        let (events_tx, events) = mpsc::unbounded_channel();
        let microphone = Arc::clone(&self.microphone);
        info!("Requesting microphone access ({})", microphone.name());

        let task = tokio::spawn(async move { microphone.acquire(events_tx).await });
        self.pending = Some(PendingGrant { task, events });
    }

    fn dismiss_mic(&mut self) {
        if let Some(pending) = self.pending.take() {
            let task = pending.task;
            task.abort();
            // A grant that already completed still holds live tracks
            tokio::spawn(async move {
                if let Ok(Ok(mut device)) = task.await {
                    debug!("Releasing microphone granted after dismissal");
                    device.stop_tracks();
                }
            });
            self.started_latch = false;
            info!("Pending microphone request cancelled");
        }

        if self.status != RecorderStatus::Inactive {
            self.stop();
        }

        let Some(mut device) = self.device.take() else {
            debug!("No microphone to dismiss");
            return;
        };

        device.stop_tracks();
        self.chunks.clear();
        info!("Microphone dismissed");
        self.publish(RecorderEvent::MicrophoneDismissed);
    }

    fn start(&mut self) {
        self.started_latch = true;

        match self.device_state() {
            None => {
                debug!("Start deferred until the microphone is available");
                return;
            }
            Some(DeviceState::Inactive) => {}
            Some(state) => {
                debug!("Start ignored: device is {:?}", state);
                return;
            }
        }

        self.publish(RecorderEvent::Start);
        if let Err(fault) = self.with_device(|device| device.start()) {
            self.report(fault);
            return;
        }

        let now = self.host.clock.now();
        self.chunks.clear();
        self.collecting = true;
        self.elapsed.start(now);
        self.watchdog = Some(now + self.max_duration + START_MARGIN);
        info!("Capture started");
    }

    fn pause(&mut self) {
        if self.device_state() != Some(DeviceState::Recording) {
            debug!("Pause ignored: not recording");
            return;
        }
        if let Err(fault) = self.with_device(|device| device.pause()) {
            self.report(fault);
            return;
        }

        self.set_status(RecorderStatus::Paused);
        self.elapsed.pause(self.host.clock.now());
        self.watchdog = None;
        info!("Capture paused at {}ms", self.elapsed_ms());
    }

    fn resume(&mut self) {
        if self.device_state() != Some(DeviceState::Paused) {
            debug!("Resume ignored: not paused");
            return;
        }
        if let Err(fault) = self.with_device(|device| device.resume()) {
            self.report(fault);
            return;
        }

        self.set_status(RecorderStatus::Recording);
        let now = self.host.clock.now();
        self.elapsed.resume(now);
        let remaining = self.max_duration.saturating_sub(self.elapsed.elapsed_at(now));
        self.watchdog = Some(now + remaining + RESUME_MARGIN);

        if self.host.profile.synthesize_pause_acks {
            // The acknowledgment may never come; let the next tick confirm it
            self.timer.resume();
        }
        info!("Capture resumed at {}ms", self.elapsed_ms());
    }

    fn stop(&mut self) {
        match self.device_state() {
            None | Some(DeviceState::Inactive) => {
                debug!("Stop ignored: device idle");
                return;
            }
            Some(_) => {}
        }
        if let Err(fault) = self.with_device(|device| device.stop()) {
            self.report(fault);
            return;
        }

        self.set_status(RecorderStatus::Inactive);
        self.pause_acknowledged = false;
        self.watchdog = None;
        self.elapsed.pause(self.host.clock.now());
        self.timer.stop();
        info!("Capture stopping after {}ms", self.elapsed_ms());
    }

    // -- Acknowledgments ----------------------------------------------------

    fn acknowledge_pause(&mut self) {
        if self.status != RecorderStatus::Paused || self.pause_acknowledged {
            return;
        }
        self.pause_acknowledged = true;
        self.timer.pause();
        self.publish(RecorderEvent::Pause);
    }

    fn acknowledge_resume(&mut self) {
        if self.status != RecorderStatus::Recording || !self.pause_acknowledged {
            return;
        }
        self.pause_acknowledged = false;
        self.timer.resume();
        self.publish(RecorderEvent::Resume);
    }

    fn acknowledge_stop(&mut self) {
        if !self.collecting {
            debug!("Stop acknowledgment without an open capture");
            return;
        }
        self.collecting = false;
        self.started_latch = false;

        let duration = self.elapsed.elapsed_at(self.host.clock.now());
        let chunks = std::mem::take(&mut self.chunks);
        let recording = Recording::assemble(self.format, chunks, duration);
        info!(
            "Recording ready: {} ({} bytes, {}ms)",
            recording.url,
            recording.size(),
            recording.duration.as_millis()
        );
        self.publish(RecorderEvent::Stop(recording));
    }

    // -- Inputs -------------------------------------------------------------

    fn on_grant(&mut self, grant: Result<GrantResult, JoinError>) {
        let Some(pending) = self.pending.take() else {
            return;
        };

        match grant {
            Ok(Ok(device)) => {
                let info = device.info();
                info!("Microphone available: {} ({})", info.label, info.id);
                self.device = Some(device);
                self.device_events = Some(pending.events);
                self.publish(RecorderEvent::MicrophoneAvailable(info));

                if self.started_latch {
                    self.start();
                }
            }
            Ok(Err(fault)) => {
                let fault = fault.normalized();
                warn!("Microphone request failed: {}", fault);
                self.publish(RecorderEvent::Error(fault));
            }
            Err(e) if e.is_cancelled() => {}
            Err(e) => {
                error!("Microphone request task failed: {}", e);
                self.publish(RecorderEvent::Error(CaptureFault::new(
                    "AbortError",
                    e.to_string(),
                )));
            }
        }
    }

    fn on_device_event(&mut self, event: DeviceEvent) {
        match event {
            DeviceEvent::Started => {
                let state = self.device_state();
                let open = matches!(state, Some(DeviceState::Recording | DeviceState::Paused));
                if !self.collecting || !open {
                    debug!("Late start acknowledgment ignored");
                    return;
                }
                self.timer.start();
                if state == Some(DeviceState::Recording) {
                    self.set_status(RecorderStatus::Recording);
                } else {
                    // Paused before the start was confirmed
                    self.acknowledge_pause();
                }
            }
            DeviceEvent::Paused => self.acknowledge_pause(),
            DeviceEvent::Resumed => self.acknowledge_resume(),
            DeviceEvent::Stopped => self.acknowledge_stop(),
            DeviceEvent::Data(data) => {
                if !self.collecting {
                    debug!("Dropping {} bytes received outside a capture", data.len());
                } else if !data.is_empty() {
                    self.chunks.push(data);
                }
            }
            DeviceEvent::Fault(fault) => self.report(fault),
        }
    }

    fn on_tick(&mut self, progress: Progress) {
        debug!(
            "Tick: {}ms spent, {}ms left ({:.1}%)",
            progress.spent_ms, progress.left_ms, progress.percentage
        );
        self.publish(RecorderEvent::Recording(progress));

        if !self.host.profile.synthesize_pause_acks {
            return;
        }
        match self.status {
            RecorderStatus::Paused if !self.pause_acknowledged => self.acknowledge_pause(),
            RecorderStatus::Recording if self.pause_acknowledged => self.acknowledge_resume(),
            _ => {}
        }
    }

    fn on_watchdog(&mut self) {
        if self.device_state() != Some(DeviceState::Recording) {
            return;
        }
        warn!(
            "Maximum duration of {}ms exceeded, stopping capture",
            self.max_duration.as_millis()
        );
        self.stop();
    }

    /// Release everything before the task exits
    fn close(&mut self) {
        self.dismiss_mic();
        self.watchdog = None;
        self.timer.stop();
    }

    // -- Helpers ------------------------------------------------------------

    fn device_state(&self) -> Option<DeviceState> {
        self.device.as_ref().map(|device| device.state())
    }

    fn with_device<F>(&mut self, op: F) -> Result<(), CaptureFault>
    where
        F: FnOnce(&mut dyn CaptureDevice) -> Result<(), CaptureFault>,
    {
        match self.device.as_deref_mut() {
            Some(device) => op(device),
            None => Ok(()),
        }
    }

    fn elapsed_ms(&self) -> u128 {
        self.elapsed.elapsed_at(self.host.clock.now()).as_millis()
    }

    fn set_status(&mut self, status: RecorderStatus) {
        self.status = status;
        self.status_tx.send_replace(status);
    }

    fn report(&self, fault: CaptureFault) {
        let fault = fault.normalized();
        warn!("Capture fault: {}", fault);
        self.publish(RecorderEvent::Error(fault));
    }

    fn publish(&self, event: RecorderEvent) {
        if let Err(e) = self.bus.publish(event.name(), &event) {
            error!("Failed to publish {}: {}", event.name(), e);
        }
    }
}

async fn next_device_event(
    events: &mut Option<mpsc::UnboundedReceiver<DeviceEvent>>,
) -> Option<DeviceEvent> {
    match events {
        Some(events) => events.recv().await,
        None => future::pending().await,
    }
}

async fn next_grant(pending: &mut Option<PendingGrant>) -> Result<GrantResult, JoinError> {
    match pending {
        Some(pending) => (&mut pending.task).await,
        None => future::pending().await,
    }
}

async fn watchdog_expired(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}
