use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::device::{
    invalid_state, CaptureDevice, DeviceEvent, DeviceEventSender, DeviceState, Microphone,
    StreamInfo,
};
use crate::error::CaptureFault;

/// Behaviour of a [`VirtualMicrophone`]
#[derive(Debug, Clone)]
pub struct VirtualMicrophoneOptions {
    /// Answer every permission request with a denial
    pub deny: bool,
    /// Time the simulated user takes to answer the permission prompt
    pub grant_delay: Duration,
    /// Cadence of data fragments while recording
    pub chunk_interval: Duration,
    /// Size in bytes of each (silent) data fragment
    pub chunk_size: usize,
    /// Deliver `Paused`/`Resumed` acknowledgments (some engines do not)
    pub acknowledge_pause: bool,
    /// Device label reported in [`StreamInfo`]
    pub label: String,
}

impl Default for VirtualMicrophoneOptions {
    fn default() -> Self {
        Self {
            deny: false,
            grant_delay: Duration::from_millis(10),
            chunk_interval: Duration::from_millis(250),
            chunk_size: 1024,
            acknowledge_pause: true,
            label: "Virtual Microphone".to_string(),
        }
    }
}

/// Deterministic software microphone
///
/// Produces silent fragments on a fixed cadence and acknowledges control calls
/// through the event channel, like a host capture engine would.
pub struct VirtualMicrophone {
    options: VirtualMicrophoneOptions,
    acquisitions: AtomicUsize,
    tracks_stopped: Arc<AtomicUsize>,
    events: Mutex<Option<DeviceEventSender>>,
}

impl VirtualMicrophone {
    pub fn new(options: VirtualMicrophoneOptions) -> Self {
        Self {
            options,
            acquisitions: AtomicUsize::new(0),
            tracks_stopped: Arc::new(AtomicUsize::new(0)),
            events: Mutex::new(None),
        }
    }

    /// Number of granted acquisitions so far
    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    /// Number of times a device's hardware tracks were released
    pub fn tracks_stopped(&self) -> usize {
        self.tracks_stopped.load(Ordering::SeqCst)
    }

    /// Report a runtime fault on the most recently granted device
    ///
    /// Returns false if no device was granted or its receiver is gone.
    pub fn emit_fault(&self, fault: CaptureFault) -> bool {
        self.events
            .lock()
            .as_ref()
            .map(|events| events.send(DeviceEvent::Fault(fault)).is_ok())
            .unwrap_or(false)
    }
}

impl Default for VirtualMicrophone {
    fn default() -> Self {
        Self::new(VirtualMicrophoneOptions::default())
    }
}

#[async_trait::async_trait]
impl Microphone for VirtualMicrophone {
    async fn acquire(
        &self,
        events: DeviceEventSender,
    ) -> Result<Box<dyn CaptureDevice>, CaptureFault> {
        tokio::time::sleep(self.options.grant_delay).await;

        if self.options.deny {
            info!("Virtual microphone: permission denied");
            return Err(CaptureFault::permission_denied());
        }

        let serial = self.acquisitions.fetch_add(1, Ordering::SeqCst) + 1;
        *self.events.lock() = Some(events.clone());

        let info = StreamInfo {
            id: format!("virtual-{}", serial),
            label: self.options.label.clone(),
        };
        info!("Virtual microphone granted: {}", info.id);

        Ok(Box::new(VirtualDevice {
            info,
            options: self.options.clone(),
            state: Arc::new(Mutex::new(DeviceState::Inactive)),
            events,
            pump: None,
            tracks_live: true,
            tracks_stopped: Arc::clone(&self.tracks_stopped),
        }))
    }

    fn name(&self) -> &str {
        "virtual"
    }
}

struct VirtualDevice {
    info: StreamInfo,
    options: VirtualMicrophoneOptions,
    state: Arc<Mutex<DeviceState>>,
    events: DeviceEventSender,
    pump: Option<JoinHandle<()>>,
    tracks_live: bool,
    tracks_stopped: Arc<AtomicUsize>,
}

impl VirtualDevice {
    fn notify(&self, event: DeviceEvent) {
        // Receiver gone means the session moved on; nothing to report to
        let _ = self.events.send(event);
    }

    fn silence(&self) -> Vec<u8> {
        vec![0u8; self.options.chunk_size]
    }

    fn spawn_pump(&mut self) {
        let state = Arc::clone(&self.state);
        let events = self.events.clone();
        let chunk_size = self.options.chunk_size;
        let period = self.options.chunk_interval;

        self.pump = Some(tokio::spawn(async move {
            let mut ticks = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticks.tick().await;
                let current = *state.lock();
                match current {
                    DeviceState::Recording => {}
                    DeviceState::Paused => continue,
                    DeviceState::Inactive => return,
                }
                if events.send(DeviceEvent::Data(vec![0u8; chunk_size])).is_err() {
                    return;
                }
            }
        }));
    }

    fn cancel_pump(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

impl CaptureDevice for VirtualDevice {
    fn info(&self) -> StreamInfo {
        self.info.clone()
    }

    fn state(&self) -> DeviceState {
        *self.state.lock()
    }

    fn start(&mut self) -> Result<(), CaptureFault> {
        let state = self.state();
        if state != DeviceState::Inactive {
            return Err(invalid_state("start", state));
        }
        if !self.tracks_live {
            return Err(CaptureFault::new("InvalidStateError", "the tracks have ended"));
        }

        *self.state.lock() = DeviceState::Recording;
        self.spawn_pump();
        self.notify(DeviceEvent::Started);
        Ok(())
    }

    fn pause(&mut self) -> Result<(), CaptureFault> {
        let state = self.state();
        if state != DeviceState::Recording {
            return Err(invalid_state("pause", state));
        }

        *self.state.lock() = DeviceState::Paused;
        if self.options.acknowledge_pause {
            self.notify(DeviceEvent::Paused);
        } else {
            debug!("Virtual microphone: pause acknowledgment suppressed");
        }
        Ok(())
    }

    fn resume(&mut self) -> Result<(), CaptureFault> {
        let state = self.state();
        if state != DeviceState::Paused {
            return Err(invalid_state("resume", state));
        }

        *self.state.lock() = DeviceState::Recording;
        if self.options.acknowledge_pause {
            self.notify(DeviceEvent::Resumed);
        } else {
            debug!("Virtual microphone: resume acknowledgment suppressed");
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CaptureFault> {
        let state = self.state();
        if state == DeviceState::Inactive {
            return Err(invalid_state("stop", state));
        }

        self.cancel_pump();
        *self.state.lock() = DeviceState::Inactive;
        // Flush the fragment in progress before confirming
        self.notify(DeviceEvent::Data(self.silence()));
        self.notify(DeviceEvent::Stopped);
        Ok(())
    }

    fn stop_tracks(&mut self) {
        self.cancel_pump();
        if self.tracks_live {
            self.tracks_live = false;
            self.tracks_stopped.fetch_add(1, Ordering::SeqCst);
            debug!("Virtual microphone: tracks of {} stopped", self.info.id);
        }
    }
}

impl Drop for VirtualDevice {
    fn drop(&mut self) {
        self.cancel_pump();
    }
}
