// Hardware microphone via cpal
//
// cpal::Stream is not Send, so each granted device owns a dedicated thread
// that builds the stream and executes control commands sent over a channel.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use super::device::{
    invalid_state, CaptureDevice, DeviceEvent, DeviceEventSender, DeviceState, Microphone,
    StreamInfo,
};
use crate::error::CaptureFault;

/// How often buffered samples are delivered as a data fragment
const FLUSH_INTERVAL: Duration = Duration::from_millis(250);

/// Default system input device
#[derive(Debug, Default)]
pub struct CpalMicrophone {
    device_name: Option<String>,
}

impl CpalMicrophone {
    /// Use the input device with the given name instead of the default one
    pub fn with_device(name: impl Into<String>) -> Self {
        Self {
            device_name: Some(name.into()),
        }
    }
}

#[async_trait::async_trait]
impl Microphone for CpalMicrophone {
    async fn acquire(
        &self,
        events: DeviceEventSender,
    ) -> Result<Box<dyn CaptureDevice>, CaptureFault> {
        let (ready_tx, ready_rx) = oneshot::channel();
        let (command_tx, command_rx) = mpsc::channel();
        let device_name = self.device_name.clone();

        let thread = thread::Builder::new()
            .name("audrec-cpal".to_string())
            .spawn(move || audio_thread_main(device_name, events, command_rx, ready_tx))
            .map_err(|e| CaptureFault::new("AbortError", format!("failed to spawn audio thread: {}", e)))?;

        let info = ready_rx
            .await
            .map_err(|_| CaptureFault::new("AbortError", "audio thread exited during setup"))??;

        info!("cpal microphone granted: {}", info.label);
        Ok(Box::new(CpalDevice {
            info,
            state: DeviceState::Inactive,
            commands: command_tx,
            thread: Some(thread),
        }))
    }

    fn name(&self) -> &str {
        "cpal"
    }
}

/// Commands sent to the audio thread
enum AudioCommand {
    Play,
    Pause,
    Resume,
    Stop,
    Shutdown,
}

struct CpalDevice {
    info: StreamInfo,
    state: DeviceState,
    commands: Sender<AudioCommand>,
    thread: Option<JoinHandle<()>>,
}

impl CpalDevice {
    fn send(&self, command: AudioCommand) -> Result<(), CaptureFault> {
        self.commands
            .send(command)
            .map_err(|_| CaptureFault::new("InvalidStateError", "the tracks have ended"))
    }
}

impl CaptureDevice for CpalDevice {
    fn info(&self) -> StreamInfo {
        self.info.clone()
    }

    fn state(&self) -> DeviceState {
        self.state
    }

    fn start(&mut self) -> Result<(), CaptureFault> {
        if self.state != DeviceState::Inactive {
            return Err(invalid_state("start", self.state));
        }
        self.send(AudioCommand::Play)?;
        self.state = DeviceState::Recording;
        Ok(())
    }

    fn pause(&mut self) -> Result<(), CaptureFault> {
        if self.state != DeviceState::Recording {
            return Err(invalid_state("pause", self.state));
        }
        self.send(AudioCommand::Pause)?;
        self.state = DeviceState::Paused;
        Ok(())
    }

    fn resume(&mut self) -> Result<(), CaptureFault> {
        if self.state != DeviceState::Paused {
            return Err(invalid_state("resume", self.state));
        }
        self.send(AudioCommand::Resume)?;
        self.state = DeviceState::Recording;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CaptureFault> {
        if self.state == DeviceState::Inactive {
            return Err(invalid_state("stop", self.state));
        }
        self.send(AudioCommand::Stop)?;
        self.state = DeviceState::Inactive;
        Ok(())
    }

    fn stop_tracks(&mut self) {
        let _ = self.commands.send(AudioCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Audio thread panicked");
            }
        }
    }
}

impl Drop for CpalDevice {
    fn drop(&mut self) {
        self.stop_tracks();
    }
}

fn audio_thread_main(
    device_name: Option<String>,
    events: DeviceEventSender,
    commands: Receiver<AudioCommand>,
    ready: oneshot::Sender<Result<StreamInfo, CaptureFault>>,
) {
    let buffer: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));

    let (stream, info) = match build_stream(device_name, Arc::clone(&buffer), events.clone()) {
        Ok(built) => built,
        Err(fault) => {
            let _ = ready.send(Err(fault));
            return;
        }
    };
    if ready.send(Ok(info)).is_err() {
        // Request was cancelled while the stream was being built
        return;
    }

    let flush = |buffer: &Mutex<Vec<u8>>| {
        let data = std::mem::take(&mut *buffer.lock());
        if !data.is_empty() {
            let _ = events.send(DeviceEvent::Data(data));
        }
    };

    let mut capturing = false;
    loop {
        match commands.recv_timeout(FLUSH_INTERVAL) {
            Ok(AudioCommand::Play) | Ok(AudioCommand::Resume) => {
                let resumed = capturing;
                match stream.play() {
                    Ok(()) => {
                        capturing = true;
                        let _ = events.send(if resumed {
                            DeviceEvent::Resumed
                        } else {
                            buffer.lock().clear();
                            DeviceEvent::Started
                        });
                    }
                    Err(e) => {
                        error!("Failed to start input stream: {}", e);
                        let _ = events.send(DeviceEvent::Fault(CaptureFault::new(
                            "NotReadableError",
                            e.to_string(),
                        )));
                    }
                }
            }
            Ok(AudioCommand::Pause) => match stream.pause() {
                Ok(()) => {
                    let _ = events.send(DeviceEvent::Paused);
                }
                Err(e) => {
                    warn!("Failed to pause input stream: {}", e);
                    let _ = events.send(DeviceEvent::Fault(CaptureFault::new(
                        "NotReadableError",
                        e.to_string(),
                    )));
                }
            },
            Ok(AudioCommand::Stop) => {
                if let Err(e) = stream.pause() {
                    warn!("Failed to halt input stream: {}", e);
                }
                capturing = false;
                flush(&buffer);
                let _ = events.send(DeviceEvent::Stopped);
            }
            Ok(AudioCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                if capturing {
                    flush(&buffer);
                }
            }
        }
    }

    drop(stream);
    debug!("Audio thread exiting");
}

fn build_stream(
    device_name: Option<String>,
    buffer: Arc<Mutex<Vec<u8>>>,
    events: DeviceEventSender,
) -> Result<(cpal::Stream, StreamInfo), CaptureFault> {
    let host = cpal::default_host();
    debug!("Host: {:?}", host.id());

    let device = match device_name {
        Some(ref name) => host
            .input_devices()
            .ok()
            .and_then(|mut devices| devices.find(|d| d.name().map(|n| n == *name).unwrap_or(false))),
        None => host.default_input_device(),
    }
    .ok_or_else(|| CaptureFault::new("NotFoundError", "no input device available"))?;

    let label = device.name().unwrap_or_else(|_| "Unknown".to_string());
    let config = device
        .default_input_config()
        .map_err(|e| CaptureFault::new("NotReadableError", e.to_string()))?;
    debug!(
        "Input config: {} Hz, {:?}, {} channels",
        config.sample_rate().0,
        config.sample_format(),
        config.channels()
    );

    let err_fn = move |err: cpal::StreamError| {
        error!("Audio stream error: {}", err);
        let _ = events.send(DeviceEvent::Fault(CaptureFault::new(
            "NotReadableError",
            err.to_string(),
        )));
    };

    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => device.build_input_stream(
            &config.clone().into(),
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let mut buffer = buffer.lock();
                for &sample in data {
                    let pcm = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                    buffer.extend_from_slice(&pcm.to_le_bytes());
                }
            },
            err_fn,
            None,
        ),
        cpal::SampleFormat::I16 => device.build_input_stream(
            &config.clone().into(),
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                let mut buffer = buffer.lock();
                for &sample in data {
                    buffer.extend_from_slice(&sample.to_le_bytes());
                }
            },
            err_fn,
            None,
        ),
        cpal::SampleFormat::U16 => device.build_input_stream(
            &config.clone().into(),
            move |data: &[u16], _: &cpal::InputCallbackInfo| {
                let mut buffer = buffer.lock();
                for &sample in data {
                    let pcm = (sample as i32 - 32768) as i16;
                    buffer.extend_from_slice(&pcm.to_le_bytes());
                }
            },
            err_fn,
            None,
        ),
        other => {
            return Err(CaptureFault::new(
                "NotSupportedError",
                format!("unsupported sample format {:?}", other),
            ))
        }
    }
    .map_err(|e| CaptureFault::new("NotReadableError", e.to_string()))?;

    // Some hosts start streams on creation
    if let Err(e) = stream.pause() {
        debug!("Could not pause fresh stream: {}", e);
    }

    let info = StreamInfo {
        id: format!("cpal-{}", label),
        label,
    };
    Ok((stream, info))
}
