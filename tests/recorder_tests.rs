// Integration tests for the recorder state machine
//
// Every test drives a VirtualMicrophone on paused tokio time; `advance`
// lets the recorder task drain its inputs before assertions.

use anyhow::Result;
use audrec::error::PERMISSION_DENIED_MESSAGE;
use audrec::{
    BusError, CaptureFault, ConfigError, HostProfile, HostServices, Progress, Recorder,
    RecorderError, RecorderEvent, RecorderSettings, RecorderStatus, Recording, VirtualMicrophone,
    VirtualMicrophoneOptions, RECORDER_EVENTS,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct Log {
    /// Names of every event except `recording`, in publication order
    events: Vec<String>,
    ticks: Vec<Progress>,
    recordings: Vec<Recording>,
    errors: Vec<CaptureFault>,
}

struct Harness {
    recorder: Recorder,
    mic: Arc<VirtualMicrophone>,
    log: Arc<Mutex<Log>>,
}

impl Harness {
    fn new(max_duration: &str, options: VirtualMicrophoneOptions, profile: HostProfile) -> Result<Self> {
        let mic = Arc::new(VirtualMicrophone::new(options));
        let settings = RecorderSettings {
            max_duration: max_duration.to_string(),
            ..Default::default()
        };
        let recorder = Recorder::new(settings, mic.clone(), HostServices::with_profile(profile))?;

        let log = Arc::new(Mutex::new(Log::default()));
        for name in RECORDER_EVENTS {
            let log = Arc::clone(&log);
            recorder.on(name, move |event| {
                let mut log = log.lock();
                match event {
                    RecorderEvent::Recording(progress) => log.ticks.push(*progress),
                    RecorderEvent::Stop(recording) => {
                        log.recordings.push(recording.clone());
                        log.events.push(event.name().to_string());
                    }
                    RecorderEvent::Error(fault) => {
                        log.errors.push(fault.clone());
                        log.events.push(event.name().to_string());
                    }
                    _ => log.events.push(event.name().to_string()),
                }
            })?;
        }

        Ok(Self { recorder, mic, log })
    }

    fn standard(max_duration: &str) -> Result<Self> {
        Self::new(max_duration, VirtualMicrophoneOptions::default(), HostProfile::default())
    }

    fn events(&self) -> Vec<String> {
        self.log.lock().events.clone()
    }

    fn count(&self, name: &str) -> usize {
        self.log.lock().events.iter().filter(|e| e.as_str() == name).count()
    }

    fn tick_count(&self) -> usize {
        self.log.lock().ticks.len()
    }

    /// Start recording and wait until the device confirmed it
    async fn record(&self) -> Result<()> {
        self.recorder.request_mic()?;
        self.recorder.start()?;
        advance(50).await;
        assert_eq!(self.recorder.status(), RecorderStatus::Recording);
        Ok(())
    }
}

async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[tokio::test(start_paused = true)]
async fn test_full_session_publishes_one_event_per_transition() -> Result<()> {
    let h = Harness::standard("15:00")?;

    h.recorder.request_mic()?;
    advance(50).await;
    assert_eq!(h.events(), vec!["microphoneAvailable"]);
    assert_eq!(h.recorder.status(), RecorderStatus::Inactive);

    h.recorder.start()?;
    advance(1000).await;
    assert_eq!(h.recorder.status(), RecorderStatus::Recording);

    h.recorder.pause()?;
    advance(500).await;
    assert_eq!(h.recorder.status(), RecorderStatus::Paused);

    h.recorder.resume()?;
    advance(500).await;
    assert_eq!(h.recorder.status(), RecorderStatus::Recording);

    h.recorder.stop()?;
    advance(50).await;
    assert_eq!(h.recorder.status(), RecorderStatus::Inactive);

    assert_eq!(
        h.events(),
        vec!["microphoneAvailable", "start", "pause", "resume", "stop"]
    );
    assert!(h.tick_count() > 10);

    let log = h.log.lock();
    let recording = &log.recordings[0];
    // Paused time is excluded
    assert_eq!(recording.duration, Duration::from_millis(1500));
    assert!(!recording.is_empty());
    assert_eq!(recording.size() % 1024, 0);
    assert!(recording.url.starts_with("blob:audrec/"));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_start_before_microphone_starts_on_grant() -> Result<()> {
    let h = Harness::standard("15:00")?;

    h.recorder.start()?;
    advance(50).await;
    assert!(h.events().is_empty(), "no capture without a microphone");
    assert_eq!(h.recorder.status(), RecorderStatus::Inactive);

    h.recorder.request_mic()?;
    advance(50).await;

    assert_eq!(h.events(), vec!["microphoneAvailable", "start"]);
    assert_eq!(h.recorder.status(), RecorderStatus::Recording);

    h.recorder.stop()?;
    advance(10).await;
    assert_eq!(h.count("stop"), 1);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_redundant_calls_are_noops() -> Result<()> {
    let h = Harness::standard("15:00")?;

    // Before any microphone: nothing to control
    h.recorder.pause()?;
    h.recorder.resume()?;
    h.recorder.stop()?;
    advance(10).await;
    assert!(h.events().is_empty());

    h.record().await?;

    h.recorder.start()?;
    h.recorder.resume()?;
    h.recorder.request_mic()?;
    advance(200).await;
    assert_eq!(h.events(), vec!["microphoneAvailable", "start"]);
    assert_eq!(h.mic.acquisitions(), 1);

    h.recorder.pause()?;
    h.recorder.pause()?;
    advance(10).await;
    assert_eq!(h.count("pause"), 1);

    h.recorder.stop()?;
    h.recorder.stop()?;
    advance(10).await;
    assert_eq!(h.count("stop"), 1);
    assert_eq!(h.recorder.status(), RecorderStatus::Inactive);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_dismiss_is_idempotent() -> Result<()> {
    let h = Harness::standard("15:00")?;

    h.recorder.request_mic()?;
    advance(50).await;

    h.recorder.dismiss_mic()?;
    h.recorder.dismiss_mic()?;
    advance(10).await;

    assert_eq!(h.events(), vec!["microphoneAvailable", "microphoneDismissed"]);
    assert_eq!(h.mic.tracks_stopped(), 1);

    // A fresh request acquires the microphone again
    h.recorder.request_microphone()?;
    advance(50).await;
    assert_eq!(h.count("microphoneAvailable"), 2);
    assert_eq!(h.mic.acquisitions(), 2);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_dismiss_while_recording_stops_first() -> Result<()> {
    let h = Harness::standard("15:00")?;
    h.record().await?;
    advance(600).await;

    h.recorder.dismiss_microphone()?;
    advance(10).await;

    assert_eq!(h.recorder.status(), RecorderStatus::Inactive);
    assert_eq!(h.mic.tracks_stopped(), 1);
    assert_eq!(
        h.events(),
        vec!["microphoneAvailable", "start", "microphoneDismissed", "stop"]
    );

    // Fragments collected before dismissal were discarded; only the final flush remains
    let log = h.log.lock();
    assert_eq!(log.recordings[0].chunk_count, 1);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_dismiss_cancels_pending_request() -> Result<()> {
    let h = Harness::new(
        "15:00",
        VirtualMicrophoneOptions {
            grant_delay: Duration::from_secs(5),
            ..Default::default()
        },
        HostProfile::default(),
    )?;

    h.recorder.start()?;
    h.recorder.request_mic()?;
    advance(100).await;
    h.recorder.dismiss_mic()?;
    advance(10_000).await;

    assert!(h.events().is_empty());
    assert_eq!(h.mic.acquisitions(), 0);
    assert_eq!(h.recorder.status(), RecorderStatus::Inactive);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_dismiss_releases_microphone_granted_meanwhile() -> Result<()> {
    let h = Harness::standard("15:00")?;

    h.recorder.request_mic()?;
    tokio::task::yield_now().await;
    // Permission answered, recorder task not yet polled
    tokio::time::advance(Duration::from_millis(10)).await;
    h.recorder.dismiss_mic()?;
    advance(100).await;

    assert_eq!(h.mic.acquisitions(), 1);
    assert_eq!(h.mic.tracks_stopped(), h.mic.acquisitions());
    assert_eq!(h.recorder.status(), RecorderStatus::Inactive);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_denied_permission_publishes_normalized_error() -> Result<()> {
    let h = Harness::new(
        "15:00",
        VirtualMicrophoneOptions {
            deny: true,
            ..Default::default()
        },
        HostProfile::default(),
    )?;

    h.recorder.start()?;
    h.recorder.request_mic()?;
    advance(50).await;

    assert_eq!(h.events(), vec!["error"]);
    {
        let log = h.log.lock();
        assert_eq!(log.errors[0].name, "NotAllowedError");
        assert_eq!(log.errors[0].message, PERMISSION_DENIED_MESSAGE);
    }
    assert_eq!(h.recorder.status(), RecorderStatus::Inactive);

    // The session stays usable: a retry asks again
    h.recorder.request_mic()?;
    advance(50).await;
    assert_eq!(h.count("error"), 2);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_watchdog_stops_overrunning_recording() -> Result<()> {
    let h = Harness::standard("2")?;
    h.record().await?;

    advance(3000).await;

    assert_eq!(h.recorder.status(), RecorderStatus::Inactive);
    assert_eq!(h.count("stop"), 1);

    let log = h.log.lock();
    let complete: Vec<_> = log.ticks.iter().filter(|p| p.left_ms == 0).collect();
    assert_eq!(complete.len(), 1, "timer reports completion once");
    assert_eq!(complete[0].spent_ms, 2000);

    // Capture ran past the limit by the watchdog margin, not indefinitely
    let duration = log.recordings[0].duration;
    assert!(duration >= Duration::from_secs(2));
    assert!(duration <= Duration::from_millis(2500));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_watchdog_accounts_for_pauses() -> Result<()> {
    let h = Harness::standard("2")?;
    h.record().await?;

    advance(1000).await;
    h.recorder.pause()?;
    advance(5000).await;
    assert_eq!(h.recorder.status(), RecorderStatus::Paused, "no auto-stop while paused");

    h.recorder.resume()?;
    advance(900).await;
    assert_eq!(h.recorder.status(), RecorderStatus::Recording);

    advance(1000).await;
    assert_eq!(h.recorder.status(), RecorderStatus::Inactive);
    assert_eq!(h.count("stop"), 1);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_emulated_acknowledgments() -> Result<()> {
    let h = Harness::new(
        "15:00",
        VirtualMicrophoneOptions {
            acknowledge_pause: false,
            ..Default::default()
        },
        HostProfile {
            synthesize_pause_acks: true,
        },
    )?;
    h.record().await?;
    advance(500).await;

    h.recorder.pause()?;
    advance(200).await;
    assert_eq!(h.count("pause"), 1);

    // Timer is really paused
    let ticks = h.tick_count();
    advance(1000).await;
    assert_eq!(h.tick_count(), ticks);

    h.recorder.resume()?;
    advance(200).await;
    assert_eq!(h.count("resume"), 1);
    assert!(h.tick_count() > ticks);

    h.recorder.stop()?;
    advance(10).await;
    assert_eq!(
        h.events(),
        vec!["microphoneAvailable", "start", "pause", "resume", "stop"]
    );

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_late_acknowledgment_after_emulation_is_ignored() -> Result<()> {
    // Emulation enabled while the device also acknowledges
    let h = Harness::new(
        "15:00",
        VirtualMicrophoneOptions::default(),
        HostProfile {
            synthesize_pause_acks: true,
        },
    )?;
    h.record().await?;

    h.recorder.pause()?;
    advance(300).await;
    h.recorder.resume()?;
    advance(300).await;

    assert_eq!(h.count("pause"), 1);
    assert_eq!(h.count("resume"), 1);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_pause_before_start_acknowledgment() -> Result<()> {
    let acknowledging = Harness::standard("15:00")?;
    let emulated = Harness::new(
        "15:00",
        VirtualMicrophoneOptions {
            acknowledge_pause: false,
            ..Default::default()
        },
        HostProfile {
            synthesize_pause_acks: true,
        },
    )?;

    for h in [acknowledging, emulated] {
        h.recorder.request_mic()?;
        advance(50).await;

        h.recorder.start()?;
        h.recorder.pause()?;
        advance(100).await;
        assert_eq!(h.recorder.status(), RecorderStatus::Paused);
        let ticks = h.tick_count();

        h.recorder.resume()?;
        advance(2000).await;
        assert_eq!(h.recorder.status(), RecorderStatus::Recording);

        // Timer runs again after the resume
        assert!(h.tick_count() > ticks + 10);
        let last = h.log.lock().ticks.last().copied();
        assert!(last.is_some_and(|progress| progress.spent_ms >= 1900));
        assert_eq!(
            h.events(),
            vec!["microphoneAvailable", "start", "pause", "resume"]
        );

        h.recorder.shutdown().await?;
    }

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_recording_handlers_fire_in_subscription_order() -> Result<()> {
    let h = Harness::standard("15:00")?;
    let order = Arc::new(Mutex::new(Vec::new()));

    for tag in ["a", "b"] {
        let order = Arc::clone(&order);
        h.recorder.on("recording", move |_| order.lock().push(tag))?;
    }

    h.record().await?;
    advance(300).await;

    let order = order.lock();
    assert!(order.len() >= 4);
    assert!(order.chunks(2).all(|pair| pair == ["a", "b"]));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_off_removes_handler() -> Result<()> {
    let h = Harness::standard("15:00")?;
    let calls = Arc::new(Mutex::new(0));

    let id = {
        let calls = Arc::clone(&calls);
        h.recorder.on("microphoneAvailable", move |_| *calls.lock() += 1)?
    };
    h.recorder.off("microphoneAvailable", Some(id))?;

    h.recorder.request_mic()?;
    advance(50).await;
    assert_eq!(*calls.lock(), 0);
    assert_eq!(h.count("microphoneAvailable"), 1);

    assert_eq!(
        h.recorder.on("finished", |_| {}).err(),
        Some(RecorderError::Bus(BusError::UnknownEvent("finished".to_string())))
    );

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_device_fault_is_reported() -> Result<()> {
    let h = Harness::standard("15:00")?;
    h.record().await?;

    assert!(h.mic.emit_fault(CaptureFault::new("NotReadableError", "device unplugged")));
    advance(10).await;

    assert_eq!(h.count("error"), 1);
    assert_eq!(h.log.lock().errors[0].message, "device unplugged");
    assert_eq!(h.recorder.status(), RecorderStatus::Recording);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_releases_microphone() -> Result<()> {
    let h = Harness::standard("15:00")?;
    h.record().await?;

    h.recorder.shutdown().await?;
    advance(10).await;

    assert_eq!(h.mic.tracks_stopped(), 1);
    assert_eq!(h.count("microphoneDismissed"), 1);
    assert_eq!(h.recorder.start(), Err(RecorderError::Closed));

    Ok(())
}

#[tokio::test]
async fn test_invalid_configuration_fails_synchronously() {
    let mic = Arc::new(VirtualMicrophone::default());

    let settings = RecorderSettings {
        format: "audio/flac".to_string(),
        ..Default::default()
    };
    assert_eq!(
        Recorder::new(settings, mic.clone(), HostServices::default()).err(),
        Some(ConfigError::UnsupportedFormat("audio/flac".to_string()))
    );

    let settings = RecorderSettings {
        max_duration: "ten minutes".to_string(),
        ..Default::default()
    };
    assert!(matches!(
        Recorder::new(settings, mic, HostServices::default()),
        Err(ConfigError::InvalidTime(_))
    ));
}
