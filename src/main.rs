use anyhow::{bail, Context, Result};
use audrec::{
    time_to_milliseconds, BackendKind, Config, HostServices, Microphone, Recorder, RecorderEvent,
    RecorderStatus, Recording, VirtualMicrophone,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Record from the microphone until Ctrl+C or the maximum duration
#[derive(Parser, Debug)]
#[command(name = "audrec", version)]
struct Args {
    /// Configuration file (extension optional)
    #[arg(long, default_value = "config/audrec")]
    config: String,

    /// Recording MIME type (overrides configuration)
    #[arg(long)]
    format: Option<String>,

    /// Maximum duration as hh:mm:ss, mm:ss or ss (overrides configuration)
    #[arg(long)]
    max_duration: Option<String>,

    /// Microphone backend (overrides configuration)
    #[arg(long, value_enum)]
    backend: Option<BackendKind>,

    /// Pause once this much time has been recorded (hh:mm:ss, mm:ss or ss)
    #[arg(long)]
    pause_at: Option<String>,

    /// How long the scripted pause lasts
    #[arg(long, default_value = "2")]
    pause_for: String,

    /// Print the recording summary as JSON
    #[arg(long)]
    json: bool,

    /// Write the recorded bytes to this file, or into this directory
    /// under a generated name
    #[arg(long)]
    output: Option<PathBuf>,
}

/// What the event handlers forward to the main loop
enum Outcome {
    Finished(Recording),
    Failed(String),
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let mut cfg = Config::load(&args.config)?;
    if let Some(format) = args.format {
        cfg.recorder.format = format;
    }
    if let Some(max_duration) = args.max_duration {
        cfg.recorder.max_duration = max_duration;
    }
    if let Some(backend) = args.backend {
        cfg.host.backend = backend;
    }

    let pause_at = args
        .pause_at
        .as_deref()
        .map(time_to_milliseconds)
        .transpose()
        .context("Invalid --pause-at")?;
    let pause_for = Duration::from_millis(
        time_to_milliseconds(&args.pause_for).context("Invalid --pause-for")?,
    );

    info!("audrec v{}", env!("CARGO_PKG_VERSION"));

    let microphone = create_microphone(cfg.host.backend)?;
    let host = HostServices::with_profile(cfg.host.profile());
    let recorder = Recorder::new(cfg.recorder, microphone, host).context("Invalid recorder settings")?;

    info!(
        "Recording {} for at most {}",
        recorder.format(),
        Recorder::milliseconds_to_time(recorder.max_duration().as_millis() as u64, false)
    );

    let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel();
    let spent = Arc::new(AtomicU64::new(0));
    subscribe(&recorder, outcome_tx, Arc::clone(&spent))?;

    recorder.start()?;
    recorder.request_mic()?;

    let mut paused = false;
    let mut poll = tokio::time::interval(Duration::from_millis(100));
    let outcome = loop {
        tokio::select! {
            outcome = outcome_rx.recv() => {
                match outcome {
                    Some(outcome) => break outcome,
                    None => bail!("Recorder closed unexpectedly"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                if recorder.status() == RecorderStatus::Inactive {
                    info!("Interrupted before recording started");
                    recorder.shutdown().await?;
                    return Ok(());
                }
                info!("Interrupted, stopping");
                recorder.stop()?;
            }
            _ = poll.tick() => {
                if let Some(at) = pause_at {
                    if !paused && spent.load(Ordering::Relaxed) >= at {
                        paused = true;
                        info!("Pausing for {}s", pause_for.as_secs());
                        recorder.pause()?;
                        let handle = recorder.clone();
                        tokio::spawn(async move {
                            tokio::time::sleep(pause_for).await;
                            if let Err(e) = handle.resume() {
                                warn!("Failed to resume: {}", e);
                            }
                        });
                    }
                }
            }
        }
    };

    recorder.shutdown().await?;

    match outcome {
        Outcome::Finished(recording) => {
            if let Some(mut path) = args.output {
                if tokio::fs::metadata(&path).await.is_ok_and(|meta| meta.is_dir()) {
                    path.push(recording.file_name());
                }
                tokio::fs::write(&path, recording.data())
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                info!("Saved {} bytes to {}", recording.size(), path.display());
            }
            print_summary(&recording, args.json)?;
            Ok(())
        }
        Outcome::Failed(message) => bail!("Recording failed: {}", message),
    }
}

fn create_microphone(backend: BackendKind) -> Result<Arc<dyn Microphone>> {
    match backend {
        BackendKind::Virtual => Ok(Arc::new(VirtualMicrophone::default())),
        BackendKind::Cpal => {
            #[cfg(feature = "cpal-backend")]
            {
                Ok(Arc::new(audrec::CpalMicrophone::default()))
            }

            #[cfg(not(feature = "cpal-backend"))]
            {
                bail!("The cpal backend requires building with --features cpal-backend")
            }
        }
    }
}

fn subscribe(
    recorder: &Recorder,
    outcome_tx: mpsc::UnboundedSender<Outcome>,
    spent: Arc<AtomicU64>,
) -> Result<()> {
    recorder.on("microphoneAvailable", |event| {
        if let RecorderEvent::MicrophoneAvailable(stream) = event {
            info!("Microphone: {}", stream.label);
        }
    })?;

    recorder.on("start", |_| info!("Recording started"))?;
    recorder.on("pause", |_| info!("Recording paused"))?;
    recorder.on("resume", |_| info!("Recording resumed"))?;

    let last_second = AtomicU64::new(u64::MAX);
    recorder.on("recording", move |event| {
        if let RecorderEvent::Recording(progress) = event {
            spent.store(progress.spent_ms, Ordering::Relaxed);
            let second = progress.spent_ms / 1000;
            if last_second.swap(second, Ordering::Relaxed) != second {
                info!(
                    "{} elapsed, {} left ({:.0}%)",
                    Recorder::milliseconds_to_time(progress.spent_ms, true),
                    Recorder::milliseconds_to_time(progress.left_ms, true),
                    progress.percentage
                );
            }
        }
    })?;

    let stop_tx = outcome_tx.clone();
    recorder.on("stop", move |event| {
        if let RecorderEvent::Stop(recording) = event {
            let _ = stop_tx.send(Outcome::Finished(recording.clone()));
        }
    })?;

    recorder.on("error", move |event| {
        if let RecorderEvent::Error(fault) = event {
            error!("{}", fault);
            let _ = outcome_tx.send(Outcome::Failed(fault.to_string()));
        }
    })?;

    Ok(())
}

fn print_summary(recording: &Recording, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(recording)?);
        return Ok(());
    }

    println!("Recording {}", recording.url);
    println!("  format:   {}", recording.format);
    println!(
        "  duration: {}",
        Recorder::milliseconds_to_time(recording.duration.as_millis() as u64, false)
    );
    println!("  size:     {} bytes in {} chunks", recording.size(), recording.chunk_count);
    println!("  created:  {}", recording.created_at.to_rfc3339());
    Ok(())
}
