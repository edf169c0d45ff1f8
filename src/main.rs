//! Vocalog - real-time voice capture and transcription
//!
//! Run `vocalog record` to capture from the microphone while watching the
//! transcript refine live. Use `vocalog devices` to list inputs and
//! `vocalog transcribe <file>` to transcribe an existing recording.

use clap::Parser;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use vocalog::audio::cpal_capture::{self, CpalCapture};
use vocalog::audio::AudioCapture;
use vocalog::cli::{Cli, Commands};
use vocalog::config::Config;
use vocalog::permission::{AutoGrantPrompter, PermissionGate};
use vocalog::recognize::whisper::WhisperRecognizer;
use vocalog::session::SessionController;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("vocalog={},warn", log_level))),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Load configuration
    let mut config = Config::load(cli.config.as_deref())?;

    // Apply CLI overrides
    if let Some(model) = cli.model {
        config.whisper.model = model;
    }
    if let Some(device) = cli.device {
        config.audio.device = device;
    }

    // Run the appropriate command
    match cli.command.unwrap_or(Commands::Record {
        output: None,
        duration: None,
    }) {
        Commands::Record { output, duration } => {
            record(&config, output, duration).await?;
        }

        Commands::Devices => {
            list_devices()?;
        }

        Commands::Transcribe { file } => {
            transcribe_file(&config, &file)?;
        }

        Commands::Config => {
            show_config(&config);
        }
    }

    Ok(())
}

/// Run one capture session, streaming the live transcript to stderr
async fn record(
    config: &Config,
    output: Option<PathBuf>,
    duration: Option<u64>,
) -> anyhow::Result<()> {
    let output_path = output.unwrap_or_else(|| {
        PathBuf::from(format!(
            "vocalog-{}.wav",
            chrono::Local::now().format("%Y%m%d-%H%M%S")
        ))
    });

    let recognizer = Arc::new(WhisperRecognizer::new(&config.whisper)?);
    let gate = PermissionGate::new(Box::new(AutoGrantPrompter));

    let audio_config = config.audio.clone();
    let factory = Box::new(move || {
        Box::new(CpalCapture::new(&audio_config)) as Box<dyn AudioCapture>
    });

    let controller = SessionController::new(gate, factory, recognizer, &config.session);

    // Surface mid-session failures without interrupting the recording
    if let Some(mut failures) = controller.take_failures().await {
        tokio::spawn(async move {
            while let Some(err) = failures.recv().await {
                tracing::error!("Session degraded: {}", err);
            }
        });
    }

    controller.start(&output_path).await?;
    eprintln!("Recording to {} (Ctrl-C to stop)", output_path.display());

    // Mirror the latest hypothesis onto one terminal line as it refines
    let mut live = controller.live_transcript();
    let live_task = tokio::spawn(async move {
        while live.changed().await.is_ok() {
            let text = live.borrow_and_update().clone();
            if !text.is_empty() {
                eprint!("\r{}", text);
                let _ = std::io::stderr().flush();
            }
        }
    });

    match duration {
        Some(secs) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = tokio::time::sleep(std::time::Duration::from_secs(secs)) => {}
            }
        }
        None => {
            let _ = tokio::signal::ctrl_c().await;
        }
    }

    let result = controller.stop().await;
    live_task.abort();
    eprintln!();

    if !result.transcript.is_empty() {
        println!("{}", result.transcript);
    }
    if let Some(path) = &result.audio_path {
        eprintln!("Audio saved to {}", path.display());
    }
    if let Some(err) = result.error {
        return Err(err.into());
    }
    Ok(())
}

/// List input devices the capture engine can open
fn list_devices() -> anyhow::Result<()> {
    let devices = cpal_capture::list_input_devices()?;
    if devices.is_empty() {
        println!("No audio input devices found");
        return Ok(());
    }
    println!("Available input devices:");
    for name in devices {
        println!("  {}", name);
    }
    Ok(())
}

/// Transcribe an existing audio file offline
fn transcribe_file(config: &Config, path: &PathBuf) -> anyhow::Result<()> {
    tracing::info!("Transcribing {}", path.display());
    let recognizer = WhisperRecognizer::new(&config.whisper)?;
    let text = recognizer.transcribe_file(path)?;
    println!("{}", text);
    Ok(())
}

fn show_config(config: &Config) {
    println!("Current Configuration\n");
    println!("[audio]");
    println!("  device = {:?}", config.audio.device);
    println!("  chunk_frames = {}", config.audio.chunk_frames);

    println!("\n[whisper]");
    println!("  model = {:?}", config.whisper.model);
    println!("  language = {:?}", config.whisper.language);
    println!("  translate = {}", config.whisper.translate);
    println!("  threads = {:?}", config.whisper.threads);
    println!("  partial_interval_ms = {}", config.whisper.partial_interval_ms);

    println!("\n[session]");
    println!("  max_duration_secs = {}", config.session.max_duration_secs);

    if let Some(path) = Config::default_path() {
        println!("\nConfig file: {}", path.display());
    }
}
