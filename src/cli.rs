// Command-line interface definitions for vocalog
//
// Kept separate from main.rs so the argument surface is testable on its
// own.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "vocalog")]
#[command(author, version, about = "Real-time voice capture and transcription")]
#[command(long_about = "
Vocalog records from a microphone while transcribing the speech live.
Each session produces two artifacts: a WAV file of the raw audio and a
transcript that improves as recognition refines its hypotheses.

USAGE:
  vocalog record              record until Ctrl-C, then print the transcript
  vocalog record -d 30        record for 30 seconds
  vocalog devices             list available input devices
  vocalog transcribe f.wav    transcribe an existing recording
")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<std::path::PathBuf>,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Override whisper model (tiny, base, small, medium, large-v3)
    #[arg(long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Override input device by name
    #[arg(long, value_name = "DEVICE")]
    pub device: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Record and transcribe until interrupted (default if no command)
    Record {
        /// Where to write the WAV file (default: vocalog-<timestamp>.wav)
        #[arg(short, long, value_name = "FILE")]
        output: Option<std::path::PathBuf>,

        /// Stop automatically after this many seconds
        #[arg(short, long, value_name = "SECS")]
        duration: Option<u64>,
    },

    /// List available audio input devices
    Devices,

    /// Transcribe an existing audio file (WAV)
    Transcribe {
        /// Path to audio file
        file: std::path::PathBuf,
    },

    /// Show current configuration
    Config,
}
