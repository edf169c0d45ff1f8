//! Vocalog: real-time voice capture and transcription
//!
//! This library provides the core functionality for:
//! - Gating sessions on microphone/recognition permission (one prompt, cached)
//! - Capturing audio via cpal (supports PipeWire, PulseAudio, ALSA, CoreAudio)
//! - Persisting the raw audio to WAV while the session runs
//! - Streaming recognition with whisper.cpp (partial hypotheses that refine live)
//! - Orchestrating the whole pipeline as a single-session state machine
//!
//! # Architecture
//!
//! ```text
//!                    ┌─────────────────────────────┐
//!                    │      SessionController      │
//!                    │  Idle ▸ Recording ▸ Stopped │
//!                    └─────────────────────────────┘
//!                         │                 │
//!            permission?  │                 │ start/stop
//!                         ▼                 ▼
//!                ┌────────────────┐  ┌──────────────┐
//!                │ PermissionGate │  │ CpalCapture  │
//!                └────────────────┘  └──────────────┘
//!                                           │ audio buffers (ordered)
//!                                           ▼
//!                                ┌─────────────────────┐
//!                                │ DualSinkBroadcaster │
//!                                └─────────────────────┘
//!                                    │             │
//!                         every buffer, both sinks, same order
//!                                    │             │
//!                                    ▼             ▼
//!                           ┌──────────────┐  ┌───────────────────┐
//!                           │ WavFileWriter│  │ WhisperRecognizer │
//!                           └──────────────┘  └───────────────────┘
//!                                  │                  │
//!                                  ▼                  ▼
//!                              audio.wav        transcript (live + final)
//! ```
//!
//! The broadcaster hands every capture buffer to both sinks in arrival
//! order without blocking the capture path. A stopped session stops
//! receiving buffers immediately; recognition is cancelled and drained
//! before the file is finalized, so the recording always contains exactly
//! the audio that was captured.

pub mod audio;
pub mod broadcast;
pub mod cli;
pub mod config;
pub mod error;
pub mod permission;
pub mod recognize;
pub mod session;

pub use config::Config;
pub use error::{Result, VocalogError};
pub use session::{SessionController, SessionResult, SessionState};
