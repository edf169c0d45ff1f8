//! Configuration loading and types for vocalog
//!
//! Configuration is loaded in layers:
//! 1. Built-in defaults
//! 2. Config file (~/.config/vocalog/config.toml)
//! 3. CLI arguments (highest priority)

use crate::error::VocalogError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file content
pub const DEFAULT_CONFIG: &str = r#"# Vocalog Configuration
#
# Location: ~/.config/vocalog/config.toml
# All settings can be overridden via CLI flags

[audio]
# Audio input device ("default" uses system default)
# List devices with: vocalog devices
device = "default"

# Frames per capture buffer handed to the sinks
chunk_frames = 1024

[whisper]
# Model to use for recognition
# Options: tiny, tiny.en, base, base.en, small, small.en, medium, large-v3
# Or provide a path to a custom ggml .bin model file
model = "base.en"

# Language for recognition ("auto" for auto-detection)
language = "en"

# Translate non-English speech to English
translate = false

# Number of CPU threads for inference (omit for auto-detection)
# threads = 4

# How often the accumulated audio is re-decoded into a partial hypothesis
partial_interval_ms = 1500

[session]
# Maximum session duration in seconds (0 = unlimited)
max_duration_secs = 0
"#;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub audio: AudioConfig,

    #[serde(default)]
    pub whisper: WhisperConfig,

    #[serde(default)]
    pub session: SessionConfig,
}

/// Audio capture configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AudioConfig {
    /// PipeWire/PulseAudio device name, or "default"
    #[serde(default = "default_device")]
    pub device: String,

    /// Frames per capture buffer handed to the sinks
    #[serde(default = "default_chunk_frames")]
    pub chunk_frames: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            chunk_frames: default_chunk_frames(),
        }
    }
}

/// Whisper speech-to-text configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WhisperConfig {
    /// Model name (tiny, base, small, ...) or path to a ggml .bin file
    #[serde(default = "default_model")]
    pub model: String,

    /// Language code (en, es, fr, auto, ...)
    #[serde(default = "default_language")]
    pub language: String,

    /// Translate to English if source language is not English
    #[serde(default)]
    pub translate: bool,

    /// Number of threads for inference (None = auto-detect)
    #[serde(default)]
    pub threads: Option<usize>,

    /// Cadence of partial-hypothesis re-decodes in milliseconds
    #[serde(default = "default_partial_interval_ms")]
    pub partial_interval_ms: u64,
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            language: default_language(),
            translate: false,
            threads: None,
            partial_interval_ms: default_partial_interval_ms(),
        }
    }
}

/// Session orchestration configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Maximum session duration in seconds (0 = unlimited safety limit)
    #[serde(default)]
    pub max_duration_secs: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_duration_secs: 0,
        }
    }
}

fn default_device() -> String {
    "default".to_string()
}

fn default_chunk_frames() -> u32 {
    1024
}

fn default_model() -> String {
    "base.en".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_partial_interval_ms() -> u64 {
    1500
}

impl Config {
    /// Load configuration from the given path, or the default location.
    /// A missing file yields the built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, VocalogError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_path() {
                Some(p) => p,
                None => return Ok(Self::default()),
            },
        };

        if !path.exists() {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&contents)
            .map_err(|e| VocalogError::Config(format!("{}: {}", path.display(), e)))?;

        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Default config file location (~/.config/vocalog/config.toml)
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "vocalog")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}
