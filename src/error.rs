//! Error types for vocalog
//!
//! Uses thiserror for ergonomic error definitions. Each pipeline stage
//! (capture, file writing, recognition, session orchestration) has its own
//! error enum so failures can be mapped precisely at the session boundary.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the vocalog application
#[derive(Error, Debug)]
pub enum VocalogError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Audio capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Audio file error: {0}")]
    Write(#[from] WriteError),

    #[error("Recognition error: {0}")]
    Recognition(#[from] RecognitionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to audio capture hardware
#[derive(Error, Debug, Clone)]
pub enum CaptureError {
    #[error("Audio engine failure: {0}")]
    EngineFailure(String),

    #[error("Audio device not found: '{0}'. List devices with: vocalog devices")]
    DeviceNotFound(String),

    #[error("Audio device not found: '{requested}'. {available}")]
    DeviceNotFoundWithList { requested: String, available: String },

    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("Audio stream error: {0}")]
    Stream(String),
}

/// Errors related to writing the session audio file
#[derive(Error, Debug, Clone)]
pub enum WriteError {
    #[error("Failed to create audio file at {path}: {reason}")]
    CreateFailed { path: PathBuf, reason: String },

    #[error("Audio file IO failure: {0}")]
    Io(String),
}

/// Errors related to streaming speech recognition
#[derive(Error, Debug, Clone)]
pub enum RecognitionError {
    #[error("Recognition engine unavailable: {0}")]
    Unavailable(String),

    #[error("Recognition failed: {0}")]
    Failed(String),
}

/// Errors surfaced by the session controller
#[derive(Error, Debug, Clone)]
pub enum SessionError {
    #[error("Microphone or speech recognition permission denied")]
    PermissionDenied,

    #[error("A capture session is already active")]
    AlreadyActive,

    #[error("Audio capture failure: {0}")]
    Engine(#[from] CaptureError),

    #[error("Recognition engine unavailable: {0}")]
    RecognizerUnavailable(String),

    #[error("Audio file failure: {0}")]
    File(#[from] WriteError),

    #[error("Recognition failed mid-session: {0}")]
    Recognition(String),
}

impl From<RecognitionError> for SessionError {
    fn from(e: RecognitionError) -> Self {
        match e {
            RecognitionError::Unavailable(msg) => SessionError::RecognizerUnavailable(msg),
            RecognitionError::Failed(msg) => SessionError::Recognition(msg),
        }
    }
}

/// Result type alias using VocalogError
pub type Result<T> = std::result::Result<T, VocalogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recognition_error_mapping() {
        let unavailable: SessionError =
            RecognitionError::Unavailable("no model".to_string()).into();
        assert!(matches!(unavailable, SessionError::RecognizerUnavailable(_)));

        let failed: SessionError = RecognitionError::Failed("decode".to_string()).into();
        assert!(matches!(failed, SessionError::Recognition(_)));
    }

    #[test]
    fn test_write_error_display_includes_path() {
        let e = WriteError::CreateFailed {
            path: PathBuf::from("/nope/out.wav"),
            reason: "permission denied".to_string(),
        };
        let msg = e.to_string();
        assert!(msg.contains("/nope/out.wav"));
        assert!(msg.contains("permission denied"));
    }
}
