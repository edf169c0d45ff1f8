//! State machine for a capture session
//!
//! Defines the lifecycle of one recording session:
//! Idle -> Starting -> Recording -> Stopping -> Stopped
//! with Failed as the terminal state for any error after Idle.
//!
//! Transitions are total: an invalid transition is a no-op rather than a
//! panic, since user-triggered races (double-tap on stop) must not crash.

use std::time::Instant;

/// Session lifecycle state
#[derive(Debug, Clone, Default)]
pub enum SessionState {
    /// No session in progress
    #[default]
    Idle,

    /// Permissions, file, capture, and recognizer are being brought up
    Starting {
        /// When start() was accepted
        since: Instant,
    },

    /// Buffers are flowing to both sinks
    Recording {
        /// When recording began
        started_at: Instant,
    },

    /// Teardown in fixed order: capture halt, recognizer cancel, finalize
    Stopping {
        /// When recording began
        started_at: Instant,
    },

    /// Session completed normally
    Stopped,

    /// Session hit a terminal error; partial results are preserved
    Failed,
}

impl SessionState {
    /// Create a new idle state
    pub fn new() -> Self {
        SessionState::Idle
    }

    /// Check if no session is in progress
    pub fn is_idle(&self) -> bool {
        matches!(self, SessionState::Idle)
    }

    /// Check if the session is starting up
    pub fn is_starting(&self) -> bool {
        matches!(self, SessionState::Starting { .. })
    }

    /// Check if actively recording
    pub fn is_recording(&self) -> bool {
        matches!(self, SessionState::Recording { .. })
    }

    /// Check if tearing down
    pub fn is_stopping(&self) -> bool {
        matches!(self, SessionState::Stopping { .. })
    }

    /// Check if in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Stopped | SessionState::Failed)
    }

    /// Check if a session occupies the controller (Starting/Recording/Stopping)
    pub fn is_active(&self) -> bool {
        self.is_starting() || self.is_recording() || self.is_stopping()
    }

    /// Time since recording began, if it has
    pub fn recording_duration(&self) -> Option<std::time::Duration> {
        match self {
            SessionState::Recording { started_at } | SessionState::Stopping { started_at } => {
                Some(started_at.elapsed())
            }
            _ => None,
        }
    }

    /// Begin starting a session (only valid from Idle)
    pub fn begin(self) -> Self {
        match self {
            SessionState::Idle => SessionState::Starting {
                since: Instant::now(),
            },
            other => other,
        }
    }

    /// Startup succeeded (only valid from Starting)
    pub fn recording(self) -> Self {
        match self {
            SessionState::Starting { .. } => SessionState::Recording {
                started_at: Instant::now(),
            },
            other => other,
        }
    }

    /// Begin teardown (only valid from Recording)
    pub fn stopping(self) -> Self {
        match self {
            SessionState::Recording { started_at } => SessionState::Stopping { started_at },
            other => other,
        }
    }

    /// Teardown completed (only valid from Stopping)
    pub fn stopped(self) -> Self {
        match self {
            SessionState::Stopping { .. } => SessionState::Stopped,
            other => other,
        }
    }

    /// Record a terminal failure (valid from any non-idle, non-terminal state)
    pub fn fail(self) -> Self {
        match self {
            SessionState::Starting { .. }
            | SessionState::Recording { .. }
            | SessionState::Stopping { .. } => SessionState::Failed,
            other => other,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Starting { since } => {
                write!(f, "Starting ({:.1}s)", since.elapsed().as_secs_f32())
            }
            SessionState::Recording { started_at } => {
                write!(f, "Recording ({:.1}s)", started_at.elapsed().as_secs_f32())
            }
            SessionState::Stopping { .. } => write!(f, "Stopping"),
            SessionState::Stopped => write!(f, "Stopped"),
            SessionState::Failed => write!(f, "Failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_new_state_is_idle() {
        let state = SessionState::new();
        assert!(state.is_idle());
        assert!(!state.is_active());
    }

    #[test]
    fn test_default_is_idle() {
        assert!(SessionState::default().is_idle());
    }

    #[test]
    fn test_full_lifecycle() {
        let state = SessionState::new().begin();
        assert!(state.is_starting());
        assert!(state.is_active());

        let state = state.recording();
        assert!(state.is_recording());

        let state = state.stopping();
        assert!(state.is_stopping());
        assert!(state.is_active());

        let state = state.stopped();
        assert!(state.is_terminal());
        assert!(!state.is_active());
    }

    #[test]
    fn test_begin_from_non_idle_is_noop() {
        let recording = SessionState::new().begin().recording();
        assert!(recording.begin().is_recording());

        let stopped = SessionState::Stopped;
        assert!(stopped.begin().is_terminal());
    }

    #[test]
    fn test_recording_requires_starting() {
        assert!(SessionState::Idle.recording().is_idle());
        assert!(SessionState::Stopped.recording().is_terminal());
    }

    #[test]
    fn test_stopping_requires_recording() {
        assert!(SessionState::Idle.stopping().is_idle());
        let starting = SessionState::new().begin();
        assert!(starting.stopping().is_starting());
    }

    #[test]
    fn test_stopped_requires_stopping() {
        assert!(SessionState::Idle.stopped().is_idle());
        let recording = SessionState::new().begin().recording();
        assert!(recording.stopped().is_recording());
    }

    #[test]
    fn test_fail_from_starting() {
        let state = SessionState::new().begin().fail();
        assert!(state.is_terminal());
        assert!(matches!(state, SessionState::Failed));
    }

    #[test]
    fn test_fail_from_recording() {
        let state = SessionState::new().begin().recording().fail();
        assert!(matches!(state, SessionState::Failed));
    }

    #[test]
    fn test_fail_from_stopping() {
        let state = SessionState::new().begin().recording().stopping().fail();
        assert!(matches!(state, SessionState::Failed));
    }

    #[test]
    fn test_fail_from_idle_is_noop() {
        assert!(SessionState::Idle.fail().is_idle());
    }

    #[test]
    fn test_fail_from_stopped_is_noop() {
        assert!(matches!(SessionState::Stopped.fail(), SessionState::Stopped));
    }

    #[test]
    fn test_recording_duration() {
        let state = SessionState::new().begin().recording();
        std::thread::sleep(Duration::from_millis(10));
        assert!(state.recording_duration().unwrap() >= Duration::from_millis(10));
    }

    #[test]
    fn test_recording_duration_survives_stopping() {
        let state = SessionState::new().begin().recording().stopping();
        assert!(state.recording_duration().is_some());
    }

    #[test]
    fn test_idle_has_no_duration() {
        assert!(SessionState::Idle.recording_duration().is_none());
        assert!(SessionState::new().begin().recording_duration().is_none());
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", SessionState::Idle), "Idle");
        assert_eq!(format!("{}", SessionState::Stopped), "Stopped");
        assert_eq!(format!("{}", SessionState::Failed), "Failed");

        let recording = SessionState::new().begin().recording();
        assert!(format!("{}", recording).starts_with("Recording"));
    }
}
