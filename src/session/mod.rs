//! Session orchestration
//!
//! The controller owns at most one capture session at a time and is the
//! only surface exposed to collaborators. All mutation of the session
//! happens inside one task fed by channels (capture buffers, recognition
//! events, sink events, stop commands), so no ambient locking is needed
//! around session state.
//!
//! Startup and teardown follow a fixed order. Startup: permission gate,
//! capture engine (the hardware dictates the recording format), file
//! writer, recognizer; any failure tears down whatever already opened and
//! reports synchronously. Teardown: capture halt first, so no buffer is
//! ever fed to a cancelled recognizer or a closing file, then recognizer
//! cancel/drain, then file finalize.

pub mod state;

pub use state::SessionState;

use crate::audio::writer::{FinalizedAudio, WavFileWriter};
use crate::audio::{AudioBuffer, AudioCapture, AudioFormat, CaptureStream};
use crate::broadcast::{DualSinkBroadcaster, SessionHandle, SessionRegistry};
use crate::config::SessionConfig;
use crate::error::{SessionError, WriteError};
use crate::permission::PermissionGate;
use crate::recognize::{
    HypothesisFilter, RecognitionEvent, RecognitionHandle, StreamingRecognizer,
    TranscriptHypothesis,
};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Factory for per-session capture engines; each session gets a fresh one
pub type CaptureFactory = Box<dyn Fn() -> Box<dyn AudioCapture> + Send + Sync>;

/// Immutable snapshot handed to collaborators when a session ends.
///
/// `audio_path` is None only if the recording file was never successfully
/// created; a mid-session failure still yields the path of whatever audio
/// was captured up to that point.
#[derive(Debug, Clone, Default)]
pub struct SessionResult {
    pub transcript: String,
    pub audio_path: Option<PathBuf>,
    pub error: Option<SessionError>,
}

/// The one active capture session, owned by its session task
struct CaptureSession {
    id: Uuid,
    state: SessionState,
    started_at: DateTime<Utc>,
    output_path: PathBuf,
    format: AudioFormat,
    live_transcript: String,
    final_transcript: Option<String>,
    error: Option<SessionError>,
}

/// Events from the writer sink into the session task
enum SinkEvent {
    WriteFailed(WriteError),
}

struct ActiveSession {
    id: Uuid,
    cmd_tx: mpsc::UnboundedSender<oneshot::Sender<SessionResult>>,
    task: JoinHandle<SessionResult>,
}

struct Inner {
    gate: PermissionGate,
    capture_factory: CaptureFactory,
    recognizer: Arc<dyn StreamingRecognizer>,
    registry: Arc<SessionRegistry>,
    live_tx: watch::Sender<String>,
    failure_tx: mpsc::Sender<SessionError>,
    failure_rx: Option<mpsc::Receiver<SessionError>>,
    max_duration: Option<Duration>,
    active: Option<ActiveSession>,
}

/// Orchestrates capture, recognition, and file writing for one session
/// at a time.
///
/// Cloneable; all clones share one controller. `start` and `stop`
/// serialize on an internal async mutex, so a `stop` racing an in-flight
/// `start` queues until startup resolves instead of observing a
/// half-initialized session.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Mutex<Inner>>,
    live_rx: watch::Receiver<String>,
}

impl SessionController {
    pub fn new(
        gate: PermissionGate,
        capture_factory: CaptureFactory,
        recognizer: Arc<dyn StreamingRecognizer>,
        config: &SessionConfig,
    ) -> Self {
        let (live_tx, live_rx) = watch::channel(String::new());
        let (failure_tx, failure_rx) = mpsc::channel(4);

        let max_duration = (config.max_duration_secs > 0)
            .then(|| Duration::from_secs(config.max_duration_secs as u64));

        Self {
            inner: Arc::new(Mutex::new(Inner {
                gate,
                capture_factory,
                recognizer,
                registry: SessionRegistry::new(),
                live_tx,
                failure_tx,
                failure_rx: Some(failure_rx),
                max_duration,
                active: None,
            })),
            live_rx,
        }
    }

    /// Begin a capture session writing to `output_path`.
    ///
    /// Rejected with `AlreadyActive` while a session is live. Any failure
    /// during startup aborts atomically: nothing partially running
    /// survives, and the error is returned to this caller.
    pub async fn start(&self, output_path: &Path) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        if inner.active.is_some() {
            return Err(SessionError::AlreadyActive);
        }

        let id = Uuid::new_v4();
        let state = SessionState::new().begin();
        tracing::info!(session = %id, path = %output_path.display(), "Starting capture session");

        let snapshot = inner.gate.check_and_request().await;
        if !snapshot.is_granted() {
            tracing::warn!(session = %id, "Permission denied, session not started");
            return Err(SessionError::PermissionDenied);
        }

        // Capture first: the hardware dictates the format the file and
        // the recognizer session are opened with
        let mut capture = (inner.capture_factory)();
        let stream = capture.start().await.map_err(SessionError::Engine)?;
        let format = stream.format;

        let writer = match WavFileWriter::open(output_path, format) {
            Ok(w) => w,
            Err(e) => {
                let _ = capture.stop().await;
                return Err(SessionError::File(e));
            }
        };

        let rec_handle = match inner.recognizer.begin_session(format).await {
            Ok(h) => h,
            Err(e) => {
                let _ = capture.stop().await;
                // No frames were appended; don't leave a stray empty file
                drop(writer);
                let _ = std::fs::remove_file(output_path);
                return Err(e.into());
            }
        };

        let handle = inner.registry.register();
        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        let (sink_tx, sink_rx) = mpsc::unbounded_channel();
        let writer_task = spawn_writer(writer, writer_rx, sink_tx);
        let broadcaster = DualSinkBroadcaster::new(handle.clone(), writer_tx, rec_handle.feeder());

        let session = CaptureSession {
            id,
            state: state.recording(),
            started_at: Utc::now(),
            output_path: output_path.to_path_buf(),
            format,
            live_transcript: String::new(),
            final_transcript: None,
            error: None,
        };

        let _ = inner.live_tx.send(String::new());

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_session(SessionTask {
            session,
            capture,
            stream,
            rec_handle,
            broadcaster,
            handle,
            writer_task,
            sink_rx,
            cmd_rx,
            live_tx: inner.live_tx.clone(),
            failure_tx: inner.failure_tx.clone(),
            max_duration: inner.max_duration,
        }));

        inner.active = Some(ActiveSession { id, cmd_tx, task });
        Ok(())
    }

    /// Stop the active session and return its result.
    ///
    /// Idempotent: with no session in flight this returns an empty result
    /// rather than an error. Always returns; teardown is cooperatively
    /// driven rather than bounded by external timeouts.
    pub async fn stop(&self) -> SessionResult {
        let mut inner = self.inner.lock().await;
        let Some(active) = inner.active.take() else {
            tracing::debug!("stop() with no active session");
            return SessionResult::default();
        };

        tracing::debug!(session = %active.id, "Stop requested");
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = active.cmd_tx.send(reply_tx);

        match reply_rx.await {
            Ok(result) => {
                let _ = active.task.await;
                result
            }
            // Task already finished (e.g. max-duration stop raced us)
            Err(_) => active.task.await.unwrap_or_default(),
        }
    }

    /// Observable live transcript: the text of the highest-sequence
    /// hypothesis seen so far, reset to empty at each session start.
    pub fn live_transcript(&self) -> watch::Receiver<String> {
        self.live_rx.clone()
    }

    /// Take the failure notification channel (at most one notification
    /// per session). Returns None if already taken.
    pub async fn take_failures(&self) -> Option<mpsc::Receiver<SessionError>> {
        self.inner.lock().await.failure_rx.take()
    }
}

struct SessionTask {
    session: CaptureSession,
    capture: Box<dyn AudioCapture>,
    stream: CaptureStream,
    rec_handle: RecognitionHandle,
    broadcaster: DualSinkBroadcaster,
    handle: SessionHandle,
    writer_task: JoinHandle<Result<FinalizedAudio, WriteError>>,
    sink_rx: mpsc::UnboundedReceiver<SinkEvent>,
    cmd_rx: mpsc::UnboundedReceiver<oneshot::Sender<SessionResult>>,
    live_tx: watch::Sender<String>,
    failure_tx: mpsc::Sender<SessionError>,
    max_duration: Option<Duration>,
}

/// The single owner of the session: every mutation of `CaptureSession`
/// happens here, in response to channel events.
async fn run_session(t: SessionTask) -> SessionResult {
    let SessionTask {
        mut session,
        mut capture,
        mut stream,
        mut rec_handle,
        mut broadcaster,
        handle,
        writer_task,
        mut sink_rx,
        mut cmd_rx,
        live_tx,
        failure_tx,
        max_duration,
    } = t;

    tracing::info!(
        session = %session.id,
        started_at = %session.started_at,
        rate = session.format.sample_rate,
        channels = session.format.channels,
        "Recording"
    );

    let mut filter = HypothesisFilter::new();
    let mut failure_sent = false;
    let mut recognizer_done = false;
    let mut capture_done = false;

    let deadline_enabled = max_duration.is_some();
    let deadline = tokio::time::Instant::now()
        + max_duration.unwrap_or(Duration::from_secs(60 * 60 * 24 * 365));

    // Recording phase; breaks with the pending stop reply, if any
    let reply = loop {
        tokio::select! {
            maybe_buf = stream.buffers.recv(), if !capture_done => {
                match maybe_buf {
                    Some(buf) => {
                        broadcaster.deliver(buf);
                    }
                    None => {
                        tracing::debug!(session = %session.id, "Capture stream ended");
                        capture_done = true;
                    }
                }
            }

            maybe_ev = rec_handle.next_event(), if !recognizer_done => {
                match maybe_ev {
                    Some(RecognitionEvent::Hypothesis(h)) => {
                        apply_hypothesis(&mut session, &live_tx, &mut filter, h);
                        if session.final_transcript.is_some() {
                            recognizer_done = true;
                        }
                    }
                    Some(RecognitionEvent::Error(e)) => {
                        // The improvement stream stops; capture and file
                        // writing carry on until stop()
                        record_failure(&mut session, &failure_tx, &mut failure_sent, e.into());
                        recognizer_done = true;
                    }
                    None => recognizer_done = true,
                }
            }

            Some(ev) = sink_rx.recv() => {
                match ev {
                    SinkEvent::WriteFailed(e) => {
                        record_failure(&mut session, &failure_tx, &mut failure_sent, e.into());
                    }
                }
            }

            Some(reply) = cmd_rx.recv() => break Some(reply),

            _ = tokio::time::sleep_until(deadline), if deadline_enabled => {
                tracing::warn!(session = %session.id, "Maximum session duration reached");
                break None;
            }

            else => break None,
        }
    };

    // Stopping: capture halt, recognizer cancel/drain, file finalize
    session.state = std::mem::take(&mut session.state).stopping();

    if let Err(e) = capture.stop().await {
        tracing::warn!(session = %session.id, "Capture halt failed: {}", e);
    }
    while let Some(buf) = stream.buffers.recv().await {
        broadcaster.deliver(buf);
    }

    handle.retire();
    rec_handle.cancel();
    if !recognizer_done {
        while let Some(ev) = rec_handle.next_event().await {
            match ev {
                RecognitionEvent::Hypothesis(h) => {
                    apply_hypothesis(&mut session, &live_tx, &mut filter, h);
                }
                RecognitionEvent::Error(e) => {
                    record_failure(&mut session, &failure_tx, &mut failure_sent, e.into());
                }
            }
        }
    }

    // Dropping the broadcaster closes the writer queue; the writer task
    // then finalizes the file
    drop(broadcaster);
    let audio_path = match writer_task.await {
        Ok(Ok(finalized)) => {
            tracing::info!(
                session = %session.id,
                frames = finalized.frames,
                path = %finalized.path.display(),
                "Recording finalized"
            );
            Some(finalized.path)
        }
        Ok(Err(e)) => {
            // The file exists with whatever was appended before the error
            record_failure(&mut session, &failure_tx, &mut failure_sent, e.into());
            Some(session.output_path.clone())
        }
        Err(e) => {
            record_failure(
                &mut session,
                &failure_tx,
                &mut failure_sent,
                SessionError::File(WriteError::Io(e.to_string())),
            );
            Some(session.output_path.clone())
        }
    };

    // No-op if a mid-session failure already made the state terminal
    session.state = std::mem::take(&mut session.state).stopped();

    let result = SessionResult {
        transcript: session
            .final_transcript
            .clone()
            .unwrap_or_else(|| session.live_transcript.clone()),
        audio_path,
        error: session.error.clone(),
    };

    tracing::info!(session = %session.id, state = %session.state, "Session ended");

    match reply {
        Some(reply) => {
            let _ = reply.send(result.clone());
        }
        // Stopped without a caller (max duration or lost controller);
        // hold the result for the eventual stop()
        None => {
            if let Some(reply) = cmd_rx.recv().await {
                let _ = reply.send(result.clone());
            }
        }
    }

    result
}

/// Apply an accepted hypothesis to the session and the live observer
fn apply_hypothesis(
    session: &mut CaptureSession,
    live_tx: &watch::Sender<String>,
    filter: &mut HypothesisFilter,
    hypothesis: TranscriptHypothesis,
) {
    if !filter.accept(&hypothesis) {
        tracing::trace!(
            session = %session.id,
            seq = hypothesis.seq,
            "Discarding superseded hypothesis"
        );
        return;
    }

    session.live_transcript = hypothesis.text.clone();
    let _ = live_tx.send(hypothesis.text.clone());

    if hypothesis.is_final {
        tracing::debug!(session = %session.id, seq = hypothesis.seq, "Final hypothesis");
        session.final_transcript = Some(hypothesis.text);
    }
}

/// Record the session's terminal error and notify the failure observer
/// (at most once per session)
fn record_failure(
    session: &mut CaptureSession,
    failure_tx: &mpsc::Sender<SessionError>,
    failure_sent: &mut bool,
    error: SessionError,
) {
    tracing::warn!(session = %session.id, "Session failure: {}", error);
    session.state = std::mem::take(&mut session.state).fail();
    if session.error.is_none() {
        session.error = Some(error.clone());
    }
    if !*failure_sent {
        *failure_sent = true;
        let _ = failure_tx.try_send(error);
    }
}

/// Writer sink task: appends buffers in arrival order, reports the first
/// disk error, and finalizes once the queue closes.
fn spawn_writer(
    mut writer: WavFileWriter,
    mut rx: mpsc::UnboundedReceiver<AudioBuffer>,
    events: mpsc::UnboundedSender<SinkEvent>,
) -> JoinHandle<Result<FinalizedAudio, WriteError>> {
    tokio::spawn(async move {
        let mut reported = false;
        while let Some(buf) = rx.recv().await {
            if let Err(e) = writer.append(&buf) {
                if !reported {
                    reported = true;
                    let _ = events.send(SinkEvent::WriteFailed(e));
                }
            }
        }
        writer.finalize()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_result() {
        let result = SessionResult::default();
        assert_eq!(result.transcript, "");
        assert!(result.audio_path.is_none());
        assert!(result.error.is_none());
    }
}
