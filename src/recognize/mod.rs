//! Streaming speech recognition
//!
//! A recognition session accepts audio buffers through a non-blocking
//! feed and surfaces an asynchronous sequence of transcript hypotheses:
//! zero or more partials, then at most one final. The sequence terminates
//! when a final hypothesis is emitted, when the engine fails, or when the
//! handle is cancelled.

pub mod whisper;

use crate::audio::{AudioBuffer, AudioFormat};
use crate::error::RecognitionError;
use tokio::sync::mpsc;

/// One transcript hypothesis from the recognition engine.
///
/// A hypothesis with a higher sequence number supersedes every earlier
/// one; only the hypothesis marked final is kept as the session's
/// finalized transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptHypothesis {
    pub text: String,
    pub is_final: bool,
    pub seq: u64,
}

impl TranscriptHypothesis {
    pub fn partial(text: impl Into<String>, seq: u64) -> Self {
        Self {
            text: text.into(),
            is_final: false,
            seq,
        }
    }

    pub fn final_result(text: impl Into<String>, seq: u64) -> Self {
        Self {
            text: text.into(),
            is_final: true,
            seq,
        }
    }
}

/// Events surfaced by a recognition session
#[derive(Debug, Clone)]
pub enum RecognitionEvent {
    Hypothesis(TranscriptHypothesis),
    Error(RecognitionError),
}

/// Messages into the recognition worker
enum FeedCommand {
    Audio(AudioBuffer),
    Cancel,
}

/// Cloneable non-blocking audio feed into a recognition session.
///
/// Feeding never waits on the engine: buffers are enqueued and the call
/// returns. Buffers fed after the session ended are silently discarded.
#[derive(Clone)]
pub struct RecognitionFeeder {
    tx: mpsc::UnboundedSender<FeedCommand>,
}

impl RecognitionFeeder {
    pub fn feed(&self, buffer: AudioBuffer) {
        let _ = self.tx.send(FeedCommand::Audio(buffer));
    }
}

/// Handle to one recognition session.
///
/// Owned by the session task; the feeder side can be cloned off for the
/// broadcaster while the event side stays with the single consumer.
pub struct RecognitionHandle {
    tx: mpsc::UnboundedSender<FeedCommand>,
    events: mpsc::UnboundedReceiver<RecognitionEvent>,
}

impl RecognitionHandle {
    /// Wire up a new handle; implementations receive the worker-side
    /// channel ends.
    pub fn channel() -> (
        RecognitionHandle,
        RecognitionWorkerIo,
    ) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (
            RecognitionHandle {
                tx: cmd_tx,
                events: event_rx,
            },
            RecognitionWorkerIo {
                commands: cmd_rx,
                events: event_tx,
            },
        )
    }

    /// Non-blocking audio feed usable from the broadcaster
    pub fn feeder(&self) -> RecognitionFeeder {
        RecognitionFeeder {
            tx: self.tx.clone(),
        }
    }

    /// Submit a buffer for incremental recognition
    pub fn feed(&self, buffer: AudioBuffer) {
        let _ = self.tx.send(FeedCommand::Audio(buffer));
    }

    /// Next event in the hypothesis sequence; `None` once the session
    /// has released its resources.
    pub async fn next_event(&mut self) -> Option<RecognitionEvent> {
        self.events.recv().await
    }

    /// Stop recognition and release engine resources. Safe to call after
    /// the sequence already terminated, and more than once.
    pub fn cancel(&self) {
        let _ = self.tx.send(FeedCommand::Cancel);
    }
}

/// Worker-side channel ends for a recognition session
pub struct RecognitionWorkerIo {
    commands: mpsc::UnboundedReceiver<FeedCommand>,
    events: mpsc::UnboundedSender<RecognitionEvent>,
}

impl RecognitionWorkerIo {
    /// Next fed buffer; `None` means the session was cancelled or the
    /// handle was dropped, and the worker should finalize.
    pub async fn next_audio(&mut self) -> Option<AudioBuffer> {
        loop {
            match self.commands.recv().await {
                Some(FeedCommand::Audio(buffer)) => return Some(buffer),
                Some(FeedCommand::Cancel) | None => return None,
            }
        }
    }

    /// Emit a hypothesis; returns false once the consumer is gone
    pub fn emit(&self, hypothesis: TranscriptHypothesis) -> bool {
        self.events
            .send(RecognitionEvent::Hypothesis(hypothesis))
            .is_ok()
    }

    /// Surface an asynchronous engine failure
    pub fn fail(&self, error: RecognitionError) {
        let _ = self.events.send(RecognitionEvent::Error(error));
    }
}

/// Trait for streaming recognition engines
#[async_trait::async_trait]
pub trait StreamingRecognizer: Send + Sync {
    /// Begin a recognition session for audio in `format`. Fails with
    /// `RecognitionError::Unavailable` when the engine cannot accept a
    /// new session.
    async fn begin_session(
        &self,
        format: AudioFormat,
    ) -> Result<RecognitionHandle, RecognitionError>;
}

/// Orders the hypothesis stream for the live-transcript observer.
///
/// The engine is not trusted to deliver in order: duplicates and
/// out-of-order hypotheses are filtered by sequence number, so accepted
/// hypotheses form a strictly increasing sequence.
#[derive(Debug, Default)]
pub struct HypothesisFilter {
    last_seq: Option<u64>,
}

impl HypothesisFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `hypothesis` supersedes everything seen so far
    pub fn accept(&mut self, hypothesis: &TranscriptHypothesis) -> bool {
        match self.last_seq {
            Some(last) if hypothesis.seq <= last => false,
            _ => {
                self.last_seq = Some(hypothesis.seq);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_accepts_increasing_seq() {
        let mut filter = HypothesisFilter::new();
        assert!(filter.accept(&TranscriptHypothesis::partial("he", 1)));
        assert!(filter.accept(&TranscriptHypothesis::partial("hel", 2)));
        assert!(filter.accept(&TranscriptHypothesis::final_result("hello", 5)));
    }

    #[test]
    fn test_filter_rejects_duplicate_seq() {
        let mut filter = HypothesisFilter::new();
        assert!(filter.accept(&TranscriptHypothesis::partial("he", 3)));
        assert!(!filter.accept(&TranscriptHypothesis::partial("xx", 3)));
    }

    #[test]
    fn test_filter_rejects_out_of_order() {
        let mut filter = HypothesisFilter::new();
        assert!(filter.accept(&TranscriptHypothesis::partial("world", 4)));
        assert!(!filter.accept(&TranscriptHypothesis::partial("wor", 2)));
        assert!(filter.accept(&TranscriptHypothesis::partial("world!", 5)));
    }

    #[test]
    fn test_filter_accepts_seq_zero_first() {
        let mut filter = HypothesisFilter::new();
        assert!(filter.accept(&TranscriptHypothesis::partial("", 0)));
        assert!(!filter.accept(&TranscriptHypothesis::partial("", 0)));
    }

    #[tokio::test]
    async fn test_handle_feed_and_cancel_reach_worker() {
        let (handle, mut io) = RecognitionHandle::channel();
        let buffer = AudioBuffer::new(vec![0.0; 4], AudioFormat::mono_16khz(), 0);

        handle.feed(buffer);
        assert!(io.next_audio().await.is_some());

        handle.cancel();
        assert!(io.next_audio().await.is_none());
        // Cancel is idempotent
        handle.cancel();
    }

    #[tokio::test]
    async fn test_dropped_handle_ends_worker_feed() {
        let (handle, mut io) = RecognitionHandle::channel();
        drop(handle);
        assert!(io.next_audio().await.is_none());
    }

    #[tokio::test]
    async fn test_worker_events_reach_handle() {
        let (mut handle, io) = RecognitionHandle::channel();
        assert!(io.emit(TranscriptHypothesis::partial("hi", 1)));
        drop(io);

        match handle.next_event().await {
            Some(RecognitionEvent::Hypothesis(h)) => {
                assert_eq!(h.text, "hi");
                assert!(!h.is_final);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(handle.next_event().await.is_none());
    }
}
