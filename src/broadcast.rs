//! Buffer fan-out from the capture stream to both sinks
//!
//! Each captured buffer goes to the file writer queue and the recognizer
//! feed. Both deliveries are non-blocking enqueues, so neither sink can
//! stall the other or the capture side. Delivery is gated on a session
//! handle: ownership lives in a registry, and a callback that outlives
//! its session finds the handle retired instead of touching freed state.

use crate::audio::AudioBuffer;
use crate::recognize::RecognitionFeeder;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Registry of the currently live session.
///
/// At most one session is active per controller, so liveness is a single
/// generation counter: registering a new session retires any previous one.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    active: AtomicU64,
    next: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a new session, retiring any previously live handle
    pub fn register(self: &Arc<Self>) -> SessionHandle {
        let id = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        self.active.store(id, Ordering::SeqCst);
        SessionHandle {
            id,
            registry: Arc::clone(self),
        }
    }

    /// Retire a handle; no-op if another session already took over
    pub fn retire(&self, handle: &SessionHandle) {
        let _ = self.active.compare_exchange(
            handle.id,
            0,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }
}

/// Opaque handle identifying one capture session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: u64,
    registry: Arc<SessionRegistry>,
}

impl SessionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether this handle still identifies the live session
    pub fn is_live(&self) -> bool {
        self.registry.active.load(Ordering::SeqCst) == self.id
    }

    /// Retire this handle in its registry
    pub fn retire(&self) {
        self.registry.retire(self);
    }
}

/// Fans captured buffers out to the file writer and the recognizer.
///
/// The writer queue is unbounded so no buffer is ever dropped, duplicated,
/// or reordered on its way to disk; the recognizer feed is equally
/// non-blocking. Dropping the broadcaster closes the writer queue, which
/// is what tells the writer task to finalize.
pub struct DualSinkBroadcaster {
    handle: SessionHandle,
    writer_tx: mpsc::UnboundedSender<AudioBuffer>,
    recognizer: RecognitionFeeder,
    delivered: u64,
}

impl DualSinkBroadcaster {
    pub fn new(
        handle: SessionHandle,
        writer_tx: mpsc::UnboundedSender<AudioBuffer>,
        recognizer: RecognitionFeeder,
    ) -> Self {
        Self {
            handle,
            writer_tx,
            recognizer,
            delivered: 0,
        }
    }

    /// Hand one buffer to both sinks. Returns false (without delivering)
    /// if the session is no longer live.
    pub fn deliver(&mut self, buffer: AudioBuffer) -> bool {
        if !self.handle.is_live() {
            tracing::trace!(seq = buffer.seq(), "Dropping buffer for retired session");
            return false;
        }

        self.recognizer.feed(buffer.clone());
        let _ = self.writer_tx.send(buffer);
        self.delivered += 1;
        true
    }

    /// Buffers delivered to the sinks so far
    pub fn delivered(&self) -> u64 {
        self.delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioFormat;
    use crate::recognize::RecognitionHandle;

    fn test_buffer(seq: u64) -> AudioBuffer {
        AudioBuffer::new(vec![0.1; 8], AudioFormat::mono_16khz(), seq)
    }

    #[test]
    fn test_register_and_retire() {
        let registry = SessionRegistry::new();
        let handle = registry.register();
        assert!(handle.is_live());

        handle.retire();
        assert!(!handle.is_live());
    }

    #[test]
    fn test_new_registration_retires_previous() {
        let registry = SessionRegistry::new();
        let first = registry.register();
        let second = registry.register();
        assert!(!first.is_live());
        assert!(second.is_live());
    }

    #[test]
    fn test_retire_is_idempotent() {
        let registry = SessionRegistry::new();
        let handle = registry.register();
        handle.retire();
        handle.retire();
        assert!(!handle.is_live());
    }

    #[test]
    fn test_stale_retire_does_not_kill_new_session() {
        let registry = SessionRegistry::new();
        let old = registry.register();
        let new = registry.register();
        old.retire();
        assert!(new.is_live());
    }

    #[tokio::test]
    async fn test_deliver_reaches_both_sinks_in_order() {
        let registry = SessionRegistry::new();
        let handle = registry.register();
        let (writer_tx, mut writer_rx) = mpsc::unbounded_channel();
        let (rec_handle, mut rec_io) = RecognitionHandle::channel();

        let mut broadcaster = DualSinkBroadcaster::new(handle, writer_tx, rec_handle.feeder());
        for seq in 0..3 {
            assert!(broadcaster.deliver(test_buffer(seq)));
        }
        assert_eq!(broadcaster.delivered(), 3);

        for seq in 0..3 {
            assert_eq!(writer_rx.recv().await.unwrap().seq(), seq);
            assert_eq!(rec_io.next_audio().await.unwrap().seq(), seq);
        }
    }

    #[tokio::test]
    async fn test_retired_session_blocks_delivery() {
        let registry = SessionRegistry::new();
        let handle = registry.register();
        let (writer_tx, mut writer_rx) = mpsc::unbounded_channel();
        let (rec_handle, _rec_io) = RecognitionHandle::channel();

        let mut broadcaster =
            DualSinkBroadcaster::new(handle.clone(), writer_tx, rec_handle.feeder());
        handle.retire();

        assert!(!broadcaster.deliver(test_buffer(0)));
        assert_eq!(broadcaster.delivered(), 0);
        assert!(writer_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dropping_broadcaster_closes_writer_queue() {
        let registry = SessionRegistry::new();
        let handle = registry.register();
        let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<AudioBuffer>();
        let (rec_handle, _rec_io) = RecognitionHandle::channel();

        let broadcaster = DualSinkBroadcaster::new(handle, writer_tx, rec_handle.feeder());
        drop(broadcaster);
        assert!(writer_rx.recv().await.is_none());
    }
}
