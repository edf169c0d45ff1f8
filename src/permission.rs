//! Microphone and speech-recognition authorization
//!
//! The gate holds the current authorization snapshot and resolves
//! undetermined states through the platform prompt exactly once: the
//! prompt backend receives a single-shot reply channel, and the caller
//! suspends on that channel's one value. Once both permissions are
//! resolved the cached snapshot is returned immediately.

use tokio::sync::{oneshot, Mutex};

/// Authorization state for one capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Permission {
    #[default]
    Undetermined,
    Granted,
    Denied,
}

/// Snapshot of both capabilities the pipeline needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PermissionSnapshot {
    pub microphone: Permission,
    pub recognition: Permission,
}

impl PermissionSnapshot {
    /// Both capabilities granted
    pub fn granted() -> Self {
        Self {
            microphone: Permission::Granted,
            recognition: Permission::Granted,
        }
    }

    /// Both capabilities denied
    pub fn denied() -> Self {
        Self {
            microphone: Permission::Denied,
            recognition: Permission::Denied,
        }
    }

    /// A session may only start when both capabilities are granted
    pub fn is_granted(&self) -> bool {
        self.microphone == Permission::Granted && self.recognition == Permission::Granted
    }

    /// Whether neither capability is still awaiting a user response
    pub fn is_resolved(&self) -> bool {
        self.microphone != Permission::Undetermined
            && self.recognition != Permission::Undetermined
    }
}

/// Backend that fires the platform permission prompt.
///
/// `request` must deliver the user's answer on `reply` exactly once;
/// dropping the sender is treated as a denial.
pub trait Prompter: Send + Sync {
    fn request(&self, reply: oneshot::Sender<PermissionSnapshot>);
}

/// Prompter for platforms without a runtime permission broker:
/// access is governed by device-level configuration, so the prompt
/// grants immediately.
pub struct AutoGrantPrompter;

impl Prompter for AutoGrantPrompter {
    fn request(&self, reply: oneshot::Sender<PermissionSnapshot>) {
        let _ = reply.send(PermissionSnapshot::granted());
    }
}

/// Gate consulted before every session start
pub struct PermissionGate {
    prompter: Box<dyn Prompter>,
    cached: Mutex<PermissionSnapshot>,
}

impl PermissionGate {
    pub fn new(prompter: Box<dyn Prompter>) -> Self {
        Self {
            prompter,
            cached: Mutex::new(PermissionSnapshot::default()),
        }
    }

    /// Return the cached snapshot, prompting first if either capability
    /// is still undetermined. Idempotent once both are resolved; the
    /// wait for the user's response is unbounded by design.
    pub async fn check_and_request(&self) -> PermissionSnapshot {
        let mut cached = self.cached.lock().await;
        if cached.is_resolved() {
            return *cached;
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        self.prompter.request(reply_tx);

        let snapshot = match reply_rx.await {
            Ok(snapshot) => snapshot,
            // A prompt that vanishes without answering counts as a denial
            Err(_) => PermissionSnapshot::denied(),
        };

        tracing::debug!(?snapshot, "Permission prompt resolved");
        *cached = snapshot;
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct CountingPrompter {
        fired: Arc<AtomicU32>,
        answer: PermissionSnapshot,
    }

    impl Prompter for CountingPrompter {
        fn request(&self, reply: oneshot::Sender<PermissionSnapshot>) {
            self.fired.fetch_add(1, Ordering::SeqCst);
            let _ = reply.send(self.answer);
        }
    }

    struct SilentPrompter;

    impl Prompter for SilentPrompter {
        fn request(&self, _reply: oneshot::Sender<PermissionSnapshot>) {
            // Reply sender dropped without an answer
        }
    }

    #[tokio::test]
    async fn test_auto_grant() {
        let gate = PermissionGate::new(Box::new(AutoGrantPrompter));
        let snapshot = gate.check_and_request().await;
        assert!(snapshot.is_granted());
    }

    #[tokio::test]
    async fn test_prompt_fires_once_then_cached() {
        let fired = Arc::new(AtomicU32::new(0));
        let gate = PermissionGate::new(Box::new(CountingPrompter {
            fired: Arc::clone(&fired),
            answer: PermissionSnapshot::granted(),
        }));

        assert!(gate.check_and_request().await.is_granted());
        assert!(gate.check_and_request().await.is_granted());
        assert!(gate.check_and_request().await.is_granted());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_denied_is_cached() {
        let fired = Arc::new(AtomicU32::new(0));
        let gate = PermissionGate::new(Box::new(CountingPrompter {
            fired: Arc::clone(&fired),
            answer: PermissionSnapshot {
                microphone: Permission::Granted,
                recognition: Permission::Denied,
            },
        }));

        assert!(!gate.check_and_request().await.is_granted());
        assert!(!gate.check_and_request().await.is_granted());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dropped_prompt_counts_as_denial() {
        let gate = PermissionGate::new(Box::new(SilentPrompter));
        let snapshot = gate.check_and_request().await;
        assert_eq!(snapshot, PermissionSnapshot::denied());
    }

    #[test]
    fn test_partial_grant_is_not_granted() {
        let snapshot = PermissionSnapshot {
            microphone: Permission::Granted,
            recognition: Permission::Undetermined,
        };
        assert!(!snapshot.is_granted());
        assert!(!snapshot.is_resolved());
    }
}
