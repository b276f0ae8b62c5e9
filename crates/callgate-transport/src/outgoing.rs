use std::sync::{Arc, Mutex};

use callgate_core::ThreadId;

/// Callees a thread is currently blocked on, innermost last.
///
/// Shared by the thread's `Endpoint` (which reads it to classify arriving calls) and its
/// `CallPipeline` (which records the target for the duration of every call it issues).
#[derive(Debug, Default)]
pub struct OutgoingCalls {
    targets: Mutex<Vec<ThreadId>>,
}

impl OutgoingCalls {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Records that the owning thread is now waiting on `target`.
    pub fn enter(self: &Arc<Self>, target: ThreadId) -> OutgoingGuard {
        self.targets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(target);
        OutgoingGuard {
            calls: Arc::clone(self),
            target,
        }
    }

    /// The callee of the innermost outgoing call.
    pub fn innermost(&self) -> Option<ThreadId> {
        self.targets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .copied()
    }

    pub fn is_blocked(&self) -> bool {
        self.innermost().is_some()
    }
}

/// Marks the owning thread as blocked on one callee until dropped.
///
/// Owns its `OutgoingCalls`, so it can be held across an `.await`.
#[must_use = "the thread stops counting as blocked as soon as the guard is dropped"]
#[derive(Debug)]
pub struct OutgoingGuard {
    calls: Arc<OutgoingCalls>,
    target: ThreadId,
}

impl Drop for OutgoingGuard {
    fn drop(&mut self) {
        let mut targets = self.calls.targets.lock().unwrap_or_else(|e| e.into_inner());
        // Guards dropped out of order remove their own entry, not the innermost one.
        if let Some(pos) = targets.iter().rposition(|t| *t == self.target) {
            targets.remove(pos);
        }
    }
}
