//! Notification payloads and the dispositions returned for them.
//!
//! Everything here is `Copy` and owned by the transport for the duration of a
//! single notification. The filter never keeps any of it.

use std::fmt;
use std::time::Duration;

/// Milliseconds elapsed since a call was first rejected (or first blocked).
pub type Ticks = u64;

/// Identity of a calling or callee thread as seen by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadId(pub u32);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tid:{}", self.0)
    }
}

/// Classification of an arriving call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// Ordinary call; the receiving thread has no outgoing call pending.
    TopLevel,
    /// Call arriving on a thread that is itself blocked in an outgoing call.
    Nested,
    /// Asynchronous call; the caller is not blocked on the reply.
    Async,
    /// New top-level call while the receiver has an outgoing call pending.
    TopLevelCallPending,
    /// Asynchronous call while the receiver has an outgoing call pending.
    AsyncCallPending,
}

impl CallKind {
    /// Whether dispatching this call re-enters a thread blocked on its own outgoing call.
    pub const fn is_reentrant(self) -> bool {
        matches!(
            self,
            CallKind::Nested | CallKind::TopLevelCallPending | CallKind::AsyncCallPending
        )
    }
}

/// Why the callee's dispatcher refused a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectKind {
    /// Callee is busy handling a nested call.
    Busy,
    /// Callee is not responding, e.g. it is shutting down.
    NotResponding,
}

/// Kind of the outgoing call the blocked thread is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingKind {
    TopLevel,
    Nested,
}

/// Optional interface metadata attached to an incoming call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceInfo {
    pub interface: u64,
    pub method: u16,
}

/// Outcome of a filter decision.
///
/// For message-pending notifications `Allow` means "pump the queued message"
/// and `Reject` means "leave it queued".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Allow,
    Reject,
    RetryLater(Duration),
    Cancel,
}

impl Disposition {
    pub const fn is_cancel(self) -> bool {
        matches!(self, Disposition::Cancel)
    }

    /// Returns the advised delay for `RetryLater`.
    pub const fn retry_delay(self) -> Option<Duration> {
        match self {
            Disposition::RetryLater(delay) => Some(delay),
            _ => None,
        }
    }
}

/// Transport-side lifecycle of one in-flight call.
///
/// `Active -> Rejected -> (Retrying -> Rejected)* -> {Cancelled | Completed}`.
/// A call may also complete from `Active` or `Retrying` once the callee accepts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Active,
    Rejected,
    Retrying,
    Completed,
    Cancelled,
}

impl CallState {
    pub const fn is_terminal(self) -> bool {
        matches!(self, CallState::Completed | CallState::Cancelled)
    }
}
