//! # callgate-core: Call Admission Filter
//!
//! The filter answers three transport notifications: an incoming call arrived, an
//! outgoing call was rejected by the callee, and a message is queued for a thread that
//! is blocked on an outgoing call.

use std::time::Duration;

use crate::config::FilterConfig;
use crate::disposition::{
    CallKind, Disposition, InterfaceInfo, PendingKind, RejectKind, ThreadId, Ticks,
};
use crate::error::Result;

/// The CallFilter trait is the policy the transport consults on every notification.
///
/// ## Contract
/// Implementations must not block or sleep. All waiting is done by the transport,
/// which reports the elapsed wait back on each notification.
pub trait CallFilter: Send + Sync {
    /// Decides whether an arriving call may be dispatched.
    fn on_incoming_call(
        &self,
        call_kind: CallKind,
        caller: ThreadId,
        elapsed: Ticks,
        interface: Option<InterfaceInfo>,
    ) -> Disposition;

    /// Decides whether a rejected outgoing call is retried (`RetryLater`) or abandoned
    /// (`Cancel`).
    fn on_rejected_call(
        &self,
        callee: ThreadId,
        elapsed: Ticks,
        reject_kind: RejectKind,
    ) -> Disposition;

    /// Decides whether a blocked caller pumps a queued message (`Allow`), leaves it
    /// queued (`Reject`), or abandons the wait (`Cancel`).
    fn on_message_pending(
        &self,
        callee: ThreadId,
        elapsed: Ticks,
        pending_kind: PendingKind,
    ) -> Disposition;
}

/// Bounded constant-delay retry filter.
///
/// ## Concurrency
/// The only state is the `FilterConfig`, which is never mutated after construction,
/// so a single instance can be shared across any number of blocked caller threads.
#[derive(Debug, Clone)]
pub struct RetryFilter {
    config: FilterConfig,
}

static_assertions::assert_impl_all!(RetryFilter: Send, Sync, CallFilter);

impl RetryFilter {
    /// Builds a filter from a validated `config`. A zero retry delay is refused.
    pub fn new(config: FilterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Filter with a `max_retry_duration` window and the default delay.
    pub fn with_window(max_retry_duration: Duration) -> Self {
        Self {
            config: FilterConfig::default().with_max_retry_duration(max_retry_duration),
        }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    #[inline]
    fn window_closed(&self, elapsed: Ticks) -> bool {
        elapsed >= self.config.max_retry_duration_ms
    }
}

impl Default for RetryFilter {
    fn default() -> Self {
        Self {
            config: FilterConfig::default(),
        }
    }
}

impl CallFilter for RetryFilter {
    fn on_incoming_call(
        &self,
        call_kind: CallKind,
        caller: ThreadId,
        elapsed: Ticks,
        interface: Option<InterfaceInfo>,
    ) -> Disposition {
        if self.config.reject_reentrant_calls && call_kind.is_reentrant() {
            tracing::debug!(%caller, ?call_kind, elapsed, ?interface, "rejecting reentrant call");
            return Disposition::Reject;
        }
        tracing::trace!(%caller, ?call_kind, elapsed, "admitting call");
        Disposition::Allow
    }

    fn on_rejected_call(
        &self,
        callee: ThreadId,
        elapsed: Ticks,
        reject_kind: RejectKind,
    ) -> Disposition {
        if self.window_closed(elapsed) {
            tracing::debug!(
                %callee,
                elapsed,
                max = self.config.max_retry_duration_ms,
                ?reject_kind,
                "retry window exhausted, cancelling call"
            );
            return Disposition::Cancel;
        }
        tracing::trace!(
            %callee,
            elapsed,
            ?reject_kind,
            delay_ms = self.config.retry_delay_ms,
            "retrying later"
        );
        Disposition::RetryLater(self.config.retry_delay())
    }

    fn on_message_pending(
        &self,
        callee: ThreadId,
        elapsed: Ticks,
        pending_kind: PendingKind,
    ) -> Disposition {
        if self.window_closed(elapsed) {
            tracing::debug!(
                %callee,
                elapsed,
                ?pending_kind,
                "wait exceeded retry window, unwinding"
            );
            return Disposition::Cancel;
        }
        if self.config.pump_while_blocked {
            Disposition::Allow
        } else {
            Disposition::Reject
        }
    }
}
