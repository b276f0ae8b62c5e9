//! # callgate-transport: Callee-Side Admission
//!
//! An `Endpoint` is the receiving end of a cross-process call. Before any call reaches the
//! handler the endpoint classifies it and asks its process's filter whether to admit it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use callgate_core::{CallKind, Disposition, InterfaceInfo, RejectKind, ThreadId, Ticks};

use crate::outgoing::{OutgoingCalls, OutgoingGuard};
use crate::registration::FilterSlot;

/// A synchronous request travelling from caller to callee.
#[derive(Debug, Clone)]
pub struct CallRequest {
    pub caller: ThreadId,
    pub interface: Option<InterfaceInfo>,
    /// The caller does not block on the reply.
    pub asynchronous: bool,
    pub payload: Vec<u8>,
}

impl CallRequest {
    pub fn new(caller: ThreadId, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            caller,
            interface: None,
            asynchronous: false,
            payload: payload.into(),
        }
    }

    pub fn with_interface(mut self, interface: InterfaceInfo) -> Self {
        self.interface = Some(interface);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    Accepted(Vec<u8>),
    Rejected(RejectKind),
}

/// Anything that can receive a call. Must answer without blocking.
pub trait Callee: Send + Sync {
    fn thread(&self) -> ThreadId;

    /// Delivers one attempt. `elapsed` is the ticks since the caller first issued the call.
    fn deliver(&self, request: &CallRequest, elapsed: Ticks) -> CallOutcome;
}

/// Application code behind an endpoint.
pub trait CallHandler: Send + Sync {
    fn handle(&self, request: &CallRequest) -> Vec<u8>;
}

impl<F> CallHandler for F
where
    F: Fn(&CallRequest) -> Vec<u8> + Send + Sync,
{
    fn handle(&self, request: &CallRequest) -> Vec<u8> {
        self(request)
    }
}

pub struct Endpoint<H> {
    thread: ThreadId,
    handler: H,
    slot: Arc<FilterSlot>,
    /// Shared with every pipeline issuing calls from the same thread.
    outgoing: Arc<OutgoingCalls>,
    shutting_down: AtomicBool,
}

impl<H: CallHandler> Endpoint<H> {
    pub fn new(
        thread: ThreadId,
        handler: H,
        slot: Arc<FilterSlot>,
        outgoing: Arc<OutgoingCalls>,
    ) -> Self {
        Self {
            thread,
            handler,
            slot,
            outgoing,
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Records that this endpoint's thread is now waiting on a call to `target`.
    ///
    /// `CallPipeline::invoke` does this itself; use it for calls made outside a pipeline.
    pub fn enter_outgoing(&self, target: ThreadId) -> OutgoingGuard {
        self.outgoing.enter(target)
    }

    /// From here on every call is answered `NotResponding`.
    pub fn begin_shutdown(&self) {
        tracing::info!(thread = %self.thread, "endpoint shutting down");
        self.shutting_down.store(true, Ordering::Release);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Classifies an arriving request relative to this thread's outgoing calls.
    pub fn classify(&self, request: &CallRequest) -> CallKind {
        match (request.asynchronous, self.outgoing.innermost()) {
            (true, None) => CallKind::Async,
            (true, Some(_)) => CallKind::AsyncCallPending,
            (false, None) => CallKind::TopLevel,
            // A callback from the thread we are waiting on.
            (false, Some(target)) if target == request.caller => CallKind::Nested,
            (false, Some(_)) => CallKind::TopLevelCallPending,
        }
    }
}

impl<H: CallHandler> Callee for Endpoint<H> {
    fn thread(&self) -> ThreadId {
        self.thread
    }

    fn deliver(&self, request: &CallRequest, elapsed: Ticks) -> CallOutcome {
        if self.is_shutting_down() {
            return CallOutcome::Rejected(RejectKind::NotResponding);
        }
        let kind = self.classify(request);
        let decision = self.slot.notify(|f| {
            f.on_incoming_call(kind, request.caller, elapsed, request.interface)
        });
        match decision {
            Disposition::Allow => CallOutcome::Accepted(self.handler.handle(request)),
            Disposition::Reject | Disposition::RetryLater(_) => {
                tracing::trace!(
                    thread = %self.thread,
                    caller = %request.caller,
                    ?kind,
                    "call refused"
                );
                CallOutcome::Rejected(RejectKind::Busy)
            }
            Disposition::Cancel => CallOutcome::Rejected(RejectKind::NotResponding),
        }
    }
}
