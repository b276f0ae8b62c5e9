//! # callgate-transport: Caller-Side Retry Loop
//!
//! The pipeline owns every timer involved in a filtered call. It re-issues rejected calls
//! after the delay the filter advises, and while waiting it offers queued messages to the
//! filter so the blocked caller keeps servicing its own incoming work.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use callgate_core::{Disposition, GateError, PendingKind, Result, ThreadId};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::endpoint::{CallOutcome, CallRequest, Callee};
use crate::outgoing::OutgoingCalls;
use crate::registration::FilterSlot;
use crate::session::CallSession;

static NEXT_CALL: AtomicU64 = AtomicU64::new(1);

/// An unrelated message queued for a caller thread while it is blocked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMessage {
    pub kind: PendingKind,
    pub payload: Vec<u8>,
}

impl PendingMessage {
    pub fn new(kind: PendingKind, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }
}

pub type PendingSender = mpsc::UnboundedSender<PendingMessage>;

type Pump = Box<dyn FnMut(PendingMessage) + Send>;

pub struct CallPipeline<C> {
    thread: ThreadId,
    callee: Arc<C>,
    slot: Arc<FilterSlot>,
    outgoing: Arc<OutgoingCalls>,
    inbox: mpsc::UnboundedReceiver<PendingMessage>,
    /// Messages the filter told us not to pump yet.
    backlog: VecDeque<PendingMessage>,
    pump: Pump,
}

impl<C: Callee> CallPipeline<C> {
    /// Builds a pipeline for calls from `thread` to `callee`, consulting `slot` on every
    /// notification and recording each call in `outgoing` while it is in flight. The
    /// returned sender queues messages for the blocked caller.
    pub fn new(
        thread: ThreadId,
        callee: Arc<C>,
        slot: Arc<FilterSlot>,
        outgoing: Arc<OutgoingCalls>,
    ) -> (Self, PendingSender) {
        let (tx, inbox) = mpsc::unbounded_channel();
        let pipeline = Self {
            thread,
            callee,
            slot,
            outgoing,
            inbox,
            backlog: VecDeque::new(),
            pump: Box::new(|msg: PendingMessage| {
                tracing::trace!(kind = ?msg.kind, len = msg.payload.len(), "pumped message");
            }),
        };
        (pipeline, tx)
    }

    /// Sets the callback that processes messages the filter allows to be pumped.
    pub fn with_pump(mut self, pump: impl FnMut(PendingMessage) + Send + 'static) -> Self {
        self.pump = Box::new(pump);
        self
    }

    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    /// Messages still held back, oldest first.
    pub fn take_backlog(&mut self) -> Vec<PendingMessage> {
        self.backlog.drain(..).collect()
    }

    /// Issues `request` and drives it to completion or cancellation.
    ///
    /// The calling thread counts as blocked on the callee for the whole call, so callbacks
    /// arriving at its endpoint meanwhile are classified as reentrant.
    pub async fn invoke(&mut self, request: CallRequest) -> Result<Vec<u8>> {
        let callee = self.callee.thread();
        let _blocked = self.outgoing.enter(callee);
        let call = NEXT_CALL.fetch_add(1, Ordering::Relaxed);
        let mut session = CallSession::new(call, Instant::now());

        loop {
            let elapsed = session.elapsed_since_start(Instant::now());
            let kind = match self.callee.deliver(&request, elapsed) {
                CallOutcome::Accepted(reply) => {
                    session.complete()?;
                    tracing::trace!(call, attempts = session.attempts(), "call completed");
                    return Ok(reply);
                }
                CallOutcome::Rejected(kind) => kind,
            };

            let elapsed = session.reject(Instant::now())?;
            let decision = self
                .slot
                .notify(|f| f.on_rejected_call(callee, elapsed, kind));
            match decision.retry_delay() {
                Some(delay) => {
                    session.begin_retry()?;
                    self.wait_out(&mut session, delay).await?;
                    session.reissue()?;
                }
                // Anything other than `RetryLater` abandons the call.
                None => {
                    session.cancel()?;
                    tracing::debug!(call, %callee, elapsed, "call cancelled by filter");
                    return Err(GateError::RetriesExhausted {
                        elapsed_ms: elapsed,
                    });
                }
            }
        }
    }

    /// Waits out `delay`, offering queued messages to the filter in the meantime.
    ///
    /// Held messages are re-offered first, oldest first. If the filter cancels during
    /// that pass, the remaining messages stay in the backlog in arrival order.
    async fn wait_out(&mut self, session: &mut CallSession, delay: Duration) -> Result<()> {
        let mut held = std::mem::take(&mut self.backlog).into_iter();
        while let Some(msg) = held.next() {
            if let Err(e) = self.offer(session, msg) {
                self.backlog.extend(held);
                return Err(e);
            }
        }

        let timer = tokio::time::sleep(delay);
        tokio::pin!(timer);
        loop {
            tokio::select! {
                _ = &mut timer => return Ok(()),
                Some(msg) = self.inbox.recv() => self.offer(session, msg)?,
            }
        }
    }

    fn offer(&mut self, session: &mut CallSession, msg: PendingMessage) -> Result<()> {
        let callee = self.callee.thread();
        let elapsed = session.elapsed_since_start(Instant::now());
        let decision = self
            .slot
            .notify(|f| f.on_message_pending(callee, elapsed, msg.kind));
        if decision.is_cancel() {
            self.backlog.push_back(msg);
            session.cancel()?;
            tracing::debug!(call = session.id, %callee, elapsed, "wait unwound while pumping");
            return Err(GateError::RetriesExhausted {
                elapsed_ms: elapsed,
            });
        }
        match decision {
            Disposition::Allow => (self.pump)(msg),
            _ => self.backlog.push_back(msg),
        }
        Ok(())
    }
}
