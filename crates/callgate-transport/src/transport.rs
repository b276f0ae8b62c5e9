use std::sync::Arc;

use callgate_core::{CallFilter, FilterConfig, Result, ThreadId};

use crate::endpoint::{CallHandler, Callee, Endpoint};
use crate::outgoing::OutgoingCalls;
use crate::pipeline::{CallPipeline, PendingSender};
use crate::registration::{FilterSlot, RegistrationHandle};

/// One process's view of the call transport.
///
/// The filter is an explicit dependency of the transport: every endpoint and pipeline the
/// transport hands out consults the same slot and shares the thread's outgoing-call state.
pub struct Transport {
    thread: ThreadId,
    slot: Arc<FilterSlot>,
    outgoing: Arc<OutgoingCalls>,
}

impl Transport {
    /// A transport with no filter installed (transport default behaviour).
    pub fn new(thread: ThreadId) -> Self {
        Self {
            thread,
            slot: Arc::new(FilterSlot::new()),
            outgoing: OutgoingCalls::new(),
        }
    }

    /// A transport constructed with `filter` already installed.
    pub fn with_filter(
        thread: ThreadId,
        filter: Arc<dyn CallFilter>,
    ) -> Result<(Self, RegistrationHandle)> {
        let transport = Self::new(thread);
        let handle = transport.slot.register(filter)?;
        Ok((transport, handle))
    }

    /// Installs a `RetryFilter` built from `config`.
    pub fn register(&self, config: FilterConfig) -> Result<RegistrationHandle> {
        self.slot.register_with_config(config)
    }

    pub fn unregister(&self, handle: RegistrationHandle) -> Result<()> {
        self.slot.unregister(handle)
    }

    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    pub fn slot(&self) -> &Arc<FilterSlot> {
        &self.slot
    }

    /// Whether this transport's thread is currently blocked in an outgoing call.
    pub fn is_blocked(&self) -> bool {
        self.outgoing.is_blocked()
    }

    /// Exposes `handler` to other processes on this transport's thread.
    pub fn endpoint<H: CallHandler>(&self, handler: H) -> Arc<Endpoint<H>> {
        Arc::new(Endpoint::new(
            self.thread,
            handler,
            self.slot.clone(),
            self.outgoing.clone(),
        ))
    }

    /// Opens an outgoing call path from this transport's thread to `callee`.
    pub fn pipeline<C: Callee>(&self, callee: Arc<C>) -> (CallPipeline<C>, PendingSender) {
        CallPipeline::new(
            self.thread,
            callee,
            self.slot.clone(),
            self.outgoing.clone(),
        )
    }
}
