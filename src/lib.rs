//! Cross-process call admission filtering.
//!
//! `callgate-core` holds the pure decision layer, `callgate-transport` the transport-side
//! collaborators that consult it.

pub use callgate_core::{
    CallFilter, CallKind, CallState, Disposition, FilterConfig, GateError, InterfaceInfo,
    PendingKind, RejectKind, RetryFilter, ThreadId, Ticks,
};
pub use callgate_transport::{
    CallHandler, CallOutcome, CallPipeline, CallRequest, CallSession, Callee, DefaultPolicy,
    Endpoint, FilterSlot, OutgoingCalls, OutgoingGuard, PendingMessage, PendingSender,
    RegistrationHandle, Transport,
};
