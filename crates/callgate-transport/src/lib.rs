pub use callgate_core::{CallFilter, Disposition, FilterConfig, GateError, RetryFilter};
pub mod endpoint;
pub mod outgoing;
pub mod pipeline;
pub mod registration;
pub mod session;
mod sync;
pub mod transport;

pub use endpoint::{CallHandler, CallOutcome, CallRequest, Callee, Endpoint};
pub use outgoing::{OutgoingCalls, OutgoingGuard};
pub use pipeline::{CallPipeline, PendingMessage, PendingSender};
pub use registration::{DefaultPolicy, FilterSlot, RegistrationHandle};
pub use session::CallSession;
pub use transport::Transport;
