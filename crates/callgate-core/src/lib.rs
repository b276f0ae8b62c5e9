pub mod config;
pub mod disposition;
pub mod error;
pub mod filter;

pub use config::FilterConfig;
pub use disposition::{
    CallKind, CallState, Disposition, InterfaceInfo, PendingKind, RejectKind, ThreadId, Ticks,
};
pub use error::{GateError, Result};
pub use filter::{CallFilter, RetryFilter};
