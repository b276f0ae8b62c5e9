use std::fmt;

use crate::disposition::CallState;

#[derive(Debug)]
pub enum GateError {
    /// The retry window closed before the callee accepted the call.
    RetriesExhausted { elapsed_ms: u64 },
    AlreadyRegistered,
    RegistrationFailed(String),
    /// The handle does not match the filter currently installed.
    NotRegistered,
    InvalidConfig(String),
    /// The transport attempted a call-state transition the lifecycle forbids.
    InvalidTransition { from: CallState, to: CallState },
    Io(std::io::Error),
}

pub type Result<T> = std::result::Result<T, GateError>;

impl fmt::Display for GateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateError::RetriesExhausted { elapsed_ms } => {
                write!(f, "call rejected, retries exhausted after {elapsed_ms}ms")
            }
            GateError::AlreadyRegistered => write!(f, "a call filter is already registered"),
            GateError::RegistrationFailed(reason) => {
                write!(f, "filter registration failed: {reason}")
            }
            GateError::NotRegistered => write!(f, "no matching call filter is registered"),
            GateError::InvalidConfig(reason) => write!(f, "invalid filter configuration: {reason}"),
            GateError::InvalidTransition { from, to } => {
                write!(f, "invalid call transition {from:?} -> {to:?}")
            }
            GateError::Io(e) => write!(f, "i/o error: {e}"),
        }
    }
}

impl std::error::Error for GateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GateError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for GateError {
    fn from(e: std::io::Error) -> Self {
        GateError::Io(e)
    }
}

impl From<toml::de::Error> for GateError {
    fn from(e: toml::de::Error) -> Self {
        GateError::InvalidConfig(e.to_string())
    }
}
