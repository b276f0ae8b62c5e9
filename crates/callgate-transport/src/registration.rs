use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use callgate_core::{
    CallFilter, CallKind, Disposition, FilterConfig, GateError, InterfaceInfo, PendingKind,
    RejectKind, Result, RetryFilter, ThreadId, Ticks,
};

use crate::sync::RwLock;

static NEXT_REGISTRATION: AtomicU64 = AtomicU64::new(1);

/// Behaviour of a transport with no filter installed: admit everything, fail rejected
/// calls immediately, keep pumping while blocked.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultPolicy;

impl CallFilter for DefaultPolicy {
    fn on_incoming_call(
        &self,
        _: CallKind,
        _: ThreadId,
        _: Ticks,
        _: Option<InterfaceInfo>,
    ) -> Disposition {
        Disposition::Allow
    }

    fn on_rejected_call(&self, _: ThreadId, _: Ticks, _: RejectKind) -> Disposition {
        Disposition::Cancel
    }

    fn on_message_pending(&self, _: ThreadId, _: Ticks, _: PendingKind) -> Disposition {
        Disposition::Allow
    }
}

struct Installed {
    id: u64,
    filter: Arc<dyn CallFilter>,
}

/// Proof of a successful `FilterSlot::register`. Consumed by `unregister`.
#[derive(Debug)]
#[must_use = "dropping the handle leaves the filter installed with no way to remove it"]
pub struct RegistrationHandle {
    id: u64,
}

/// The transport's single call-filter slot.
///
/// ## Lifecycle
/// Every notification runs under the read side of the lock, so `unregister` (write side)
/// returns only once in-flight decisions have finished and no later notification can
/// observe the removed filter.
pub struct FilterSlot {
    installed: RwLock<Option<Installed>>,
}

impl FilterSlot {
    pub fn new() -> Self {
        Self {
            installed: RwLock::new(None),
        }
    }

    /// Installs `filter`. Fails if a filter is already present.
    pub fn register(&self, filter: Arc<dyn CallFilter>) -> Result<RegistrationHandle> {
        let mut slot = self.installed.write().unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            tracing::warn!("call filter registration refused: slot occupied");
            return Err(GateError::AlreadyRegistered);
        }
        let id = NEXT_REGISTRATION.fetch_add(1, Ordering::Relaxed);
        *slot = Some(Installed { id, filter });
        tracing::info!(registration = id, "call filter registered");
        Ok(RegistrationHandle { id })
    }

    /// Builds a `RetryFilter` from `config` and installs it.
    pub fn register_with_config(&self, config: FilterConfig) -> Result<RegistrationHandle> {
        let filter =
            RetryFilter::new(config).map_err(|e| GateError::RegistrationFailed(e.to_string()))?;
        self.register(Arc::new(filter))
    }

    /// Removes the filter installed under `handle`, waiting for in-flight notifications.
    pub fn unregister(&self, handle: RegistrationHandle) -> Result<()> {
        let mut slot = self.installed.write().unwrap_or_else(|e| e.into_inner());
        match slot.as_ref() {
            Some(installed) if installed.id == handle.id => {
                *slot = None;
                tracing::info!(registration = handle.id, "call filter unregistered");
                Ok(())
            }
            _ => Err(GateError::NotRegistered),
        }
    }

    pub fn is_registered(&self) -> bool {
        self.installed
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// The installed filter, if any.
    pub fn current(&self) -> Option<Arc<dyn CallFilter>> {
        self.installed
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|installed| Arc::clone(&installed.filter))
    }

    /// Runs one decision against the installed filter, or `DefaultPolicy` if none.
    pub fn notify<R>(&self, decide: impl FnOnce(&dyn CallFilter) -> R) -> R {
        let slot = self.installed.read().unwrap_or_else(|e| e.into_inner());
        match slot.as_ref() {
            Some(installed) => decide(installed.filter.as_ref()),
            None => {
                tracing::trace!("no call filter installed, using transport default");
                decide(&DefaultPolicy)
            }
        }
    }
}

impl Default for FilterSlot {
    fn default() -> Self {
        Self::new()
    }
}
