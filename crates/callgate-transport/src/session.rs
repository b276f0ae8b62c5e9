use callgate_core::{CallState, GateError, Result, Ticks};
use tokio::time::Instant;

/// Transport-side bookkeeping for one in-flight call.
///
/// The filter never sees this struct; it only receives the elapsed ticks derived from it.
#[derive(Debug)]
pub struct CallSession {
    pub id: u64,
    state: CallState,
    started: Instant,
    first_rejection: Option<Instant>,
    attempts: u32,
}

fn millis_between(earlier: Instant, now: Instant) -> Ticks {
    now.saturating_duration_since(earlier).as_millis().min(Ticks::MAX as u128) as Ticks
}

impl CallSession {
    pub fn new(id: u64, now: Instant) -> Self {
        Self {
            id,
            state: CallState::Active,
            started: now,
            first_rejection: None,
            attempts: 1,
        }
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    /// Number of delivery attempts, including the first.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Ticks since the call was issued.
    pub fn elapsed_since_start(&self, now: Instant) -> Ticks {
        millis_between(self.started, now)
    }

    /// Ticks since the first rejection, zero if never rejected.
    pub fn elapsed_since_rejection(&self, now: Instant) -> Ticks {
        self.first_rejection.map_or(0, |t| millis_between(t, now))
    }

    fn transition(&mut self, allowed: &[CallState], to: CallState) -> Result<()> {
        if !allowed.contains(&self.state) {
            return Err(GateError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }

    /// Records a rejection and returns the ticks elapsed since the first one.
    pub fn reject(&mut self, now: Instant) -> Result<Ticks> {
        self.transition(&[CallState::Active, CallState::Retrying], CallState::Rejected)?;
        self.first_rejection.get_or_insert(now);
        Ok(self.elapsed_since_rejection(now))
    }

    pub fn begin_retry(&mut self) -> Result<()> {
        self.transition(&[CallState::Rejected], CallState::Retrying)
    }

    /// Marks the start of a re-issued delivery.
    pub fn reissue(&mut self) -> Result<()> {
        if self.state != CallState::Retrying {
            return Err(GateError::InvalidTransition {
                from: self.state,
                to: CallState::Retrying,
            });
        }
        self.attempts = self.attempts.saturating_add(1);
        Ok(())
    }

    pub fn complete(&mut self) -> Result<()> {
        self.transition(&[CallState::Active, CallState::Retrying], CallState::Completed)
    }

    /// Cancels the call. Finished calls cannot be cancelled and `Cancelled` is permanent.
    pub fn cancel(&mut self) -> Result<()> {
        if self.state.is_terminal() {
            return Err(GateError::InvalidTransition {
                from: self.state,
                to: CallState::Cancelled,
            });
        }
        self.state = CallState::Cancelled;
        Ok(())
    }
}
