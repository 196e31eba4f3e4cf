// crates/server/src/gate.rs
//! Process-wide concurrency gate: at most one pipeline runs at a time.
//!
//! The gate is an explicit ownership token rather than an ambient flag.
//! [`RunGate::try_acquire`] is atomic with respect to concurrent callers:
//! exactly one wins, the rest learn the winner's session id. The token
//! releases the gate on `Drop`, so every exit path of a run (success,
//! failure, panic) frees it. There is no timeout-based auto-release: a hung
//! pipeline blocks new starts indefinitely.

use std::sync::{Arc, Mutex, PoisonError};

/// Returned to losers of an acquire race, pointing at the in-flight job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Busy {
    pub active_session_id: String,
}

/// The gate itself. Shared as `Arc<RunGate>`.
#[derive(Debug, Default)]
pub struct RunGate {
    active: Mutex<Option<String>>,
}

impl RunGate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Try to claim the gate for `session_id`.
    ///
    /// Exactly one concurrent caller receives the token; every other caller
    /// receives [`Busy`] carrying the winner's session id.
    pub fn try_acquire(self: &Arc<Self>, session_id: &str) -> Result<RunToken, Busy> {
        let mut slot = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(active) = slot.as_ref() {
            return Err(Busy {
                active_session_id: active.clone(),
            });
        }
        *slot = Some(session_id.to_string());
        Ok(RunToken {
            gate: Arc::clone(self),
            session_id: session_id.to_string(),
        })
    }

    /// Session id of the in-flight job, if any.
    pub fn active_session(&self) -> Option<String> {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn release(&self, session_id: &str) {
        let mut slot = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.as_deref() {
            Some(active) if active == session_id => *slot = None,
            Some(active) => {
                // A token can only outlive its run through a programming
                // error; never clobber the current holder over it.
                tracing::warn!(
                    released = session_id,
                    active,
                    "gate release for a session that is not the holder"
                );
            }
            None => {
                tracing::warn!(session_id, "double release of the run gate");
            }
        }
    }
}

/// Ownership token for one pipeline run. Releases the gate when dropped.
#[derive(Debug)]
pub struct RunToken {
    gate: Arc<RunGate>,
    session_id: String,
}

impl RunToken {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl Drop for RunToken {
    fn drop(&mut self) {
        self.gate.release(&self.session_id);
    }
}
