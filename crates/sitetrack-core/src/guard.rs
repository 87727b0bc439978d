use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushState {
    Idle,
    Pushing,
}

/// At most one push outstanding, process-wide. Pulls never look at this.
#[derive(Debug, Clone)]
pub struct PushGuard {
    state: Arc<Mutex<PushState>>,
}

impl Default for PushGuard {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(PushState::Idle)),
        }
    }
}

impl PushGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PushState {
        *self.state.lock()
    }

    /// `Idle -> Pushing`, or `Busy` when a push is already running.
    pub fn try_begin(&self) -> SyncResult<PushPermit> {
        let mut state = self.state.lock();
        match *state {
            PushState::Pushing => {
                warn!("push rejected; another push is in flight");
                Err(SyncError::Busy)
            }
            PushState::Idle => {
                *state = PushState::Pushing;
                debug!("push permit granted");
                Ok(PushPermit {
                    state: self.state.clone(),
                })
            }
        }
    }
}

/// Returns the guard to `Idle` when dropped, however the push ended.
#[derive(Debug)]
pub struct PushPermit {
    state: Arc<Mutex<PushState>>,
}

impl Drop for PushPermit {
    fn drop(&mut self) {
        *self.state.lock() = PushState::Idle;
        debug!("push permit released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_begin_is_rejected_until_the_first_permit_drops() {
        let guard = PushGuard::new();
        assert_eq!(guard.state(), PushState::Idle);

        let permit = guard.try_begin().expect("first push");
        assert_eq!(guard.state(), PushState::Pushing);
        assert!(guard.try_begin().expect_err("second push").is_busy());

        drop(permit);
        assert_eq!(guard.state(), PushState::Idle);
        assert!(guard.try_begin().is_ok());
    }

    #[test]
    fn clones_share_one_state() {
        let guard = PushGuard::new();
        let other = guard.clone();
        let _permit = guard.try_begin().expect("push");
        assert_eq!(other.state(), PushState::Pushing);
    }
}
