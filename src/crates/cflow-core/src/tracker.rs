//! The [`BranchTracker`]: a completion barrier that counts live execution
//! branches and signals when all of them terminate.

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::{FlowError, Result};

struct State {
    live_branches: i64,
    completed: bool,
}

/// Counts live execution branches; signals completion exactly once.
///
/// Created with one live branch, modeling the start task. Every fan-out of
/// `N` successors consumes the caller's branch and adds `N - 1` new ones.
/// `add_branch`/`remove_branch` after the tracker has completed fail with
/// [`FlowError::TrackerClosed`] — this always indicates a scheduler bug.
pub struct BranchTracker {
    state: Mutex<State>,
    notify: Notify,
}

impl BranchTracker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State { live_branches: 1, completed: false }),
            notify: Notify::new(),
        }
    }

    /// Registers one more live branch.
    pub fn add_branch(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.completed {
            return Err(FlowError::TrackerClosed);
        }
        state.live_branches += 1;
        Ok(())
    }

    /// Retires one live branch. When the count reaches zero, marks the
    /// tracker completed and wakes every waiter.
    pub fn remove_branch(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.completed {
            return Err(FlowError::TrackerClosed);
        }
        state.live_branches -= 1;
        if state.live_branches <= 0 {
            state.completed = true;
            drop(state);
            self.notify.notify_waiters();
        }
        Ok(())
    }

    /// The current live-branch count, for diagnostics and tests.
    pub fn live_branches(&self) -> i64 {
        self.state.lock().live_branches
    }

    /// Suspends until the tracker has completed.
    pub async fn wait(&self) {
        loop {
            // Register interest in a notification *before* re-checking the
            // condition, so a `notify_waiters` racing with this check is
            // never missed.
            let notified = self.notify.notified();
            if self.state.lock().completed {
                return;
            }
            notified.await;
        }
    }
}

impl Default for BranchTracker {
    fn default() -> Self {
        Self::new()
    }
}
