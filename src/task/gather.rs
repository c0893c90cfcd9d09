use super::tracker::CompletionTracker;
use crate::error::{Result, ShardlineError};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Single-assignment status cell: the first recorded error sticks until the
/// next round clears it.
#[derive(Debug, Clone, Default)]
pub struct FirstError(Option<ShardlineError>);

impl FirstError {
    /// Record `error` if no error is set yet. Returns whether it was kept.
    pub fn record(&mut self, error: ShardlineError) -> bool {
        if self.0.is_none() {
            self.0 = Some(error);
            true
        } else {
            false
        }
    }

    pub fn is_ok(&self) -> bool {
        self.0.is_none()
    }

    pub fn error(&self) -> Option<&ShardlineError> {
        self.0.as_ref()
    }

    pub fn clear(&mut self) {
        self.0 = None;
    }

    pub fn to_result(&self) -> Result<()> {
        match &self.0 {
            None => Ok(()),
            Some(e) => Err(e.clone()),
        }
    }
}

/// Everything a task mutates from completion callbacks.
#[derive(Debug, Default)]
pub struct GatherState<S> {
    pub status: FirstError,
    pub data: S,
}

/// Shared accumulator of one task: task-specific state `S` plus the status,
/// behind a single reader/writer lock, and the countdown of the current round.
#[derive(Debug, Default)]
pub struct Gather<S> {
    state: RwLock<GatherState<S>>,
    tracker: CompletionTracker,
}

impl<S> Gather<S> {
    pub fn new(data: S) -> Self {
        Self {
            state: RwLock::new(GatherState {
                status: FirstError::default(),
                data,
            }),
            tracker: CompletionTracker::new(),
        }
    }

    // A panic inside a merge closure must not wedge the remaining callbacks,
    // so poisoning is ignored.
    pub fn write(&self) -> RwLockWriteGuard<'_, GatherState<S>> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn read(&self) -> RwLockReadGuard<'_, GatherState<S>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Arm the countdown for a round of `outstanding` sub-operations.
    pub fn begin_round(&self, outstanding: usize) {
        self.tracker.arm(outstanding);
    }

    /// Apply one sub-operation's outcome under the write lock, then count it.
    /// Success runs `merge`; a failed outcome or a failing merge is recorded
    /// first-failure-wins. Returns `true` when this completion ends the round.
    pub fn complete<R>(
        &self,
        outcome: Result<R>,
        merge: impl FnOnce(&mut S, R) -> Result<()>,
    ) -> bool {
        {
            let mut state = self.write();
            let GatherState { status, data } = &mut *state;
            if let Err(e) = outcome.and_then(|value| merge(data, value)) {
                status.record(e);
            }
        }
        self.tracker.complete_one()
    }

    pub fn status(&self) -> Result<()> {
        self.read().status.to_result()
    }

    pub fn outstanding(&self) -> usize {
        self.tracker.outstanding()
    }
}
