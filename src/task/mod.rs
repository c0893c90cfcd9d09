//! Scatter-gather task engine.
//!
//! A task splits one logical operation into sub-operations addressed to
//! partitions or regions, dispatches them through a [`StoreChannel`] without
//! waiting, and gathers completions that arrive on arbitrary threads. The
//! completion that drains the round's [`CompletionTracker`] finalizes and
//! fires the caller's [`DoneCallback`] exactly once.
//!
//! [`StoreChannel`]: crate::rpc::StoreChannel

pub mod gather;
pub mod tracker;

pub use gather::{FirstError, Gather, GatherState};
pub use tracker::CompletionTracker;

use crate::error::{Result, ShardlineError};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot;

/// Completion callback of a task round: final status plus best-effort output.
pub type DoneCallback<O> = Box<dyn FnOnce(Result<()>, O) + Send + 'static>;

pub trait ScatterTask: Send + Sync + Sized + 'static {
    type Output: Default + Send + 'static;

    /// Short label used in log prefixes.
    fn name(&self) -> String;

    /// Validate the request and resolve static facts. No network.
    fn init(&self) -> Result<()>;

    /// Dispatch the pending work and return immediately. `done` fires exactly
    /// once, possibly before this returns when there is nothing to send.
    /// May be called again after a failed round to retry what is still pending.
    fn do_async(self: &Arc<Self>, done: DoneCallback<Self::Output>);
}

/// Holder of the callback for the round in flight.
pub struct DoneSlot<O> {
    slot: Mutex<Option<DoneCallback<O>>>,
}

impl<O> Default for DoneSlot<O> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }
}

impl<O> DoneSlot<O> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `done` for the next round. Hands it back when a round is still
    /// in flight.
    pub fn arm(&self, done: DoneCallback<O>) -> std::result::Result<(), DoneCallback<O>> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Err(done);
        }
        *slot = Some(done);
        Ok(())
    }

    /// Fire the stored callback, outside the slot lock. Returns `false` if
    /// it already fired.
    pub fn fire(&self, status: Result<()>, output: O) -> bool {
        let done = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match done {
            Some(done) => {
                done(status, output);
                true
            }
            None => {
                tracing::error!("[TASK] completion fired twice for one round");
                false
            }
        }
    }

    pub fn is_armed(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

/// Reject a `do_async` that overlaps a round in flight.
pub(crate) fn reject_overlapping<O: Default>(name: &str, done: DoneCallback<O>) {
    tracing::warn!("[{}] do_async called while a round is in flight", name);
    done(
        Err(ShardlineError::Internal(format!(
            "{} already has a round in flight",
            name
        ))),
        O::default(),
    );
}

/// Status and output delivered by one task round.
#[derive(Debug)]
pub struct TaskOutcome<O> {
    pub status: Result<()>,
    pub output: O,
}

impl<O> TaskOutcome<O> {
    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }

    /// Output on success, the task's first error otherwise.
    pub fn into_result(self) -> Result<O> {
        self.status.map(|()| self.output)
    }
}

/// Run `init` and one `do_async` round, awaiting the completion callback.
pub async fn execute<T: ScatterTask>(task: &Arc<T>) -> TaskOutcome<T::Output> {
    if let Err(e) = task.init() {
        tracing::warn!("[{}] init failed: {}", task.name(), e);
        return TaskOutcome {
            status: Err(e),
            output: T::Output::default(),
        };
    }
    resume(task).await
}

/// Run another `do_async` round over whatever is still pending.
pub async fn resume<T: ScatterTask>(task: &Arc<T>) -> TaskOutcome<T::Output> {
    let (tx, rx) = oneshot::channel();
    task.do_async(Box::new(move |status, output| {
        let _ = tx.send(TaskOutcome { status, output });
    }));
    rx.await.unwrap_or_else(|_| TaskOutcome {
        status: Err(ShardlineError::Internal(format!(
            "{} dropped its completion callback",
            task.name()
        ))),
        output: T::Output::default(),
    })
}
