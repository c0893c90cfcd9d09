use std::sync::atomic::{AtomicUsize, Ordering};

/// Countdown over the sub-operations of one dispatch round.
///
/// Armed with `N` before any of the `N` sub-operations is dispatched. Each
/// completion calls [`complete_one`](Self::complete_one) as its last step;
/// exactly one of them observes the count reach zero and owns finalization.
#[derive(Debug, Default)]
pub struct CompletionTracker {
    outstanding: AtomicUsize,
}

impl CompletionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of outstanding sub-operations for the next round.
    /// Only valid while no completion of a previous round can still arrive.
    pub fn arm(&self, count: usize) {
        self.outstanding.store(count, Ordering::Release);
    }

    /// Record one completion. Returns `true` for the completion that drained
    /// the count.
    pub fn complete_one(&self) -> bool {
        match self
            .outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        {
            Ok(previous) => previous == 1,
            Err(_) => {
                tracing::error!("[TRACKER] completion reported with nothing outstanding");
                false
            }
        }
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }
}
