use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, Instant};

const STATE_CLOSED: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_HALF_OPEN: u8 = 2;

/// Per-store circuit breaker.
///
/// ```text
///   Closed   --[failure_threshold consecutive transport failures]--> Open
///   Open     --[recovery_timeout elapsed]--------------------------> HalfOpen
///   HalfOpen --[trial succeeds]------------------------------------> Closed
///   HalfOpen --[trial fails]---------------------------------------> Open
/// ```
///
/// While half-open only one request at a time is let through as a trial.
pub struct CircuitBreaker {
    state: AtomicU8,
    consecutive_failures: AtomicU32,
    failure_threshold: u32,
    recovery_timeout: Duration,
    origin: Instant,
    /// Milliseconds after `origin` when the breaker last opened.
    opened_at_ms: AtomicU64,
    trial_in_flight: AtomicBool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            state: AtomicU8::new(STATE_CLOSED),
            consecutive_failures: AtomicU32::new(0),
            failure_threshold: failure_threshold.max(1),
            recovery_timeout,
            origin: Instant::now(),
            opened_at_ms: AtomicU64::new(0),
            trial_in_flight: AtomicBool::new(false),
        }
    }

    fn elapsed_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    /// Current state, moving Open to HalfOpen once the recovery timeout passed.
    pub fn state(&self) -> CircuitState {
        match self.state.load(Ordering::Acquire) {
            STATE_CLOSED => CircuitState::Closed,
            STATE_HALF_OPEN => CircuitState::HalfOpen,
            _ => {
                let opened_at = self.opened_at_ms.load(Ordering::Acquire);
                let waited = self.elapsed_ms().saturating_sub(opened_at);
                if waited < self.recovery_timeout.as_millis() as u64 {
                    return CircuitState::Open;
                }
                let _ = self.state.compare_exchange(
                    STATE_OPEN,
                    STATE_HALF_OPEN,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                );
                match self.state.load(Ordering::Acquire) {
                    STATE_CLOSED => CircuitState::Closed,
                    STATE_OPEN => CircuitState::Open,
                    _ => CircuitState::HalfOpen,
                }
            }
        }
    }

    /// Ask to send one request. Always granted when closed; when half-open
    /// only the caller that claims the trial slot is granted.
    pub fn try_acquire(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => self
                .trial_in_flight
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok(),
        }
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Release);
        self.state.store(STATE_CLOSED, Ordering::Release);
        self.trial_in_flight.store(false, Ordering::Release);
    }

    /// Count a transport failure. Returns `true` if this failure opened the
    /// breaker.
    pub fn record_failure(&self) -> bool {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        let tripped = match self.state.load(Ordering::Acquire) {
            STATE_HALF_OPEN => true,
            STATE_CLOSED => failures >= self.failure_threshold,
            _ => false,
        };
        if tripped {
            self.opened_at_ms.store(self.elapsed_ms(), Ordering::Release);
            self.state.store(STATE_OPEN, Ordering::Release);
        }
        self.trial_in_flight.store(false, Ordering::Release);
        tripped
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Acquire)
    }
}
