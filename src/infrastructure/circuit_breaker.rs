use crate::domain::errors::BreakerError;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Circuit breaker phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerPhase {
    Closed,   // Normal operation - requests pass through
    Open,     // Failure threshold breached - reject all requests
    HalfOpen, // Testing if service recovered - allow limited requests
}

impl std::fmt::Display for BreakerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerPhase::Closed => write!(f, "CLOSED"),
            BreakerPhase::Open => write!(f, "OPEN"),
            BreakerPhase::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive-ish failure count that opens the circuit.
    pub failure_threshold: u32,
    /// How long the circuit stays open before the next call probes recovery.
    pub recovery_timeout: Duration,
    /// Trial calls allowed through while half-open.
    pub half_open_max_trials: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            half_open_max_trials: 2,
        }
    }
}

struct BreakerState {
    phase: BreakerPhase,
    failures: u32,
    half_open_trials: u32,
    half_open_successes: u32,
    last_failure: Option<Instant>,
    last_transition: Instant,
    total_calls: u64,
    total_failures: u64,
    total_rejected: u64,
}

/// Read-only snapshot of breaker state for observability.
#[derive(Debug, Clone)]
pub struct BreakerStatus {
    pub phase: BreakerPhase,
    pub failures: u32,
    pub time_in_state: Duration,
    /// Remaining wait before the circuit probes recovery (only while open).
    pub retry_after: Option<Duration>,
    pub total_calls: u64,
    pub total_failures: u64,
    pub total_rejected: u64,
}

/// Circuit breaker protecting one external call site.
///
/// One instance per protected dependency; instances never share counters.
/// Time-based transitions (Open -> HalfOpen) are computed lazily inside
/// [`CircuitBreaker::execute`] and [`CircuitBreaker::status`]; there is no
/// background timer.
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: Mutex::new(BreakerState {
                phase: BreakerPhase::Closed,
                failures: 0,
                half_open_trials: 0,
                half_open_successes: 0,
                last_failure: None,
                last_transition: Instant::now(),
                total_calls: 0,
                total_failures: 0,
                total_rejected: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Execute a function with circuit breaker protection.
    ///
    /// Returns [`BreakerError::Open`] without invoking `f` when the circuit
    /// rejects the call; otherwise re-surfaces the call's own error after
    /// bookkeeping.
    pub async fn execute<F, Fut, T, E>(&self, f: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        // Admission bookkeeping under the lock; the call itself runs outside it.
        {
            let mut state = self.lock();
            state.total_calls += 1;

            if state.phase == BreakerPhase::Open {
                match self.remaining_recovery(&state) {
                    Some(remaining) => {
                        state.total_rejected += 1;
                        return Err(BreakerError::Open {
                            name: self.name.clone(),
                            retry_after_secs: remaining.as_secs().max(1),
                        });
                    }
                    None => self.transition(&mut state, BreakerPhase::HalfOpen),
                }
            }

            if state.phase == BreakerPhase::HalfOpen {
                if state.half_open_trials >= self.config.half_open_max_trials {
                    state.total_rejected += 1;
                    return Err(BreakerError::Open {
                        name: self.name.clone(),
                        retry_after_secs: self.config.recovery_timeout.as_secs(),
                    });
                }
                state.half_open_trials += 1;
            }
        }

        match f().await {
            Ok(result) => {
                self.on_success();
                Ok(result)
            }
            Err(e) => {
                self.on_failure();
                Err(BreakerError::Inner(e))
            }
        }
    }

    /// Snapshot of the current state without mutating it.
    ///
    /// An elapsed recovery timeout is reported as `HalfOpen` even though the
    /// stored phase only changes on the next `execute`.
    pub fn status(&self) -> BreakerStatus {
        let state = self.lock();
        let (phase, retry_after) = if state.phase == BreakerPhase::Open {
            match self.remaining_recovery(&state) {
                Some(remaining) => (BreakerPhase::Open, Some(remaining)),
                None => (BreakerPhase::HalfOpen, None),
            }
        } else {
            (state.phase, None)
        };
        BreakerStatus {
            phase,
            failures: state.failures,
            time_in_state: state.last_transition.elapsed(),
            retry_after,
            total_calls: state.total_calls,
            total_failures: state.total_failures,
            total_rejected: state.total_rejected,
        }
    }

    /// Time left before an open circuit allows a probe; `None` once elapsed.
    fn remaining_recovery(&self, state: &BreakerState) -> Option<Duration> {
        let last_failure = state.last_failure?;
        let elapsed = last_failure.elapsed();
        if elapsed > self.config.recovery_timeout {
            None
        } else {
            Some(self.config.recovery_timeout - elapsed)
        }
    }

    fn transition(&self, state: &mut BreakerState, to: BreakerPhase) {
        let from = state.phase;
        state.phase = to;
        state.last_transition = Instant::now();
        match to {
            BreakerPhase::Open => {
                error!(
                    "CircuitBreaker [{}]: {} -> OPEN ({} failures)",
                    self.name, from, state.failures
                );
            }
            BreakerPhase::HalfOpen => {
                warn!(
                    "CircuitBreaker [{}]: {} -> HALF_OPEN (probing recovery)",
                    self.name, from
                );
                state.half_open_trials = 0;
                state.half_open_successes = 0;
            }
            BreakerPhase::Closed => {
                info!("CircuitBreaker [{}]: {} -> CLOSED (recovered)", self.name, from);
                state.failures = 0;
            }
        }
    }

    fn on_success(&self) {
        let mut state = self.lock();
        match state.phase {
            BreakerPhase::HalfOpen => {
                state.half_open_successes += 1;
                if state.half_open_successes >= self.config.half_open_max_trials {
                    self.transition(&mut state, BreakerPhase::Closed);
                }
            }
            BreakerPhase::Closed => {
                // Gradual self-healing: one success pays off one failure.
                state.failures = state.failures.saturating_sub(1);
            }
            BreakerPhase::Open => {
                warn!(
                    "CircuitBreaker [{}]: success recorded in OPEN state (unexpected)",
                    self.name
                );
            }
        }
    }

    fn on_failure(&self) {
        let mut state = self.lock();
        state.failures += 1;
        state.total_failures += 1;
        state.last_failure = Some(Instant::now());

        match state.phase {
            BreakerPhase::Closed => {
                if state.failures >= self.config.failure_threshold {
                    self.transition(&mut state, BreakerPhase::Open);
                }
            }
            BreakerPhase::HalfOpen => {
                // Any failure during recovery immediately reopens the circuit.
                self.transition(&mut state, BreakerPhase::Open);
            }
            BreakerPhase::Open => {}
        }
    }
}
