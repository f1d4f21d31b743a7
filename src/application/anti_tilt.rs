use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct AntiTiltConfig {
    /// Consecutive losses that trigger the cooldown.
    pub loss_threshold: u32,
    /// How long trading stays suspended once triggered.
    pub lockout: Duration,
}

impl Default for AntiTiltConfig {
    fn default() -> Self {
        Self {
            loss_threshold: 2,
            lockout: Duration::hours(24),
        }
    }
}

/// Persistable anti-tilt state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AntiTiltSnapshot {
    pub consecutive_losses: u32,
    pub lockout_until: Option<DateTime<Utc>>,
}

/// Consecutive-loss cooldown state machine.
///
/// Two states: Active (no lockout) and Locked (`now < lockout_until`).
/// Expiry is lazy: every read path goes through [`AntiTiltGuard::active_lockout`],
/// which clears an elapsed lockout before answering. There is no background
/// timer, so correctness depends on reads always taking that path.
pub struct AntiTiltGuard {
    config: AntiTiltConfig,
    state: Mutex<AntiTiltSnapshot>,
}

impl AntiTiltGuard {
    pub fn new(config: AntiTiltConfig) -> Self {
        Self {
            config,
            state: Mutex::new(AntiTiltSnapshot::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AntiTiltSnapshot> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a closed trade. Losses accumulate toward the threshold; any
    /// non-loss resets the streak regardless of the current state.
    pub fn record_result(&self, is_loss: bool, now: DateTime<Utc>) {
        let mut state = self.lock();
        if !is_loss {
            state.consecutive_losses = 0;
            return;
        }
        state.consecutive_losses += 1;
        if state.consecutive_losses >= self.config.loss_threshold {
            let until = now + self.config.lockout;
            state.lockout_until = Some(until);
            warn!(
                "AntiTilt: {} consecutive losses, trading suspended until {}",
                state.consecutive_losses, until
            );
        }
    }

    /// Lockout expiry if currently locked, clearing it lazily when elapsed.
    pub fn active_lockout(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut state = self.lock();
        match state.lockout_until {
            Some(until) if now >= until => {
                state.lockout_until = None;
                info!("AntiTilt: lockout expired, trading resumed");
                None
            }
            other => other,
        }
    }

    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.active_lockout(now).is_some()
    }

    pub fn consecutive_losses(&self) -> u32 {
        self.lock().consecutive_losses
    }

    pub fn snapshot(&self) -> AntiTiltSnapshot {
        self.lock().clone()
    }

    pub fn restore(&self, snapshot: AntiTiltSnapshot) {
        *self.lock() = snapshot;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> AntiTiltGuard {
        AntiTiltGuard::new(AntiTiltConfig::default())
    }

    #[test]
    fn two_losses_lock_trading() {
        let guard = guard();
        let now = Utc::now();
        guard.record_result(true, now);
        assert!(!guard.is_locked(now));
        guard.record_result(true, now);
        assert!(guard.is_locked(now));
    }

    #[test]
    fn win_resets_streak() {
        let guard = guard();
        let now = Utc::now();
        guard.record_result(true, now);
        guard.record_result(false, now);
        guard.record_result(true, now);
        assert!(!guard.is_locked(now));
        assert_eq!(guard.consecutive_losses(), 1);
    }

    #[test]
    fn lockout_expires_lazily() {
        let guard = guard();
        let now = Utc::now();
        guard.record_result(true, now);
        guard.record_result(true, now);
        assert!(guard.is_locked(now + Duration::hours(23)));
        assert!(!guard.is_locked(now + Duration::hours(24)));
        // Cleared, not just hidden
        assert_eq!(guard.snapshot().lockout_until, None);
    }

    #[test]
    fn win_during_lockout_resets_counter_but_keeps_lockout() {
        let guard = guard();
        let now = Utc::now();
        guard.record_result(true, now);
        guard.record_result(true, now);
        guard.record_result(false, now);
        assert_eq!(guard.consecutive_losses(), 0);
        assert!(guard.is_locked(now));
    }

    #[test]
    fn snapshot_round_trip() {
        let guard = guard();
        let now = Utc::now();
        guard.record_result(true, now);
        guard.record_result(true, now);

        let restored = AntiTiltGuard::new(AntiTiltConfig::default());
        restored.restore(guard.snapshot());
        assert!(restored.is_locked(now));
    }
}
