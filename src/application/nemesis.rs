use crate::domain::ports::{NotificationService, StateStore};
use crate::domain::types::LossContext;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

const STATE_KEY: &str = "nemesis:state";
const STATE_TTL_SECS: u64 = 86_400;
const MEDITATION_TOPIC: &str = "nemesis.meditation";

/// Classified cause of a trading loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LossCategory {
    BlackSwan,
    TrendReversal,
    WhiplashVolatility,
    LiquidityTrap,
}

impl fmt::Display for LossCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LossCategory::BlackSwan => write!(f, "BLACK_SWAN"),
            LossCategory::TrendReversal => write!(f, "TREND_REVERSAL"),
            LossCategory::WhiplashVolatility => write!(f, "WHIPLASH_VOLATILITY"),
            LossCategory::LiquidityTrap => write!(f, "LIQUIDITY_TRAP"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NemesisConfig {
    /// Defeats in one category that trigger a meditation lockout.
    pub trigger_threshold: u32,
    /// Length of the meditation lockout.
    pub cooldown: Duration,
    /// Oldest ledger entries are evicted beyond this capacity.
    pub ledger_capacity: usize,
    /// Volatility above this classifies a loss as whiplash.
    pub volatility_threshold: f64,
}

impl Default for NemesisConfig {
    fn default() -> Self {
        Self {
            trigger_threshold: 3,
            cooldown: Duration::hours(1),
            ledger_capacity: 50,
            volatility_threshold: 0.03,
        }
    }
}

/// One recorded defeat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefeatEntry {
    pub timestamp: DateTime<Utc>,
    pub trade_id: String,
    pub category: LossCategory,
    pub loss: Decimal,
}

/// Persistable ledger state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NemesisSnapshot {
    pub ledger: VecDeque<DefeatEntry>,
    pub counts: HashMap<LossCategory, u32>,
    pub lockout_until: Option<DateTime<Utc>>,
}

/// Summary for observability surfaces.
#[derive(Debug, Clone)]
pub struct NemesisStatus {
    pub total_defeats: usize,
    pub counts: HashMap<LossCategory, u32>,
    pub lockout_until: Option<DateTime<Utc>>,
}

/// Adaptive lockout keyed by classified loss cause.
///
/// Every loss is classified and appended to a bounded ledger; once one
/// category accumulates `trigger_threshold` defeats, a meditation lockout
/// suspends trading for `cooldown`. Expiry is lazy through
/// [`NemesisGuard::active_lockout`], same contract as the anti-tilt guard.
pub struct NemesisGuard {
    config: NemesisConfig,
    state: Mutex<NemesisSnapshot>,
    notifier: Option<Arc<dyn NotificationService>>,
    store: Option<Arc<dyn StateStore>>,
}

impl NemesisGuard {
    pub fn new(
        config: NemesisConfig,
        notifier: Option<Arc<dyn NotificationService>>,
        store: Option<Arc<dyn StateStore>>,
    ) -> Self {
        Self {
            config,
            state: Mutex::new(NemesisSnapshot::default()),
            notifier,
            store,
        }
    }

    fn lock(&self) -> MutexGuard<'_, NemesisSnapshot> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deterministic classification, first match wins.
    pub fn classify(&self, context: &LossContext) -> LossCategory {
        if context.news_event {
            LossCategory::BlackSwan
        } else if context.trend_reversal {
            LossCategory::TrendReversal
        } else if context.volatility > self.config.volatility_threshold {
            LossCategory::WhiplashVolatility
        } else {
            LossCategory::LiquidityTrap
        }
    }

    /// Record a defeat, and enter meditation if its category has now beaten
    /// us `trigger_threshold` times. Notification and persistence are
    /// best-effort and never fail the caller.
    pub async fn report_loss(
        &self,
        trade_id: &str,
        loss: Decimal,
        context: &LossContext,
        now: DateTime<Utc>,
    ) {
        let category = self.classify(context);
        let (count, lockout_until) = {
            let mut state = self.lock();
            state.ledger.push_back(DefeatEntry {
                timestamp: now,
                trade_id: trade_id.to_string(),
                category,
                loss,
            });
            while state.ledger.len() > self.config.ledger_capacity {
                state.ledger.pop_front();
            }
            let count = {
                let entry = state.counts.entry(category).or_insert(0);
                *entry += 1;
                *entry
            };
            let lockout = if count >= self.config.trigger_threshold {
                let until = now + self.config.cooldown;
                state.lockout_until = Some(until);
                Some(until)
            } else {
                None
            };
            (count, lockout)
        };

        warn!(
            "Nemesis: '{category}' defeated us again (trade {trade_id}), {count} defeats total"
        );

        if let Some(until) = lockout_until {
            info!("Nemesis: meditation triggered for '{category}', trading blocked until {until}");
            self.notify_meditation(category, count, until).await;
        }

        self.save_state().await;
    }

    /// Lockout expiry if a meditation is in progress, cleared lazily.
    pub fn active_lockout(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut state = self.lock();
        match state.lockout_until {
            Some(until) if now >= until => {
                state.lockout_until = None;
                info!("Nemesis: meditation over, trading unblocked");
                None
            }
            other => other,
        }
    }

    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.active_lockout(now).is_some()
    }

    pub fn status(&self) -> NemesisStatus {
        let state = self.lock();
        NemesisStatus {
            total_defeats: state.ledger.len(),
            counts: state.counts.clone(),
            lockout_until: state.lockout_until,
        }
    }

    async fn notify_meditation(&self, category: LossCategory, defeats: u32, until: DateTime<Utc>) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        let payload = json!({
            "nemesis_type": category.to_string(),
            "defeats": defeats,
            "blocked_until": until.to_rfc3339(),
        });
        if let Err(e) = notifier.publish(MEDITATION_TOPIC, payload).await {
            warn!("Nemesis: meditation notification failed: {e:#}");
        }
    }

    /// Persist the ledger snapshot. Failures are logged and swallowed.
    pub async fn save_state(&self) {
        let Some(store) = &self.store else {
            return;
        };
        let snapshot = self.lock().clone();
        let payload = match serde_json::to_string(&snapshot) {
            Ok(p) => p,
            Err(e) => {
                warn!("Nemesis: failed to serialize state: {e}");
                return;
            }
        };
        if let Err(e) = store
            .set(
                STATE_KEY,
                payload,
                Some(std::time::Duration::from_secs(STATE_TTL_SECS)),
            )
            .await
        {
            warn!("Nemesis: failed to persist state: {e:#}");
        }
    }

    /// Restore the ledger from the store at startup, if a snapshot exists.
    pub async fn load_state(&self) {
        let Some(store) = &self.store else {
            return;
        };
        match store.get(STATE_KEY).await {
            Ok(Some(raw)) => match serde_json::from_str::<NemesisSnapshot>(&raw) {
                Ok(snapshot) => {
                    info!(
                        "Nemesis: restored {} ledger entries from store",
                        snapshot.ledger.len()
                    );
                    *self.lock() = snapshot;
                }
                Err(e) => warn!("Nemesis: discarding corrupt snapshot: {e}"),
            },
            Ok(None) => {}
            Err(e) => warn!("Nemesis: failed to load state: {e:#}"),
        }
    }
}
