use crate::application::anti_tilt::{AntiTiltGuard, AntiTiltSnapshot};
use crate::application::fragmenter::ExecutionFragmenter;
use crate::application::governor::OrderGovernor;
use crate::application::nemesis::NemesisGuard;
use crate::application::news_blackout::NewsBlackoutGuard;
use crate::application::risk_gate::RiskGate;
use crate::config::GovernorEnvConfig;
use crate::domain::ports::{CalendarSource, ExecutionService, NotificationService, StateStore};
use crate::domain::types::LossContext;
use crate::infrastructure::circuit_breaker::CircuitBreaker;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const ANTI_TILT_STATE_KEY: &str = "anti_tilt:state";
const EXECUTION_BREAKER: &str = "execution";

/// Composition root for the governance pipeline.
///
/// Constructs every stateful component exactly once, wires them into the
/// [`OrderGovernor`], restores persisted guard state, and owns the supervised
/// calendar refresh task. No component lives in ambient global state.
pub struct GovernorRuntime {
    governor: Arc<OrderGovernor>,
    anti_tilt: Arc<AntiTiltGuard>,
    nemesis: Arc<NemesisGuard>,
    news: Arc<NewsBlackoutGuard>,
    risk: Arc<RiskGate>,
    breaker: Arc<CircuitBreaker>,
    calendar: Arc<dyn CalendarSource>,
    store: Option<Arc<dyn StateStore>>,
    refresh_interval: Duration,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
}

impl GovernorRuntime {
    pub async fn start(
        config: GovernorEnvConfig,
        execution: Arc<dyn ExecutionService>,
        calendar: Arc<dyn CalendarSource>,
        notifier: Option<Arc<dyn NotificationService>>,
        store: Option<Arc<dyn StateStore>>,
    ) -> Self {
        let risk = Arc::new(RiskGate::new(config.risk));
        let anti_tilt = Arc::new(AntiTiltGuard::new(config.anti_tilt));
        let news = Arc::new(NewsBlackoutGuard::new(config.news));
        let nemesis = Arc::new(NemesisGuard::new(
            config.nemesis,
            notifier,
            store.clone(),
        ));
        let fragmenter = Arc::new(ExecutionFragmenter::new(config.fragmenter));
        let breaker = Arc::new(CircuitBreaker::new(EXECUTION_BREAKER, config.breaker));

        // Restore persisted guard state; a missing or failing store degrades
        // to in-memory-only operation.
        nemesis.load_state().await;
        if let Some(store) = &store {
            match store.get(ANTI_TILT_STATE_KEY).await {
                Ok(Some(raw)) => match serde_json::from_str::<AntiTiltSnapshot>(&raw) {
                    Ok(snapshot) => {
                        info!("AntiTilt: restored persisted state");
                        anti_tilt.restore(snapshot);
                    }
                    Err(e) => warn!("AntiTilt: discarding corrupt snapshot: {e}"),
                },
                Ok(None) => {}
                Err(e) => warn!("AntiTilt: failed to load state: {e:#}"),
            }
        }

        let governor = Arc::new(OrderGovernor::new(
            config.governor,
            Arc::clone(&risk),
            Arc::clone(&anti_tilt),
            Arc::clone(&news),
            Arc::clone(&nemesis),
            fragmenter,
            Arc::clone(&breaker),
            execution,
        ));

        let runtime = Self {
            governor,
            anti_tilt,
            nemesis,
            news,
            risk,
            breaker,
            calendar,
            store,
            refresh_interval: config.calendar_refresh,
            refresh_task: Mutex::new(None),
        };
        runtime.restart_refresh();
        runtime
    }

    pub fn governor(&self) -> Arc<OrderGovernor> {
        Arc::clone(&self.governor)
    }

    pub fn risk(&self) -> Arc<RiskGate> {
        Arc::clone(&self.risk)
    }

    pub fn news(&self) -> Arc<NewsBlackoutGuard> {
        Arc::clone(&self.news)
    }

    pub fn nemesis(&self) -> Arc<NemesisGuard> {
        Arc::clone(&self.nemesis)
    }

    pub fn execution_breaker(&self) -> Arc<CircuitBreaker> {
        Arc::clone(&self.breaker)
    }

    /// Whether the calendar refresh task is still running.
    pub fn is_refresh_alive(&self) -> bool {
        self.refresh_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// (Re)start the calendar refresh task, aborting any previous instance.
    pub fn restart_refresh(&self) {
        let calendar = Arc::clone(&self.calendar);
        let news = Arc::clone(&self.news);
        let interval = self.refresh_interval;
        let handle = tokio::spawn(async move {
            loop {
                match calendar.fetch_events().await {
                    Ok(events) => news.refresh(events),
                    Err(e) => warn!("Calendar refresh failed: {e:#}"),
                }
                tokio::time::sleep(interval).await;
            }
        });

        let mut slot = self
            .refresh_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
    }

    /// Trade-result callback: updates the gates through the governor, then
    /// persists the anti-tilt snapshot best-effort (the nemesis guard saves
    /// its own state inside `report_loss`).
    pub async fn on_trade_closed(
        &self,
        trade_id: &str,
        pnl: Decimal,
        context: Option<&LossContext>,
        now: DateTime<Utc>,
    ) {
        self.governor
            .on_trade_closed(trade_id, pnl, context, now)
            .await;
        self.persist_anti_tilt().await;
    }

    async fn persist_anti_tilt(&self) {
        let Some(store) = &self.store else {
            return;
        };
        let snapshot = self.anti_tilt.snapshot();
        match serde_json::to_string(&snapshot) {
            Ok(payload) => {
                if let Err(e) = store.set(ANTI_TILT_STATE_KEY, payload, None).await {
                    warn!("AntiTilt: failed to persist state: {e:#}");
                }
            }
            Err(e) => warn!("AntiTilt: failed to serialize state: {e}"),
        }
    }

    /// Stop background work and flush guard snapshots.
    pub async fn shutdown(&self) {
        let handle = self
            .refresh_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
        self.nemesis.save_state().await;
        self.persist_anti_tilt().await;
        info!("GovernorRuntime: shut down");
    }
}
