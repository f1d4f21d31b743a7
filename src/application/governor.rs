use crate::application::anti_tilt::AntiTiltGuard;
use crate::application::fragmenter::ExecutionFragmenter;
use crate::application::news_blackout::NewsBlackoutGuard;
use crate::application::nemesis::NemesisGuard;
use crate::application::risk_gate::RiskGate;
use crate::domain::decision::{CheckOutcome, Decision};
use crate::domain::errors::{BreakerError, RejectCode};
use crate::domain::ports::ExecutionService;
use crate::domain::types::{ExecutionReport, LossContext, OrderRequest};
use crate::infrastructure::circuit_breaker::{BreakerPhase, CircuitBreaker};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct GovernorConfig {
    /// Hard cap on a single order's volume.
    pub max_volume: Decimal,
    /// Maximum decimal places of a lot volume.
    pub lot_precision: u32,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            max_volume: dec!(100),
            lot_precision: crate::domain::types::LOT_PRECISION,
        }
    }
}

/// Outcome of a full evaluate-and-dispatch round.
#[derive(Debug)]
pub enum SubmitOutcome {
    /// The admission pipeline denied the order; nothing was dispatched.
    Denied(Decision),
    /// The order was admitted and dispatched (possibly with fragment-level
    /// failures, visible in the report).
    Executed {
        decision: Decision,
        report: ExecutionReport,
    },
}

/// Orchestrates the safety gates into one ordered, short-circuiting decision
/// pipeline, and hands admitted orders to the fragmenter behind the
/// execution circuit breaker.
///
/// Check precedence is fixed: cheap input-derived checks first, then the
/// lockout guards, then drawdown arithmetic. A locked-out account never has
/// its P&L recomputed.
pub struct OrderGovernor {
    config: GovernorConfig,
    risk: Arc<RiskGate>,
    anti_tilt: Arc<AntiTiltGuard>,
    news: Arc<NewsBlackoutGuard>,
    nemesis: Arc<NemesisGuard>,
    fragmenter: Arc<ExecutionFragmenter>,
    breaker: Arc<CircuitBreaker>,
    execution: Arc<dyn ExecutionService>,
}

impl OrderGovernor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: GovernorConfig,
        risk: Arc<RiskGate>,
        anti_tilt: Arc<AntiTiltGuard>,
        news: Arc<NewsBlackoutGuard>,
        nemesis: Arc<NemesisGuard>,
        fragmenter: Arc<ExecutionFragmenter>,
        breaker: Arc<CircuitBreaker>,
        execution: Arc<dyn ExecutionService>,
    ) -> Self {
        Self {
            config,
            risk,
            anti_tilt,
            news,
            nemesis,
            fragmenter,
            breaker,
            execution,
        }
    }

    /// Shape validation that runs before any gate: an order that fails here
    /// never reaches the pipeline.
    fn malformed(&self, order: &OrderRequest) -> Option<String> {
        if order.symbol.trim().is_empty() {
            return Some("Symbol is empty".to_string());
        }
        if order.volume <= Decimal::ZERO {
            return Some(format!("Volume {} is not positive", order.volume));
        }
        if order.volume > self.config.max_volume {
            return Some(format!(
                "Volume {} exceeds cap {}",
                order.volume, self.config.max_volume
            ));
        }
        if order.volume.normalize().scale() > self.config.lot_precision {
            return Some(format!(
                "Volume {} finer than lot precision ({} dp)",
                order.volume, self.config.lot_precision
            ));
        }
        None
    }

    /// Run the admission pipeline for one proposed order.
    ///
    /// `market_price` is the latest known price for the order's symbol,
    /// supplied by the caller. Evaluation never mutates gate state and always
    /// returns the full list of checks attempted.
    pub fn evaluate(
        &self,
        order: &OrderRequest,
        market_price: Decimal,
        now: DateTime<Utc>,
    ) -> Decision {
        if let Some(detail) = self.malformed(order) {
            warn!("Governor: rejected malformed order: {detail}");
            return Decision::denied(
                vec![CheckOutcome::fail("order", detail)],
                RejectCode::InvalidOrder,
            );
        }

        debug!(
            "Governor: evaluating {} {} {} lots",
            order.side, order.symbol, order.volume
        );

        // Later checks must not run once an earlier one fails: a locked-out
        // account never has its drawdown recomputed.
        let mut checks = Vec::with_capacity(8);

        let stop_loss = self.risk.check_stop_loss(order);
        if let Some(denied) = Self::deny_on_failure(&mut checks, stop_loss, RejectCode::MissingStopLoss) {
            return denied;
        }
        let risk = self.risk.check_risk_per_trade(order, market_price);
        if let Some(denied) =
            Self::deny_on_failure(&mut checks, risk, RejectCode::RiskPerTradeExceeded)
        {
            return denied;
        }
        let anti_tilt = self.check_anti_tilt(now);
        if let Some(denied) = Self::deny_on_failure(&mut checks, anti_tilt, RejectCode::AntiTiltActive)
        {
            return denied;
        }
        let news = self.check_news(now);
        if let Some(denied) = Self::deny_on_failure(&mut checks, news, RejectCode::NewsBlackoutActive)
        {
            return denied;
        }
        let nemesis = self.check_nemesis(now);
        if let Some(denied) =
            Self::deny_on_failure(&mut checks, nemesis, RejectCode::NemesisLockoutActive)
        {
            return denied;
        }
        let daily = self.risk.check_daily_drawdown();
        if let Some(denied) = Self::deny_on_failure(&mut checks, daily, RejectCode::DailyDrawdownLimit)
        {
            return denied;
        }
        let total = self.risk.check_total_drawdown();
        if let Some(denied) = Self::deny_on_failure(&mut checks, total, RejectCode::TotalDrawdownLimit)
        {
            return denied;
        }
        let positions = self.risk.check_max_positions();
        if let Some(denied) =
            Self::deny_on_failure(&mut checks, positions, RejectCode::MaxPositionsReached)
        {
            return denied;
        }

        info!(
            "Governor: order approved ({} {} {} lots)",
            order.side, order.symbol, order.volume
        );
        Decision::approved(checks)
    }

    /// Append the outcome; on failure, finalize the denial.
    fn deny_on_failure(
        checks: &mut Vec<CheckOutcome>,
        outcome: CheckOutcome,
        code: RejectCode,
    ) -> Option<Decision> {
        let failed = !outcome.passed;
        let name = outcome.check;
        let detail = outcome.detail.clone();
        checks.push(outcome);
        if failed {
            warn!("Governor: denied at {name}: {detail}");
            Some(Decision::denied(std::mem::take(checks), code))
        } else {
            None
        }
    }

    fn check_anti_tilt(&self, now: DateTime<Utc>) -> CheckOutcome {
        match self.anti_tilt.active_lockout(now) {
            Some(until) => {
                CheckOutcome::fail("anti_tilt", format!("Anti-tilt active until {until}"))
            }
            None => CheckOutcome::pass("anti_tilt", "Anti-tilt inactive"),
        }
    }

    fn check_news(&self, now: DateTime<Utc>) -> CheckOutcome {
        match self.news.blocking_event(now) {
            Some(event) => {
                CheckOutcome::fail("news_blackout", format!("Blackout window for '{event}'"))
            }
            None => CheckOutcome::pass("news_blackout", "No high-impact event nearby"),
        }
    }

    fn check_nemesis(&self, now: DateTime<Utc>) -> CheckOutcome {
        match self.nemesis.active_lockout(now) {
            Some(until) => {
                CheckOutcome::fail("nemesis", format!("Meditation in progress until {until}"))
            }
            None => CheckOutcome::pass("nemesis", "No meditation in progress"),
        }
    }

    /// Evaluate and, if admitted, dispatch through the fragmenter with each
    /// fragment protected by the execution circuit breaker.
    ///
    /// An open breaker surfaces as `Err(BreakerError::Open)` before anything
    /// is dispatched: the order was not attempted and may be retried once the
    /// recovery timeout elapses. Risk-policy denials are data, not errors.
    pub async fn submit(
        &self,
        order: &OrderRequest,
        market_price: Decimal,
        now: DateTime<Utc>,
    ) -> Result<SubmitOutcome, BreakerError<anyhow::Error>> {
        let (_tx, cancel) = watch::channel(false);
        self.submit_with_cancel(order, market_price, now, cancel)
            .await
    }

    /// As [`OrderGovernor::submit`], aborting between fragments when `cancel`
    /// flips to `true`.
    pub async fn submit_with_cancel(
        &self,
        order: &OrderRequest,
        market_price: Decimal,
        now: DateTime<Utc>,
        cancel: watch::Receiver<bool>,
    ) -> Result<SubmitOutcome, BreakerError<anyhow::Error>> {
        let decision = self.evaluate(order, market_price, now);
        if !decision.allowed {
            return Ok(SubmitOutcome::Denied(decision));
        }

        // Fail before dispatch when the circuit is open: the order is "not
        // yet attempted" and the fragmenter should not start a partial run.
        let status = self.breaker.status();
        if status.phase == BreakerPhase::Open {
            return Err(BreakerError::Open {
                name: self.breaker.name().to_string(),
                retry_after_secs: status
                    .retry_after
                    .map(|d| d.as_secs().max(1))
                    .unwrap_or(1),
            });
        }

        let breaker = Arc::clone(&self.breaker);
        let execution = Arc::clone(&self.execution);
        let report = self
            .fragmenter
            .dispatch(
                order,
                move |fragment| {
                    let breaker = Arc::clone(&breaker);
                    let execution = Arc::clone(&execution);
                    async move {
                        breaker
                            .execute(|| async { execution.execute(&fragment).await })
                            .await
                            .map_err(|e| match e {
                                BreakerError::Open { .. } => anyhow::anyhow!("{e}"),
                                BreakerError::Inner(inner) => inner,
                            })
                    }
                },
                cancel,
            )
            .await;

        Ok(SubmitOutcome::Executed { decision, report })
    }

    /// Trade-result fan-in: feeds the risk gate, the anti-tilt guard and, on
    /// losses with market context, the nemesis ledger.
    pub async fn on_trade_closed(
        &self,
        trade_id: &str,
        pnl: Decimal,
        context: Option<&LossContext>,
        now: DateTime<Utc>,
    ) {
        self.risk.record_trade_result(pnl);
        let is_loss = pnl < Decimal::ZERO;
        self.anti_tilt.record_result(is_loss, now);
        if is_loss {
            if let Some(context) = context {
                self.nemesis
                    .report_loss(trade_id, pnl.abs(), context, now)
                    .await;
            }
        }
    }
}
