use crate::domain::decision::CheckOutcome;
use crate::domain::types::OrderRequest;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Quantitative risk limits, all expressed in percent of equity.
#[derive(Debug, Clone)]
pub struct RiskGateConfig {
    pub max_risk_per_trade: Decimal,
    pub max_daily_drawdown: Decimal,
    pub max_total_drawdown: Decimal,
    pub max_open_positions: usize,
    /// Account-currency value of one price unit of movement per lot
    /// (100 for a standard metals contract).
    pub unit_value: Decimal,
}

impl Default for RiskGateConfig {
    fn default() -> Self {
        Self {
            max_risk_per_trade: dec!(1.0),
            max_daily_drawdown: dec!(4.0),
            max_total_drawdown: dec!(8.0),
            max_open_positions: 3,
            unit_value: dec!(100),
        }
    }
}

/// Account-level state feeding the quantitative checks.
///
/// Owned exclusively by [`RiskGate`]; mutated only through its update entry
/// points, read (never written) by evaluation.
#[derive(Debug, Clone)]
pub struct AccountRiskState {
    pub equity: Decimal,
    pub daily_pnl: Decimal,
    pub total_pnl: Decimal,
    pub open_positions: usize,
}

impl Default for AccountRiskState {
    fn default() -> Self {
        Self {
            equity: dec!(100_000),
            daily_pnl: Decimal::ZERO,
            total_pnl: Decimal::ZERO,
            open_positions: 0,
        }
    }
}

/// Snapshot of the gate's drawdown posture for observability.
#[derive(Debug, Clone)]
pub struct RiskStatus {
    pub equity: Decimal,
    pub daily_drawdown_percent: Decimal,
    pub total_drawdown_percent: Decimal,
    pub open_positions: usize,
}

/// Per-trade and drawdown arithmetic over [`AccountRiskState`].
///
/// Check methods are read-only and idempotent; state changes only flow
/// through [`RiskGate::record_trade_result`], [`RiskGate::set_equity`] and
/// [`RiskGate::set_open_positions`].
pub struct RiskGate {
    config: RiskGateConfig,
    state: Mutex<AccountRiskState>,
}

impl RiskGate {
    pub fn new(config: RiskGateConfig) -> Self {
        Self::with_state(config, AccountRiskState::default())
    }

    pub fn with_state(config: RiskGateConfig, state: AccountRiskState) -> Self {
        Self {
            config,
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AccountRiskState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stop-loss must be present and strictly positive before admission.
    pub fn check_stop_loss(&self, order: &OrderRequest) -> CheckOutcome {
        match order.stop_loss {
            Some(sl) if sl > Decimal::ZERO => CheckOutcome::pass("stop_loss", "Stop loss present"),
            Some(_) => CheckOutcome::fail("stop_loss", "Stop loss must be positive"),
            None => CheckOutcome::fail("stop_loss", "Stop loss missing"),
        }
    }

    /// Potential loss at the stop, as a percentage of equity.
    pub fn risk_percent(&self, order: &OrderRequest, market_price: Decimal) -> Decimal {
        let Some(stop_loss) = order.stop_loss else {
            return dec!(100); // unbounded risk without a stop
        };
        let equity = self.lock().equity;
        if equity <= Decimal::ZERO {
            return dec!(100);
        }
        let sl_distance = (order.reference_price(market_price) - stop_loss).abs();
        let potential_loss = sl_distance * order.volume * self.config.unit_value;
        (potential_loss / equity * dec!(100)).round_dp(2)
    }

    pub fn check_risk_per_trade(&self, order: &OrderRequest, market_price: Decimal) -> CheckOutcome {
        let risk = self.risk_percent(order, market_price);
        if risk > self.config.max_risk_per_trade {
            CheckOutcome::fail(
                "risk_per_trade",
                format!("Risk {risk}% > max {}%", self.config.max_risk_per_trade),
            )
        } else {
            CheckOutcome::pass("risk_per_trade", format!("Risk {risk}% OK"))
        }
    }

    pub fn check_daily_drawdown(&self) -> CheckOutcome {
        let dd = self.daily_drawdown_percent();
        if dd >= self.config.max_daily_drawdown {
            CheckOutcome::fail(
                "daily_drawdown",
                format!(
                    "Daily drawdown {dd}% >= limit {}%",
                    self.config.max_daily_drawdown
                ),
            )
        } else {
            CheckOutcome::pass("daily_drawdown", format!("Daily drawdown {dd}% OK"))
        }
    }

    pub fn check_total_drawdown(&self) -> CheckOutcome {
        let dd = self.total_drawdown_percent();
        if dd >= self.config.max_total_drawdown {
            CheckOutcome::fail(
                "total_drawdown",
                format!(
                    "Total drawdown {dd}% >= limit {}%",
                    self.config.max_total_drawdown
                ),
            )
        } else {
            CheckOutcome::pass("total_drawdown", format!("Total drawdown {dd}% OK"))
        }
    }

    pub fn check_max_positions(&self) -> CheckOutcome {
        let open = self.lock().open_positions;
        if open >= self.config.max_open_positions {
            CheckOutcome::fail(
                "max_positions",
                format!("Max positions reached ({})", self.config.max_open_positions),
            )
        } else {
            CheckOutcome::pass(
                "max_positions",
                format!("Positions {open}/{}", self.config.max_open_positions),
            )
        }
    }

    /// Run the gate's five checks in order, short-circuiting on first failure.
    /// Read-only; safe to call concurrently with itself.
    pub fn evaluate(&self, order: &OrderRequest, market_price: Decimal) -> Vec<CheckOutcome> {
        let mut checks = Vec::with_capacity(5);
        for outcome in [
            self.check_stop_loss(order),
            self.check_risk_per_trade(order, market_price),
            self.check_daily_drawdown(),
            self.check_total_drawdown(),
            self.check_max_positions(),
        ] {
            let failed = !outcome.passed;
            checks.push(outcome);
            if failed {
                break;
            }
        }
        checks
    }

    fn daily_drawdown_percent(&self) -> Decimal {
        let state = self.lock();
        Self::drawdown_percent(state.daily_pnl, state.equity)
    }

    fn total_drawdown_percent(&self) -> Decimal {
        let state = self.lock();
        Self::drawdown_percent(state.total_pnl, state.equity)
    }

    fn drawdown_percent(pnl: Decimal, equity: Decimal) -> Decimal {
        if equity <= Decimal::ZERO || pnl >= Decimal::ZERO {
            return Decimal::ZERO;
        }
        (pnl.abs() / equity * dec!(100)).round_dp(2)
    }

    /// Fold a closed trade's P&L into the daily and cumulative totals.
    pub fn record_trade_result(&self, pnl: Decimal) {
        let mut state = self.lock();
        state.daily_pnl += pnl;
        state.total_pnl += pnl;
        debug!(
            "RiskGate: trade result {pnl} recorded (daily {}, total {})",
            state.daily_pnl, state.total_pnl
        );
    }

    pub fn set_open_positions(&self, count: usize) {
        self.lock().open_positions = count;
    }

    pub fn set_equity(&self, equity: Decimal) {
        self.lock().equity = equity;
    }

    /// Daily rollover: zero the daily P&L, keep the cumulative total.
    pub fn reset_daily(&self) {
        self.lock().daily_pnl = Decimal::ZERO;
        debug!("RiskGate: daily P&L reset");
    }

    pub fn status(&self) -> RiskStatus {
        let state = self.lock();
        RiskStatus {
            equity: state.equity,
            daily_drawdown_percent: Self::drawdown_percent(state.daily_pnl, state.equity),
            total_drawdown_percent: Self::drawdown_percent(state.total_pnl, state.equity),
            open_positions: state.open_positions,
        }
    }
}
