use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of decimal places a lot volume may carry.
pub const LOT_PRECISION: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// A proposed order, as submitted for admission control.
///
/// `entry_price` is set for limit orders; market orders carry `None` and are
/// priced against the caller-supplied market price during evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub volume: Decimal,
    pub entry_price: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
}

impl OrderRequest {
    /// Price used for risk arithmetic: the limit price if present, otherwise
    /// the latest market price supplied by the caller.
    pub fn reference_price(&self, market_price: Decimal) -> Decimal {
        self.entry_price.unwrap_or(market_price)
    }

    /// Copy of this order with a different volume (fragment construction).
    pub fn with_volume(&self, volume: Decimal) -> Self {
        Self {
            volume,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImpactLevel {
    Low,
    Medium,
    High,
}

/// Economic calendar entry supplied by the calendar collaborator.
/// Immutable once fetched; a refresh replaces the whole batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub name: String,
    pub impact: ImpactLevel,
    pub time: DateTime<Utc>,
}

/// Successful fill returned by the execution collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderFill {
    pub ticket: String,
    pub filled_price: Decimal,
}

/// Outcome of a single fragment dispatch.
///
/// `attempted == false` marks fragments skipped after a cancellation;
/// they carry no ticket and no error.
#[derive(Debug, Clone)]
pub struct FragmentFill {
    pub volume: Decimal,
    pub attempted: bool,
    pub success: bool,
    pub ticket: Option<String>,
    pub error: Option<String>,
}

/// Aggregate result of dispatching one order, covering every fragment.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub order_volume: Decimal,
    pub fragments: Vec<FragmentFill>,
    pub cancelled: bool,
}

impl ExecutionReport {
    pub fn all_filled(&self) -> bool {
        !self.cancelled && self.fragments.iter().all(|f| f.success)
    }

    /// Total volume confirmed filled across fragments.
    pub fn filled_volume(&self) -> Decimal {
        self.fragments
            .iter()
            .filter(|f| f.success)
            .map(|f| f.volume)
            .sum()
    }
}

/// Market context attached to a reported trade loss, used for
/// loss-cause classification.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LossContext {
    pub volatility: f64,
    pub news_event: bool,
    pub trend_reversal: bool,
}
