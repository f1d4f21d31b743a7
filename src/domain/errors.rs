use thiserror::Error;

/// Reason an order was denied by the admission pipeline.
///
/// Every variant is returned as data inside a [`crate::domain::decision::Decision`];
/// none of them crosses the evaluation boundary as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RejectCode {
    #[error("Order is malformed")]
    InvalidOrder,

    #[error("Stop loss is missing or not positive")]
    MissingStopLoss,

    #[error("Per-trade risk limit exceeded")]
    RiskPerTradeExceeded,

    #[error("Daily drawdown limit reached")]
    DailyDrawdownLimit,

    #[error("Total drawdown limit reached")]
    TotalDrawdownLimit,

    #[error("Maximum open positions reached")]
    MaxPositionsReached,

    #[error("Anti-tilt cooldown active")]
    AntiTiltActive,

    #[error("News blackout window active")]
    NewsBlackoutActive,

    #[error("Nemesis lockout active")]
    NemesisLockoutActive,
}

/// Error surfaced by a circuit-breaker protected call.
///
/// `Open` means the wrapped function was never invoked: the caller should
/// treat the operation as not yet attempted and retry after `retry_after_secs`.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    #[error("Circuit breaker [{name}] is open; retry in {retry_after_secs}s")]
    Open { name: String, retry_after_secs: u64 },

    #[error(transparent)]
    Inner(E),
}

impl<E> BreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open { .. })
    }
}
