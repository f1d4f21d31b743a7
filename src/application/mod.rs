// Consecutive-loss cooldown
pub mod anti_tilt;

// Composition root
pub mod bootstrap;

// Volume-conserving order splitting
pub mod fragmenter;

// Ordered decision pipeline
pub mod governor;

// Adaptive loss-cause lockout
pub mod nemesis;

// Economic-calendar window filter
pub mod news_blackout;

// Quantitative per-trade and drawdown checks
pub mod risk_gate;
