pub mod circuit_breaker;
pub mod mock;

pub use circuit_breaker::{BreakerConfig, BreakerPhase, BreakerStatus, CircuitBreaker};
