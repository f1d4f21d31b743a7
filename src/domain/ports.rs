use crate::domain::types::{CalendarEvent, OrderFill, OrderRequest};
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

// Need async_trait for async functions in traits
#[async_trait]
pub trait ExecutionService: Send + Sync {
    /// Submit one (possibly fragmented) order to the broker.
    /// Each call is at-most-once; retry safety is not assumed.
    async fn execute(&self, order: &OrderRequest) -> Result<OrderFill>;
}

#[async_trait]
pub trait CalendarSource: Send + Sync {
    /// Fetch the current batch of economic calendar events.
    async fn fetch_events(&self) -> Result<Vec<CalendarEvent>>;
}

/// Best-effort pub/sub fabric. Failures are logged and swallowed by callers;
/// delivery is never awaited on the decision-critical path.
#[async_trait]
pub trait NotificationService: Send + Sync {
    async fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<()>;
}

/// Key-value snapshot store for guard state across restarts.
/// Absence degrades to in-memory-only operation.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()>;
}
