use crate::domain::ports::{CalendarSource, ExecutionService, NotificationService, StateStore};
use crate::domain::types::{CalendarEvent, OrderFill, OrderRequest};
use anyhow::{Result, bail};
use async_trait::async_trait;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Scriptable execution collaborator for tests and local wiring.
///
/// Succeeds by default; `fail_next(n)` makes the next `n` calls fail, which
/// is how breaker transitions are exercised.
#[derive(Clone, Default)]
pub struct MockExecutionService {
    executed: Arc<RwLock<Vec<OrderRequest>>>,
    failures_remaining: Arc<AtomicUsize>,
}

impl MockExecutionService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, count: usize) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Orders that reached the broker, in dispatch order.
    pub async fn executed(&self) -> Vec<OrderRequest> {
        self.executed.read().await.clone()
    }
}

#[async_trait]
impl ExecutionService for MockExecutionService {
    async fn execute(&self, order: &OrderRequest) -> Result<OrderFill> {
        if self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            bail!("simulated broker failure");
        }
        self.executed.write().await.push(order.clone());
        Ok(OrderFill {
            ticket: Uuid::new_v4().to_string(),
            filled_price: order.reference_price(dec!(100)),
        })
    }
}

/// Calendar collaborator serving a settable batch.
#[derive(Clone, Default)]
pub struct MockCalendarSource {
    events: Arc<RwLock<Vec<CalendarEvent>>>,
}

impl MockCalendarSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_events(&self, events: Vec<CalendarEvent>) {
        *self.events.write().await = events;
    }
}

#[async_trait]
impl CalendarSource for MockCalendarSource {
    async fn fetch_events(&self) -> Result<Vec<CalendarEvent>> {
        Ok(self.events.read().await.clone())
    }
}

/// Recording notification fabric.
#[derive(Clone, Default)]
pub struct MockNotificationService {
    published: Arc<RwLock<Vec<(String, serde_json::Value)>>>,
    failing: Arc<AtomicUsize>,
}

impl MockNotificationService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every publish fail (delivery failures must be swallowed upstream).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(usize::from(failing), Ordering::SeqCst);
    }

    pub async fn published(&self) -> Vec<(String, serde_json::Value)> {
        self.published.read().await.clone()
    }
}

#[async_trait]
impl NotificationService for MockNotificationService {
    async fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) != 0 {
            bail!("notification fabric unavailable");
        }
        self.published
            .write()
            .await
            .push((topic.to_string(), payload));
        Ok(())
    }
}

/// In-memory key-value store; TTLs are accepted and ignored.
#[derive(Clone, Default)]
pub struct InMemoryStateStore {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String, _ttl: Option<Duration>) -> Result<()> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::OrderSide;

    fn order() -> OrderRequest {
        OrderRequest {
            symbol: "EURUSD".to_string(),
            side: OrderSide::Buy,
            volume: dec!(0.10),
            entry_price: None,
            stop_loss: Some(dec!(1.08)),
            take_profit: None,
        }
    }

    #[tokio::test]
    async fn mock_execution_fails_then_recovers() {
        let exec = MockExecutionService::new();
        exec.fail_next(2);
        assert!(exec.execute(&order()).await.is_err());
        assert!(exec.execute(&order()).await.is_err());
        assert!(exec.execute(&order()).await.is_ok());
        assert_eq!(exec.executed().await.len(), 1);
    }

    #[tokio::test]
    async fn state_store_round_trip() {
        let store = InMemoryStateStore::new();
        store
            .set("k", "v".to_string(), Some(Duration::from_secs(60)))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(store.get("missing").await.unwrap(), None);
    }
}
