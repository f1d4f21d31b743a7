use crate::domain::types::{ExecutionReport, FragmentFill, OrderFill, OrderRequest};
use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal_macros::dec;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct FragmenterConfig {
    /// Orders at or below this volume are dispatched whole.
    pub fragmentation_threshold: Decimal,
    pub min_fragments: u32,
    pub max_fragments: u32,
    /// Fraction of the original volume taken by each non-final fragment.
    pub fraction_min: f64,
    pub fraction_max: f64,
    /// Jitter before dispatching an unfragmented order, seconds.
    pub small_delay_min_secs: f64,
    pub small_delay_max_secs: f64,
    /// Jitter between fragments, seconds.
    pub fragment_delay_min_secs: f64,
    pub fragment_delay_max_secs: f64,
    /// Decimal places of the symbol's lot size.
    pub lot_precision: u32,
}

impl Default for FragmenterConfig {
    fn default() -> Self {
        Self {
            fragmentation_threshold: dec!(0.05),
            min_fragments: 2,
            max_fragments: 4,
            fraction_min: 0.2,
            fraction_max: 0.4,
            small_delay_min_secs: 0.1,
            small_delay_max_secs: 1.5,
            fragment_delay_min_secs: 0.5,
            fragment_delay_max_secs: 5.0,
            lot_precision: crate::domain::types::LOT_PRECISION,
        }
    }
}

/// One planned fragment dispatch: how long to wait, then how much to send.
struct PlannedFragment {
    delay: Duration,
    volume: Decimal,
}

/// Volume-conserving order splitter with jittered dispatch.
///
/// Large orders are broken into 2-4 child orders whose volumes sum exactly to
/// the original, dispatched sequentially with randomized delays to break the
/// timing signature. The returned [`ExecutionReport`] covers every fragment,
/// including ones skipped after cancellation.
pub struct ExecutionFragmenter {
    config: FragmenterConfig,
    rng: Mutex<StdRng>,
}

impl ExecutionFragmenter {
    pub fn new(config: FragmenterConfig) -> Self {
        Self {
            config,
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Deterministic variant for tests.
    pub fn with_seed(config: FragmenterConfig, seed: u64) -> Self {
        Self {
            config,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn lock_rng(&self) -> MutexGuard<'_, StdRng> {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Split `volume` into fragment volumes.
    ///
    /// Invariants: every fragment is strictly positive and the fragments sum
    /// to `volume` exactly (the final fragment takes the untouched remainder).
    pub fn split(&self, volume: Decimal) -> Vec<Decimal> {
        let precision = self.config.lot_precision;
        let mut rng = self.lock_rng();
        let count = rng.random_range(self.config.min_fragments..=self.config.max_fragments);

        let mut fragments = Vec::with_capacity(count as usize);
        let mut remaining = volume;
        for _ in 0..count.saturating_sub(1) {
            let fraction = rng.random_range(self.config.fraction_min..self.config.fraction_max);
            let mut part = (volume * Decimal::from_f64(fraction).unwrap_or(dec!(0.3)))
                .round_dp(precision);
            if part >= remaining {
                part = (remaining / dec!(2)).round_dp(precision);
            }
            if part <= Decimal::ZERO {
                break;
            }
            fragments.push(part);
            remaining -= part;
        }
        fragments.push(remaining);
        fragments
    }

    /// Plan the whole dispatch up front so the RNG lock is never held across
    /// an await point.
    fn plan(&self, volume: Decimal) -> Vec<PlannedFragment> {
        if volume <= self.config.fragmentation_threshold {
            let delay = {
                let mut rng = self.lock_rng();
                rng.random_range(self.config.small_delay_min_secs..=self.config.small_delay_max_secs)
            };
            return vec![PlannedFragment {
                delay: Duration::from_secs_f64(delay),
                volume,
            }];
        }

        let volumes = self.split(volume);
        let mut rng = self.lock_rng();
        volumes
            .into_iter()
            .map(|volume| PlannedFragment {
                delay: Duration::from_secs_f64(rng.random_range(
                    self.config.fragment_delay_min_secs..=self.config.fragment_delay_max_secs,
                )),
                volume,
            })
            .collect()
    }

    /// Dispatch `order`, fragmenting it when above the threshold.
    ///
    /// `cancel` aborts between fragments: already-dispatched fragments are
    /// reported as-is, the rest appear with `attempted == false`.
    pub async fn dispatch<F, Fut>(
        &self,
        order: &OrderRequest,
        execute_fn: F,
        mut cancel: watch::Receiver<bool>,
    ) -> ExecutionReport
    where
        F: Fn(OrderRequest) -> Fut,
        Fut: Future<Output = Result<OrderFill>>,
    {
        let planned = self.plan(order.volume);
        if planned.len() > 1 {
            info!(
                "Fragmenter: splitting {} {} into {} pieces",
                order.volume,
                order.symbol,
                planned.len()
            );
        }

        let mut fragments = Vec::with_capacity(planned.len());
        let mut cancelled = false;
        for (i, fragment) in planned.iter().enumerate() {
            if cancelled || *cancel.borrow() {
                cancelled = true;
                fragments.push(FragmentFill {
                    volume: fragment.volume,
                    attempted: false,
                    success: false,
                    ticket: None,
                    error: None,
                });
                continue;
            }

            debug!(
                "Fragmenter: fragment {}/{} ({} lots) after {:.2}s delay",
                i + 1,
                planned.len(),
                fragment.volume,
                fragment.delay.as_secs_f64()
            );
            if wait_or_cancelled(fragment.delay, &mut cancel).await {
                warn!("Fragmenter: dispatch cancelled before fragment {}", i + 1);
                cancelled = true;
                fragments.push(FragmentFill {
                    volume: fragment.volume,
                    attempted: false,
                    success: false,
                    ticket: None,
                    error: None,
                });
                continue;
            }

            match execute_fn(order.with_volume(fragment.volume)).await {
                Ok(fill) => fragments.push(FragmentFill {
                    volume: fragment.volume,
                    attempted: true,
                    success: true,
                    ticket: Some(fill.ticket),
                    error: None,
                }),
                Err(e) => {
                    warn!("Fragmenter: fragment {} failed: {e:#}", i + 1);
                    fragments.push(FragmentFill {
                        volume: fragment.volume,
                        attempted: true,
                        success: false,
                        ticket: None,
                        error: Some(format!("{e:#}")),
                    });
                }
            }
        }

        ExecutionReport {
            order_volume: order.volume,
            fragments,
            cancelled,
        }
    }
}

/// Sleep for `delay`, returning early with `true` if the cancel flag flips.
async fn wait_or_cancelled(delay: Duration, cancel: &mut watch::Receiver<bool>) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            () = &mut sleep => return false,
            changed = cancel.changed() => match changed {
                Ok(()) => {
                    if *cancel.borrow() {
                        return true;
                    }
                }
                Err(_) => {
                    // Sender dropped: cancellation can no longer arrive.
                    (&mut sleep).await;
                    return false;
                }
            },
        }
    }
}
