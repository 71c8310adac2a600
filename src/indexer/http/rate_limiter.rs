//! Per-indexer request spacing
//!
//! Each indexer gets its own governor limiter with a burst of one, so two
//! requests to the same indexer are never dispatched closer than its minimum
//! interval. Indexers never throttle each other.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, error, trace};

use crate::error::{IndexerError, Result};

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Clock slack accepted when checking recorded dispatch times
const DISPATCH_TOLERANCE: Duration = Duration::from_millis(2);

struct IndexerSlot {
    interval: Duration,
    limiter: Option<DirectLimiter>,
    /// Held across the wait so dispatches are recorded in permit order.
    /// Shared with the slot that replaces this one on reconfiguration.
    last_dispatch: Arc<Mutex<Option<Instant>>>,
}

impl IndexerSlot {
    fn new(interval: Duration) -> Self {
        Self::with_history(interval, Arc::new(Mutex::new(None)))
    }

    fn with_history(interval: Duration, last_dispatch: Arc<Mutex<Option<Instant>>>) -> Self {
        let limiter = Quota::with_period(interval)
            .map(|quota| RateLimiter::direct(quota.allow_burst(NonZeroU32::MIN)));
        Self {
            interval,
            limiter,
            last_dispatch,
        }
    }
}

/// Lazily populated table of per-indexer limiters
pub struct RateLimiterPool {
    default_interval: Duration,
    slots: RwLock<HashMap<String, Arc<IndexerSlot>>>,
}

impl RateLimiterPool {
    pub fn new(default_interval: Duration) -> Self {
        Self {
            default_interval,
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Set the minimum interval for an indexer. Replaces any existing limiter
    /// but keeps its record of the last dispatch.
    pub fn configure(&self, indexer_id: &str, interval: Duration) {
        let mut slots = self.slots.write();
        let history = slots
            .get(indexer_id)
            .map(|slot| slot.last_dispatch.clone())
            .unwrap_or_default();
        slots.insert(
            indexer_id.to_string(),
            Arc::new(IndexerSlot::with_history(interval, history)),
        );
    }

    pub fn interval(&self, indexer_id: &str) -> Duration {
        self.slot(indexer_id).interval
    }

    fn slot(&self, indexer_id: &str) -> Arc<IndexerSlot> {
        if let Some(slot) = self.slots.read().get(indexer_id) {
            return slot.clone();
        }
        self.slots
            .write()
            .entry(indexer_id.to_string())
            .or_insert_with(|| Arc::new(IndexerSlot::new(self.default_interval)))
            .clone()
    }

    /// Wait until a request to `indexer_id` may be dispatched and record it.
    ///
    /// `override_interval` replaces the indexer's interval for this request when
    /// it is longer.
    pub async fn acquire(&self, indexer_id: &str, override_interval: Option<Duration>) -> Result<()> {
        let slot = self.slot(indexer_id);
        let required = override_interval.map_or(slot.interval, |o| o.max(slot.interval));

        let mut last = slot.last_dispatch.lock().await;
        if let Some(ref limiter) = slot.limiter {
            limiter.until_ready().await;
        }

        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < required {
                let wait = required - elapsed;
                trace!(indexer_id = %indexer_id, wait_ms = wait.as_millis() as u64, "Delaying request");
                tokio::time::sleep(wait).await;
            }
        }

        let now = Instant::now();
        if let Some(prev) = *last {
            let elapsed = now.duration_since(prev);
            if elapsed + DISPATCH_TOLERANCE < required {
                error!(
                    indexer_id = %indexer_id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    interval_ms = required.as_millis() as u64,
                    "Rate limit violated"
                );
                return Err(IndexerError::RateLimitViolation {
                    indexer: indexer_id.to_string(),
                    elapsed_ms: elapsed.as_millis() as u64,
                    interval_ms: required.as_millis() as u64,
                });
            }
            debug!(
                indexer_id = %indexer_id,
                since_last_ms = elapsed.as_millis() as u64,
                "Request permitted"
            );
        }
        *last = Some(now);
        Ok(())
    }
}
