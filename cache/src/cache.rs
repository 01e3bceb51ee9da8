//! Cache Manager: freshness and capacity policy over the candle store.
//!
//! Every public operation fails open. Store problems are logged and surface as a
//! cache miss, a zero count or empty stats, never as an error to the caller.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{error, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::CacheConfig;
use crate::models::{CacheKey, CandleRecord, EntrySummary, StaleCandles, StoreStats, StoredSeries};
use crate::store::CandleStore;

enum EvictionRequest {
    Evict,
    Flush(oneshot::Sender<()>),
}

pub struct CacheManager {
    store: Arc<CandleStore>,
    clock: Arc<dyn Clock>,
    max_entries: u64,
    evictions: mpsc::UnboundedSender<EvictionRequest>,
}

impl CacheManager {
    /// Spawns the background eviction worker, so this must run inside a tokio runtime.
    pub fn new(store: Arc<CandleStore>, config: &CacheConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<CandleStore>, config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_eviction_worker(store.clone(), config.max_entries, rx));

        Self {
            store,
            clock,
            max_entries: config.max_entries,
            evictions: tx,
        }
    }

    async fn read(&self, key: &CacheKey) -> Option<StoredSeries> {
        self.store.init().await;
        match self.store.get(key).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(key = %key, "Candle cache read failed, treating as miss: {}", e);
                None
            }
        }
    }

    fn is_fresh(&self, key: &CacheKey, last_fetched_at: i64) -> bool {
        let age = self.clock.now_ms() - last_fetched_at;
        age < key.timeframe.freshness_window().num_milliseconds()
    }

    /// Cached series if it is younger than one bar interval, otherwise `None`.
    pub async fn get_fresh(&self, key: &CacheKey) -> Option<Vec<CandleRecord>> {
        let stored = self.read(key).await?;
        if self.is_fresh(key, stored.last_fetched_at) {
            Some(stored.series)
        } else {
            None
        }
    }

    /// Cached series regardless of age, flagged when it would fail the freshness check.
    pub async fn get_stale(&self, key: &CacheKey) -> Option<StaleCandles> {
        let stored = self.read(key).await?;
        let is_stale = !self.is_fresh(key, stored.last_fetched_at);
        Some(StaleCandles {
            series: stored.series,
            last_fetched_at: stored.last_fetched_at,
            is_stale,
        })
    }

    /// Stamp the series with the current time and replace the row for `key`.
    ///
    /// Eviction is queued on the background worker; this call does not wait for it.
    pub async fn set(&self, key: &CacheKey, series: &[CandleRecord]) {
        self.store.init().await;
        let fetched_at = self.clock.now_ms();
        if let Err(e) = self.store.put(key, series, fetched_at).await {
            warn!(key = %key, "Candle cache write failed: {}", e);
        }

        if self.evictions.send(EvictionRequest::Evict).is_err() {
            warn!("Eviction worker is gone, skipping eviction");
        }
    }

    /// Wait until every eviction queued so far has finished.
    pub async fn flush_evictions(&self) {
        let (tx, rx) = oneshot::channel();
        if self.evictions.send(EvictionRequest::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    /// Trim the store back to capacity, oldest fetch first. Returns rows removed.
    pub async fn evict(&self) -> u64 {
        self.store.init().await;
        match self.store.delete_excess(self.max_entries).await {
            Ok(removed) => removed,
            Err(e) => {
                error!("Candle cache eviction failed: {}", e);
                0
            }
        }
    }

    pub async fn count(&self) -> u64 {
        self.store.init().await;
        self.store.count().await.unwrap_or_else(|e| {
            warn!("Candle cache count failed: {}", e);
            0
        })
    }

    pub async fn stats(&self) -> StoreStats {
        self.store.init().await;
        self.store.stats().await.unwrap_or_else(|e| {
            warn!("Candle cache stats failed: {}", e);
            StoreStats::default()
        })
    }

    pub async fn entries(&self) -> Vec<EntrySummary> {
        self.store.init().await;
        self.store.keys().await.unwrap_or_else(|e| {
            warn!("Candle cache key listing failed: {}", e);
            Vec::new()
        })
    }

    /// Drop every cached series. Returns rows removed.
    pub async fn clear(&self) -> u64 {
        self.store.init().await;
        self.store.clear_all().await.unwrap_or_else(|e| {
            warn!("Candle cache clear failed: {}", e);
            0
        })
    }
}

async fn run_eviction_worker(
    store: Arc<CandleStore>,
    max_entries: u64,
    mut requests: mpsc::UnboundedReceiver<EvictionRequest>,
) {
    while let Some(request) = requests.recv().await {
        match request {
            EvictionRequest::Evict => {
                if let Err(e) = store.delete_excess(max_entries).await {
                    error!("Background candle cache eviction failed: {}", e);
                }
            }
            EvictionRequest::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}
