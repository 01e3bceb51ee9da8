#![allow(dead_code)]

use std::sync::Arc;

use candle_cache::{CacheConfig, CacheKey, CandleRecord, CandleStore, Market, Timeframe};
use tempfile::TempDir;

/// Isolated on-disk store; keep the `TempDir` alive for the test's duration.
pub fn temp_config() -> (TempDir, CacheConfig) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("candle_cache.db");
    let config = CacheConfig::with_database_url(format!("sqlite://{}?mode=rwc", path.display()));
    (dir, config)
}

pub async fn ready_store(config: &CacheConfig) -> Arc<CandleStore> {
    let store = Arc::new(CandleStore::new(config));
    store.init().await;
    assert!(store.is_ready());
    store
}

/// Store pointing somewhere it can never open
pub fn unreachable_config() -> CacheConfig {
    CacheConfig::with_database_url("sqlite:///nonexistent-candle-cache-dir/sub/cache.db")
}

pub fn candles(count: usize) -> Vec<CandleRecord> {
    (0..count)
        .map(|i| {
            let base = 100.0 + i as f64;
            CandleRecord::new(1_700_000_000_000 + i as i64 * 60_000, base, base + 2.0, base - 1.0, base + 1.0)
        })
        .collect()
}

pub fn btc(timeframe: Timeframe) -> CacheKey {
    CacheKey::new("BTC", Market::Perp, timeframe)
}
