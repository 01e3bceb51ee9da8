//! Freshness, stale fallback and eviction policy tests

mod common;

use std::sync::Arc;

use candle_cache::{
    CacheConfig, CacheKey, CacheManager, CandleStore, Clock, ManualClock, Market, Timeframe,
};
use common::{btc, candles, ready_store, temp_config, unreachable_config};

const T0: i64 = 1_700_000_000_000;

fn manager(store: Arc<CandleStore>, config: &CacheConfig) -> (CacheManager, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(T0));
    let cache = CacheManager::with_clock(store, config, clock.clone());
    (cache, clock)
}

#[tokio::test]
async fn test_fresh_until_exactly_one_bar_interval() {
    let (_dir, config) = temp_config();
    let (cache, clock) = manager(ready_store(&config).await, &config);

    for timeframe in Timeframe::ALL {
        let key = btc(timeframe);
        let window = timeframe.freshness_window().num_milliseconds();

        clock.set(T0);
        cache.set(&key, &candles(5)).await;

        clock.set(T0 + window - 1);
        assert_eq!(cache.get_fresh(&key).await, Some(candles(5)), "{} just inside window", timeframe);

        clock.set(T0 + window);
        assert_eq!(cache.get_fresh(&key).await, None, "{} at window boundary", timeframe);
    }
}

#[tokio::test]
async fn test_get_fresh_miss_when_absent() {
    let (_dir, config) = temp_config();
    let (cache, _clock) = manager(ready_store(&config).await, &config);
    assert!(cache.get_fresh(&btc(Timeframe::H1)).await.is_none());
    assert!(cache.get_stale(&btc(Timeframe::H1)).await.is_none());
}

#[tokio::test]
async fn test_get_stale_returns_expired_data_flagged() {
    let (_dir, config) = temp_config();
    let (cache, clock) = manager(ready_store(&config).await, &config);
    let key = btc(Timeframe::M1);

    cache.set(&key, &candles(3)).await;

    let fresh = cache.get_stale(&key).await.unwrap();
    assert!(!fresh.is_stale);
    assert_eq!(fresh.last_fetched_at, T0);

    clock.advance(3_600_000);
    let stale = cache.get_stale(&key).await.unwrap();
    assert!(stale.is_stale);
    assert_eq!(stale.series, candles(3));
    assert_eq!(stale.last_fetched_at, T0);
    assert!(cache.get_fresh(&key).await.is_none());
}

#[tokio::test]
async fn test_set_truncates_to_most_recent_800() {
    let (_dir, config) = temp_config();
    let (cache, _clock) = manager(ready_store(&config).await, &config);
    let key = btc(Timeframe::H4);
    let incoming = candles(950);

    cache.set(&key, &incoming).await;

    let stored = cache.get_stale(&key).await.unwrap();
    assert_eq!(stored.series.len(), 800);
    assert_eq!(stored.series[..], incoming[150..]);
}

#[tokio::test]
async fn test_set_replaces_rather_than_merges() {
    let (_dir, config) = temp_config();
    let (cache, clock) = manager(ready_store(&config).await, &config);
    let key = btc(Timeframe::D1);

    cache.set(&key, &candles(20)).await;
    clock.advance(1_000);
    cache.set(&key, &candles(2)).await;

    let stored = cache.get_stale(&key).await.unwrap();
    assert_eq!(stored.series, candles(2));
    assert_eq!(stored.last_fetched_at, T0 + 1_000);
}

#[tokio::test]
async fn test_writing_105_keys_keeps_newest_100() {
    let (_dir, config) = temp_config();
    let (cache, clock) = manager(ready_store(&config).await, &config);

    let keys: Vec<CacheKey> = (0..105)
        .map(|i| CacheKey::new(format!("COIN{}", i), Market::Perp, Timeframe::H1))
        .collect();

    for key in &keys {
        clock.advance(1);
        cache.set(key, &candles(2)).await;
    }
    cache.flush_evictions().await;

    assert_eq!(cache.count().await, 100);
    for key in &keys[..5] {
        assert!(cache.get_stale(key).await.is_none(), "{} should be evicted", key);
    }
    for key in &keys[5..] {
        assert!(cache.get_stale(key).await.is_some(), "{} should remain", key);
    }
}

#[tokio::test]
async fn test_evict_respects_configured_cap() {
    let (_dir, mut config) = temp_config();
    config.max_entries = 3;
    let store = ready_store(&config).await;
    let (cache, clock) = manager(store.clone(), &config);

    for timeframe in Timeframe::ALL {
        clock.advance(10);
        // Straight to the store so only the explicit evict trims
        store.put(&btc(timeframe), &candles(1), clock.now_ms()).await.unwrap();
    }
    assert_eq!(cache.count().await, 6);

    assert_eq!(cache.evict().await, 3);
    assert_eq!(cache.count().await, 3);
    assert_eq!(cache.evict().await, 0);

    let remaining: Vec<Timeframe> = cache.entries().await.into_iter().map(|e| e.key.timeframe).collect();
    assert_eq!(remaining, vec![Timeframe::D1, Timeframe::H4, Timeframe::H1]);
}

#[tokio::test]
async fn test_unavailable_store_fails_open() {
    let config = unreachable_config();
    let store = Arc::new(CandleStore::new(&config));
    let (cache, _clock) = manager(store.clone(), &config);
    let key = btc(Timeframe::M5);

    cache.set(&key, &candles(3)).await;
    cache.flush_evictions().await;

    assert!(!store.is_ready());
    assert!(cache.get_fresh(&key).await.is_none());
    assert!(cache.get_stale(&key).await.is_none());
    assert_eq!(cache.count().await, 0);
    assert_eq!(cache.evict().await, 0);
    assert_eq!(cache.clear().await, 0);
    assert_eq!(cache.stats().await.total_entries, 0);
}

#[tokio::test]
async fn test_first_operation_initializes_store() {
    let (_dir, config) = temp_config();
    let store = Arc::new(CandleStore::new(&config));
    let (cache, _clock) = manager(store.clone(), &config);

    assert!(!store.is_ready());
    cache.set(&btc(Timeframe::H1), &candles(1)).await;
    assert!(store.is_ready());
    assert!(cache.get_fresh(&btc(Timeframe::H1)).await.is_some());
}

#[tokio::test]
async fn test_clear_and_stats() {
    let (_dir, config) = temp_config();
    let (cache, clock) = manager(ready_store(&config).await, &config);

    cache.set(&btc(Timeframe::M1), &candles(1)).await;
    clock.advance(5_000);
    cache.set(&btc(Timeframe::M5), &candles(1)).await;

    let stats = cache.stats().await;
    assert_eq!(stats.total_entries, 2);
    assert_eq!(stats.oldest_entry, Some(T0));
    assert_eq!(stats.newest_entry, Some(T0 + 5_000));

    assert_eq!(cache.clear().await, 2);
    assert_eq!(cache.count().await, 0);
}

async fn seed(store: &CandleStore, n: usize) {
    for i in 0..n {
        let key = CacheKey::new(format!("COIN{}", i), Market::Perp, Timeframe::H1);
        store.put(&key, &candles(1), T0 + i as i64).await.unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_overlapping_evictions_stop_at_cap() {
    let (_dir, config) = temp_config();
    let store = ready_store(&config).await;
    let (a, _) = manager(store.clone(), &config);
    let (b, _) = manager(store.clone(), &config);

    for _ in 0..10 {
        store.clear_all().await.unwrap();
        seed(&store, 105).await;

        let (removed_a, removed_b) = tokio::join!(a.evict(), b.evict());

        assert_eq!(removed_a + removed_b, 5);
        assert_eq!(store.count().await.unwrap(), 100);
    }

    // The five oldest went, nothing newer
    for i in 0..5 {
        let key = CacheKey::new(format!("COIN{}", i), Market::Perp, Timeframe::H1);
        assert!(store.get(&key).await.unwrap().is_none());
    }
    let survivor = CacheKey::new("COIN5", Market::Perp, Timeframe::H1);
    assert!(store.get(&survivor).await.unwrap().is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_direct_evict_racing_background_worker() {
    let (_dir, config) = temp_config();
    let store = ready_store(&config).await;
    let (cache, clock) = manager(store.clone(), &config);

    seed(&store, 100).await;
    clock.set(T0 + 1_000);

    let writer = async {
        for i in 100..110 {
            let key = CacheKey::new(format!("COIN{}", i), Market::Perp, Timeframe::H1);
            cache.set(&key, &candles(1)).await;
        }
    };
    let evictor = async {
        for _ in 0..10 {
            cache.evict().await;
        }
    };
    tokio::join!(writer, evictor);
    cache.flush_evictions().await;

    assert_eq!(cache.count().await, 100);
}
