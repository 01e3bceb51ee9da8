//! Chart data loader: the fresh-cache / retrying-fetch / stale-fallback flow a
//! chart screen runs for every data request.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::CacheManager;
use crate::classify::{classify, final_message, is_retryable};
use crate::models::{CacheKey, CandleRecord};
use crate::retry::{with_retry, RetryPolicy};
use crate::source::CandleSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataOrigin {
    /// Cache hit inside the freshness window, no network
    Fresh,
    /// Fetched just now and written back to the cache
    Network,
    /// Fetch failed; last known data from the cache
    Stale,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartData {
    pub candles: Vec<CandleRecord>,
    pub origin: DataOrigin,
    /// Only set for stale fallbacks
    pub last_fetched_at: Option<i64>,
    /// Message to surface alongside the data, if any
    pub notice: Option<String>,
}

/// Fetch failed and there was nothing cached to fall back on
#[derive(Debug, Error)]
#[error("{message}")]
pub struct LoadFailure {
    /// User-facing message
    pub message: String,
    #[source]
    pub source: anyhow::Error,
}

pub struct ChartDataLoader<'a> {
    cache: &'a CacheManager,
    source: &'a dyn CandleSource,
    policy: RetryPolicy<anyhow::Error>,
}

fn fetch_policy() -> RetryPolicy<anyhow::Error> {
    RetryPolicy::<anyhow::Error>::new()
        .with_should_retry(|error, _attempt| is_retryable(error))
        .with_on_retry(|error, attempt, delay| {
            let classification = classify(error);
            warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                status = ?classification.status_code,
                "{} ({})",
                classification.user_message,
                classification.technical_message
            );
        })
}

impl<'a> ChartDataLoader<'a> {
    pub fn new(cache: &'a CacheManager, source: &'a dyn CandleSource) -> Self {
        Self {
            cache,
            source,
            policy: fetch_policy(),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.policy = self.policy.with_max_attempts(max_attempts);
        self
    }

    pub fn with_backoff(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.policy = self.policy.with_base_delay(base_delay).with_max_delay(max_delay);
        self
    }

    pub async fn load(&self, key: &CacheKey) -> Result<ChartData, LoadFailure> {
        if let Some(candles) = self.cache.get_fresh(key).await {
            debug!(key = %key, "Serving candles from fresh cache");
            return Ok(ChartData {
                candles,
                origin: DataOrigin::Fresh,
                last_fetched_at: None,
                notice: None,
            });
        }

        let error = match with_retry(&self.policy, || self.source.fetch_candles(key)).await {
            Ok(candles) => {
                self.cache.set(key, &candles).await;
                info!(key = %key, candles = candles.len(), "Loaded candles from network");
                return Ok(ChartData {
                    candles,
                    origin: DataOrigin::Network,
                    last_fetched_at: None,
                    notice: None,
                });
            }
            Err(error) => error,
        };

        match self.cache.get_stale(key).await {
            Some(stale) => {
                let notice = final_message(&error, true);
                warn!(key = %key, "Falling back to cached candles: {:#}", error);
                Ok(ChartData {
                    candles: stale.series,
                    origin: DataOrigin::Stale,
                    last_fetched_at: Some(stale.last_fetched_at),
                    notice: Some(notice),
                })
            }
            None => {
                warn!(key = %key, "Candle load failed with no cached fallback: {:#}", error);
                Err(LoadFailure {
                    message: final_message(&error, false),
                    source: error,
                })
            }
        }
    }
}
