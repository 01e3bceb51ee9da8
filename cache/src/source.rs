//! Candle sources: the network side that supplies raw candle arrays

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::models::{CacheKey, CandleRecord};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request aborted after {0}ms")]
    Aborted(u64),

    #[error("malformed candle payload: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait CandleSource: Send + Sync {
    /// Most recent candles for `key`, ascending by timestamp
    async fn fetch_candles(&self, key: &CacheKey) -> Result<Vec<CandleRecord>>;
}

/// Hyperliquid `candleSnapshot` client.
///
/// The instrument is sent verbatim as the coin, so spot pairs use the exchange's
/// own spot naming (e.g. `@107` or `PURR/USDC`).
#[derive(Debug, Clone)]
pub struct HyperliquidSource {
    client: reqwest::Client,
    api_url: String,
    max_candles: usize,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct HyperliquidCandle {
    #[serde(rename = "t")]
    open_time: i64,
    #[serde(rename = "o")]
    open: String,
    #[serde(rename = "h")]
    high: String,
    #[serde(rename = "l")]
    low: String,
    #[serde(rename = "c")]
    close: String,
}

impl HyperliquidSource {
    pub fn new(api_url: &str, max_candles: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.to_string(),
            max_candles,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn request(&self, key: &CacheKey) -> Result<Vec<HyperliquidCandle>> {
        let end_time = chrono::Utc::now().timestamp_millis();
        let span = key.timeframe.freshness_window().num_milliseconds() * self.max_candles as i64;
        let start_time = end_time - span;

        let response = self
            .client
            .post(&self.api_url)
            .json(&serde_json::json!({
                "type": "candleSnapshot",
                "req": {
                    "coin": key.instrument,
                    "interval": key.timeframe.as_str(),
                    "startTime": start_time,
                    "endTime": end_time,
                }
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow::anyhow!(
                "Hyperliquid API error ({}): {}",
                status,
                error_text
            ));
        }

        let candles: Vec<HyperliquidCandle> = response.json().await?;
        Ok(candles)
    }
}

#[async_trait]
impl CandleSource for HyperliquidSource {
    async fn fetch_candles(&self, key: &CacheKey) -> Result<Vec<CandleRecord>> {
        let raw = match tokio::time::timeout(self.timeout, self.request(key)).await {
            Ok(result) => result?,
            Err(_) => return Err(SourceError::Aborted(self.timeout.as_millis() as u64).into()),
        };
        debug!(key = %key, candles = raw.len(), "Fetched candles from Hyperliquid");
        Ok(convert_candles(raw)?)
    }
}

fn parse_price(field: &str, value: &str, open_time: i64) -> Result<f64, SourceError> {
    value
        .parse::<f64>()
        .map_err(|_| SourceError::Malformed(format!("{} '{}' at {}", field, value, open_time)))
}

fn convert_candles(raw: Vec<HyperliquidCandle>) -> Result<Vec<CandleRecord>, SourceError> {
    let mut candles = raw
        .into_iter()
        .map(|c| -> Result<CandleRecord, SourceError> {
            Ok(CandleRecord::new(
                c.open_time,
                parse_price("open", &c.open, c.open_time)?,
                parse_price("high", &c.high, c.open_time)?,
                parse_price("low", &c.low, c.open_time)?,
                parse_price("close", &c.close, c.open_time)?,
            ))
        })
        .collect::<Result<Vec<_>, _>>()?;
    candles.sort_by_key(|c| c.timestamp);
    Ok(candles)
}
