//! Cache data model: candle records, cache keys and diagnostic snapshots

use std::fmt;
use std::str::FromStr;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// One OHLC bar. Series are assumed ascending by `timestamp`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandleRecord {
    /// Bar open time (ms since epoch)
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl CandleRecord {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
        }
    }
}

/// Market an instrument trades on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Market {
    Perp,
    Spot,
}

impl Market {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Perp => "perp",
            Self::Spot => "spot",
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Market {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "perp" => Ok(Self::Perp),
            "spot" => Ok(Self::Spot),
            _ => Err(CacheError::InvalidKey(format!("unknown market: {}", s))),
        }
    }
}

/// Chart timeframe (bar interval)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 6] = [
        Self::M1,
        Self::M5,
        Self::M15,
        Self::H1,
        Self::H4,
        Self::D1,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::M1 => "1m",
            Self::M5 => "5m",
            Self::M15 => "15m",
            Self::H1 => "1h",
            Self::H4 => "4h",
            Self::D1 => "1d",
        }
    }

    /// Cached data stays current for exactly one bar interval.
    pub fn freshness_window(&self) -> Duration {
        match self {
            Self::M1 => Duration::minutes(1),
            Self::M5 => Duration::minutes(5),
            Self::M15 => Duration::minutes(15),
            Self::H1 => Duration::hours(1),
            Self::H4 => Duration::hours(4),
            Self::D1 => Duration::days(1),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tf| tf.as_str() == s)
            .ok_or_else(|| CacheError::InvalidKey(format!("unknown timeframe: {}", s)))
    }
}

/// Unique key of a cache row
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub instrument: String,
    pub market: Market,
    pub timeframe: Timeframe,
}

impl CacheKey {
    pub fn new(instrument: impl Into<String>, market: Market, timeframe: Timeframe) -> Self {
        Self {
            instrument: instrument.into(),
            market,
            timeframe,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.instrument, self.market, self.timeframe)
    }
}

/// A row as read back from the store, before any freshness policy
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSeries {
    pub series: Vec<CandleRecord>,
    pub last_fetched_at: i64,
}

/// Stale-fallback read result
#[derive(Debug, Clone, PartialEq)]
pub struct StaleCandles {
    pub series: Vec<CandleRecord>,
    pub last_fetched_at: i64,
    /// True when the row would fail the freshness check
    pub is_stale: bool,
}

/// Diagnostic snapshot of the whole store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total_entries: u64,
    pub total_size_bytes: u64,
    pub oldest_entry: Option<i64>,
    pub newest_entry: Option<i64>,
}

/// Key listing entry for diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntrySummary {
    pub key: CacheKey,
    pub last_fetched_at: i64,
    pub size_bytes: u64,
}
