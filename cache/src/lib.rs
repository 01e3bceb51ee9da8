//! Candle cache: the local market-data cache and resilient-fetch layer behind the chart.
//!
//! - **Candle Store**: SQLite-backed persistence of OHLC series keyed by
//!   instrument / market / timeframe, with lazy one-time initialization
//! - **Cache Manager**: freshness windows, stale fallback, bounded writes and
//!   background eviction
//! - **Retry Executor**: async retry with capped exponential backoff
//! - **Error Classifier**: retry eligibility and user-facing messages
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use candle_cache::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = CacheConfig::from_env()?;
//!     let store = Arc::new(CandleStore::new(&config));
//!     store.init().await;
//!
//!     let cache = CacheManager::new(store, &config);
//!     let key = CacheKey::new("BTC", Market::Perp, Timeframe::H1);
//!     let source = HyperliquidSource::new(&config.api_url, config.max_candles);
//!     let data = ChartDataLoader::new(&cache, &source).load(&key).await?;
//!     println!("{} candles ({:?})", data.candles.len(), data.origin);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod classify;
pub mod clock;
pub mod config;
pub mod database;
pub mod entity;
pub mod error;
pub mod loader;
pub mod models;
pub mod retry;
pub mod source;
pub mod store;

pub use cache::CacheManager;
pub use classify::{classify, final_message, is_retryable, ErrorClassification, ErrorKind};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CacheConfig;
pub use error::CacheError;
pub use loader::{ChartData, ChartDataLoader, DataOrigin, LoadFailure};
pub use models::*;
pub use retry::{with_retry, RetryPolicy};
pub use source::{CandleSource, HyperliquidSource, SourceError};
pub use store::CandleStore;

pub mod prelude {
    pub use crate::cache::*;
    pub use crate::classify::*;
    pub use crate::clock::*;
    pub use crate::config::*;
    pub use crate::error::*;
    pub use crate::loader::*;
    pub use crate::models::*;
    pub use crate::retry::*;
    pub use crate::source::*;
    pub use crate::store::*;
}

/// Result alias for store and cache operations
pub type Result<T> = std::result::Result<T, CacheError>;
