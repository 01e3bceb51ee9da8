use dotenv::dotenv;

use crate::error::CacheError;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://candle_cache.db?mode=rwc";
pub const DEFAULT_MAX_ENTRIES: u64 = 100;
pub const DEFAULT_MAX_CANDLES: usize = 800;
pub const DEFAULT_API_URL: &str = "https://api.hyperliquid.xyz/info";

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub database_url: String,
    /// Store-wide row cap; eviction trims back to this after every write
    pub max_entries: u64,
    /// Per-entry cap; only the most recent candles of a write are kept
    pub max_candles: usize,
    pub api_url: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_entries: DEFAULT_MAX_ENTRIES,
            max_candles: DEFAULT_MAX_CANDLES,
            api_url: DEFAULT_API_URL.to_string(),
        }
    }
}

impl CacheConfig {
    pub fn from_env() -> Result<Self, CacheError> {
        dotenv().ok();

        let config = CacheConfig {
            database_url: std::env::var("CANDLE_CACHE_DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
            max_entries: std::env::var("CANDLE_CACHE_MAX_ENTRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_ENTRIES),
            max_candles: std::env::var("CANDLE_CACHE_MAX_CANDLES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_CANDLES),
            api_url: std::env::var("CANDLE_CACHE_API_URL")
                .unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
        };
        config.validate()?;
        Ok(config)
    }

    /// Config pointing at a specific database, other settings default
    pub fn with_database_url(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), CacheError> {
        if self.max_entries == 0 {
            return Err(CacheError::Config("max_entries must be greater than zero".to_string()));
        }
        if self.max_candles == 0 {
            return Err(CacheError::Config("max_candles must be greater than zero".to_string()));
        }
        Ok(())
    }
}
