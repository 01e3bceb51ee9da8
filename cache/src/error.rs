//! Error types for the candle store and cache manager

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("candle series serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid cache key component: {0}")]
    InvalidKey(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}
