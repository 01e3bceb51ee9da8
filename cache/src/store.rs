//! Candle Store: durable key-value persistence of candle series.
//!
//! One row per (instrument, market, timeframe) holding the whole series as a JSON
//! blob plus the time it was fetched. The store owns its connection and readiness
//! state; it is created once and shared by reference with the cache manager.
//!
//! Initialization is lazy and idempotent. Concurrent first callers share a single
//! in-flight initialization. If initialization fails the store stays not-ready and
//! every operation degrades to a neutral result instead of erroring.

use std::sync::atomic::{AtomicUsize, Ordering};

use migration::{Migrator, MigratorTrait};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveValue, DatabaseConnection, DatabaseTransaction, EntityTrait, FromQueryResult,
    PaginatorTrait, QueryOrder, QuerySelect, TransactionTrait,
};
use tokio::sync::OnceCell;
use tracing::{debug, error, info};

use crate::config::CacheConfig;
use crate::database::get_db_connection;
use crate::entity::candle_cache;
use crate::models::{CacheKey, CandleRecord, EntrySummary, StoreStats, StoredSeries};
use crate::Result;

pub struct CandleStore {
    database_url: String,
    max_candles: usize,
    conn: OnceCell<Option<DatabaseConnection>>,
    init_attempts: AtomicUsize,
}

#[derive(Debug, FromQueryResult)]
struct StatsRow {
    total_entries: i64,
    total_size_bytes: Option<i64>,
    oldest_entry: Option<i64>,
    newest_entry: Option<i64>,
}

impl CandleStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            database_url: config.database_url.clone(),
            max_candles: config.max_candles,
            conn: OnceCell::new(),
            init_attempts: AtomicUsize::new(0),
        }
    }

    /// Connect and create the schema, once. Never fails: on error the store is
    /// left not-ready and the failure is logged.
    pub async fn init(&self) {
        self.conn.get_or_init(|| self.initialize()).await;
    }

    async fn initialize(&self) -> Option<DatabaseConnection> {
        self.init_attempts.fetch_add(1, Ordering::SeqCst);

        let db = match get_db_connection(&self.database_url).await {
            Ok(db) => db,
            Err(e) => {
                error!("Failed to open candle cache database: {}", e);
                return None;
            }
        };

        if let Err(e) = Migrator::up(&db, None).await {
            error!("Failed to create candle cache schema: {}", e);
            return None;
        }

        info!("Candle cache store ready");
        Some(db)
    }

    pub fn is_ready(&self) -> bool {
        self.connection().is_some()
    }

    /// How many times schema initialization has actually run (at most once)
    pub fn init_attempts(&self) -> usize {
        self.init_attempts.load(Ordering::SeqCst)
    }

    fn connection(&self) -> Option<&DatabaseConnection> {
        self.conn.get().and_then(Option::as_ref)
    }

    fn primary_key(key: &CacheKey) -> (String, String, String) {
        (
            key.instrument.clone(),
            key.market.as_str().to_owned(),
            key.timeframe.as_str().to_owned(),
        )
    }

    /// Raw read, no freshness policy. `None` when absent or not ready.
    pub async fn get(&self, key: &CacheKey) -> Result<Option<StoredSeries>> {
        let Some(db) = self.connection() else {
            return Ok(None);
        };

        let row = candle_cache::Entity::find_by_id(Self::primary_key(key))
            .one(db)
            .await?;

        match row {
            Some(row) => {
                let series: Vec<CandleRecord> = serde_json::from_str(&row.series)?;
                Ok(Some(StoredSeries {
                    series,
                    last_fetched_at: row.last_fetched_at,
                }))
            }
            None => Ok(None),
        }
    }

    /// Whole-row replace of `key`, keeping only the last `max_candles` of `series`.
    pub async fn put(&self, key: &CacheKey, series: &[CandleRecord], fetched_at: i64) -> Result<()> {
        let Some(db) = self.connection() else {
            return Ok(());
        };

        let start = series.len().saturating_sub(self.max_candles);
        let blob = serde_json::to_string(&series[start..])?;
        let (instrument, market, timeframe) = Self::primary_key(key);

        let row = candle_cache::ActiveModel {
            instrument: ActiveValue::Set(instrument),
            market: ActiveValue::Set(market),
            timeframe: ActiveValue::Set(timeframe),
            last_fetched_at: ActiveValue::Set(fetched_at),
            size_bytes: ActiveValue::Set(blob.len() as i64),
            series: ActiveValue::Set(blob),
        };

        candle_cache::Entity::insert(row)
            .on_conflict(
                OnConflict::columns([
                    candle_cache::Column::Instrument,
                    candle_cache::Column::Market,
                    candle_cache::Column::Timeframe,
                ])
                .update_columns([
                    candle_cache::Column::LastFetchedAt,
                    candle_cache::Column::Series,
                    candle_cache::Column::SizeBytes,
                ])
                .to_owned(),
            )
            .exec_without_returning(db)
            .await?;

        debug!(key = %key, candles = series.len() - start, "Stored candle series");
        Ok(())
    }

    /// Remove the `n` least recently fetched rows. Returns rows removed.
    pub async fn delete_oldest(&self, n: u64) -> Result<u64> {
        let Some(db) = self.connection() else {
            return Ok(0);
        };
        if n == 0 {
            return Ok(0);
        }

        let txn = db.begin().await?;
        let removed = Self::delete_oldest_in(&txn, n).await?;
        txn.commit().await?;
        Ok(removed)
    }

    /// Trim down to `max_entries` rows, oldest first. The count and the deletes
    /// share one transaction, so overlapping callers never remove the same excess
    /// twice. Returns rows removed.
    pub async fn delete_excess(&self, max_entries: u64) -> Result<u64> {
        let Some(db) = self.connection() else {
            return Ok(0);
        };

        let txn = db.begin().await?;
        let count = candle_cache::Entity::find().count(&txn).await?;
        if count <= max_entries {
            txn.commit().await?;
            return Ok(0);
        }

        let removed = Self::delete_oldest_in(&txn, count - max_entries).await?;
        txn.commit().await?;
        debug!(removed, count, max_entries, "Evicted oldest candle cache entries");
        Ok(removed)
    }

    async fn delete_oldest_in(txn: &DatabaseTransaction, n: u64) -> Result<u64> {
        // Ties on last_fetched_at are broken by key so eviction is deterministic
        let victims: Vec<(String, String, String)> = candle_cache::Entity::find()
            .select_only()
            .column(candle_cache::Column::Instrument)
            .column(candle_cache::Column::Market)
            .column(candle_cache::Column::Timeframe)
            .order_by_asc(candle_cache::Column::LastFetchedAt)
            .order_by_asc(candle_cache::Column::Instrument)
            .order_by_asc(candle_cache::Column::Market)
            .order_by_asc(candle_cache::Column::Timeframe)
            .limit(n)
            .into_tuple()
            .all(txn)
            .await?;

        let mut removed = 0;
        for victim in victims {
            let result = candle_cache::Entity::delete_by_id(victim).exec(txn).await?;
            removed += result.rows_affected;
        }
        Ok(removed)
    }

    pub async fn count(&self) -> Result<u64> {
        let Some(db) = self.connection() else {
            return Ok(0);
        };
        let count = candle_cache::Entity::find().count(db).await?;
        Ok(count)
    }

    /// Delete every row. Returns rows removed.
    pub async fn clear_all(&self) -> Result<u64> {
        let Some(db) = self.connection() else {
            return Ok(0);
        };
        let result = candle_cache::Entity::delete_many().exec(db).await?;
        info!("Cleared {} candle cache entries", result.rows_affected);
        Ok(result.rows_affected)
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        let Some(db) = self.connection() else {
            return Ok(StoreStats::default());
        };

        let row = candle_cache::Entity::find()
            .select_only()
            .column_as(Expr::col(candle_cache::Column::Instrument).count(), "total_entries")
            .column_as(Expr::col(candle_cache::Column::SizeBytes).sum(), "total_size_bytes")
            .column_as(Expr::col(candle_cache::Column::LastFetchedAt).min(), "oldest_entry")
            .column_as(Expr::col(candle_cache::Column::LastFetchedAt).max(), "newest_entry")
            .into_model::<StatsRow>()
            .one(db)
            .await?;

        Ok(match row {
            Some(row) => StoreStats {
                total_entries: row.total_entries.max(0) as u64,
                total_size_bytes: row.total_size_bytes.unwrap_or(0).max(0) as u64,
                oldest_entry: row.oldest_entry,
                newest_entry: row.newest_entry,
            },
            None => StoreStats::default(),
        })
    }

    /// All keys, most recently fetched first
    pub async fn keys(&self) -> Result<Vec<EntrySummary>> {
        let Some(db) = self.connection() else {
            return Ok(Vec::new());
        };

        let rows: Vec<(String, String, String, i64, i64)> = candle_cache::Entity::find()
            .select_only()
            .column(candle_cache::Column::Instrument)
            .column(candle_cache::Column::Market)
            .column(candle_cache::Column::Timeframe)
            .column(candle_cache::Column::LastFetchedAt)
            .column(candle_cache::Column::SizeBytes)
            .order_by_desc(candle_cache::Column::LastFetchedAt)
            .into_tuple()
            .all(db)
            .await?;

        rows.into_iter()
            .map(|(instrument, market, timeframe, last_fetched_at, size_bytes)| -> Result<EntrySummary> {
                Ok(EntrySummary {
                    key: CacheKey::new(instrument, market.parse()?, timeframe.parse()?),
                    last_fetched_at,
                    size_bytes: size_bytes.max(0) as u64,
                })
            })
            .collect()
    }
}
