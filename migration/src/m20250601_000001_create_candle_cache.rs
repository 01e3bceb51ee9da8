use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CandleCache::Table)
                    .col(ColumnDef::new(CandleCache::Instrument).string().not_null())
                    .col(ColumnDef::new(CandleCache::Market).string().not_null()) // "perp" or "spot"
                    .col(ColumnDef::new(CandleCache::Timeframe).string().not_null()) // "1m" .. "1d"
                    .col(ColumnDef::new(CandleCache::LastFetchedAt).big_integer().not_null())
                    .col(ColumnDef::new(CandleCache::Series).text().not_null()) // JSON array of candles
                    .col(ColumnDef::new(CandleCache::SizeBytes).big_integer().not_null().default(0))
                    .primary_key(
                        Index::create()
                            .col(CandleCache::Instrument)
                            .col(CandleCache::Market)
                            .col(CandleCache::Timeframe),
                    )
                    .to_owned(),
            )
            .await?;

        // Eviction scans oldest-first
        manager
            .create_index(
                Index::create()
                    .name("idx_candle_cache_last_fetched_at")
                    .table(CandleCache::Table)
                    .col(CandleCache::LastFetchedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_candle_cache_last_fetched_at")
                    .table(CandleCache::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(CandleCache::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum CandleCache {
    Table,
    Instrument,
    Market,
    Timeframe,
    LastFetchedAt,
    Series,
    SizeBytes,
}
