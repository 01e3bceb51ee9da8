//! `SeaORM` Entity, @generated manually

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "candle_cache")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub instrument: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub market: String, // "perp" or "spot"
    #[sea_orm(primary_key, auto_increment = false)]
    pub timeframe: String, // "1m", "5m", "15m", "1h", "4h", "1d"
    pub last_fetched_at: i64,
    #[sea_orm(column_type = "Text")]
    pub series: String,
    pub size_bytes: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
