use std::time::Duration;

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use tracing::info;

pub async fn get_db_connection(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    info!("Connecting to candle cache database at: {}", database_url);
    let mut options = ConnectOptions::new(database_url.to_owned());
    // SQLite has a single writer; one pooled connection queues writers in the pool
    // instead of failing lock upgrades with SQLITE_BUSY.
    options
        .max_connections(1)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(5))
        .acquire_timeout(Duration::from_secs(30))
        .sqlx_logging(false);
    Database::connect(options).await
}
