use std::sync::Arc;

use anyhow::Result;
use candle_cache::{
    CacheConfig, CacheKey, CacheManager, CandleStore, ChartDataLoader, HyperliquidSource, Market,
    Timeframe,
};
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "candle-cache", about = "Inspect and maintain the local candle cache")]
struct Cli {
    /// Overrides CANDLE_CACHE_DATABASE_URL
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Entry count, total size and fetch-time range
    Stats,
    /// Every cached key, most recently fetched first
    List,
    /// Cached series for one key, with its freshness
    Show {
        instrument: String,
        market: Market,
        timeframe: Timeframe,
    },
    /// Load one key the way the chart does: fresh cache, retried fetch, stale fallback
    Fetch {
        instrument: String,
        market: Market,
        timeframe: Timeframe,
    },
    /// Trim the cache back to its entry cap
    Evict,
    /// Delete every cached series
    Clear,
    /// Build information
    Version,
}

fn format_ms(ms: i64) -> String {
    Utc.timestamp_millis_opt(ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| ms.to_string())
}

fn print_version() {
    let build_time_raw = option_env!("BUILD_TIME").unwrap_or("unknown");
    let build_time = build_time_raw
        .parse::<i64>()
        .map(|secs| format_ms(secs * 1_000))
        .unwrap_or_else(|_| build_time_raw.to_string());

    println!("candle-cache {}", env!("CARGO_PKG_VERSION"));
    println!("Branch:     {}", option_env!("GIT_BRANCH").unwrap_or("unknown"));
    println!("Commit:     {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!("Build Time: {}", build_time);
    println!("OS:         {}", option_env!("BUILD_TARGET_OS").unwrap_or("unknown"));
}

async fn run(command: Command, cache: &CacheManager, config: &CacheConfig, json: bool) -> Result<()> {
    match command {
        Command::Stats => {
            let stats = cache.stats().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("Entries: {} / {}", stats.total_entries, config.max_entries);
                println!("Size:    {} bytes", stats.total_size_bytes);
                if let (Some(oldest), Some(newest)) = (stats.oldest_entry, stats.newest_entry) {
                    println!("Oldest:  {}", format_ms(oldest));
                    println!("Newest:  {}", format_ms(newest));
                }
            }
        }
        Command::List => {
            let entries = cache.entries().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                for entry in entries {
                    println!(
                        "{:<24} {:>10} bytes  {}",
                        entry.key.to_string(),
                        entry.size_bytes,
                        format_ms(entry.last_fetched_at)
                    );
                }
            }
        }
        Command::Show {
            instrument,
            market,
            timeframe,
        } => {
            let key = CacheKey::new(instrument, market, timeframe);
            match cache.get_stale(&key).await {
                Some(cached) if json => {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&serde_json::json!({
                            "key": key,
                            "last_fetched_at": cached.last_fetched_at,
                            "is_stale": cached.is_stale,
                            "series": cached.series,
                        }))?
                    );
                }
                Some(cached) => {
                    println!(
                        "{}: {} candles fetched {} ({})",
                        key,
                        cached.series.len(),
                        format_ms(cached.last_fetched_at),
                        if cached.is_stale { "stale" } else { "fresh" }
                    );
                    for candle in cached.series.iter().rev().take(10) {
                        println!(
                            "  {}  O {:<12} H {:<12} L {:<12} C {}",
                            format_ms(candle.timestamp),
                            candle.open,
                            candle.high,
                            candle.low,
                            candle.close
                        );
                    }
                }
                None => println!("{}: not cached", key),
            }
        }
        Command::Fetch {
            instrument,
            market,
            timeframe,
        } => {
            let key = CacheKey::new(instrument, market, timeframe);
            let source = HyperliquidSource::new(&config.api_url, config.max_candles);
            let data = ChartDataLoader::new(cache, &source).load(&key).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&data)?);
            } else {
                println!("{}: {} candles ({:?})", key, data.candles.len(), data.origin);
                if let Some(notice) = data.notice {
                    println!("{}", notice);
                }
            }
        }
        Command::Evict => {
            let removed = cache.evict().await;
            println!("Evicted {} entries", removed);
        }
        Command::Clear => {
            let removed = cache.clear().await;
            println!("Cleared {} entries", removed);
        }
        Command::Version => print_version(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Command::Version = cli.command {
        print_version();
        return Ok(());
    }

    let mut config = CacheConfig::from_env()?;
    if let Some(database_url) = cli.database_url {
        config.database_url = database_url;
    }

    let store = Arc::new(CandleStore::new(&config));
    store.init().await;
    if !store.is_ready() {
        anyhow::bail!("Candle cache database could not be opened: {}", config.database_url);
    }

    let cache = CacheManager::new(store, &config);
    run(cli.command, &cache, &config, cli.json).await?;
    cache.flush_evictions().await;

    Ok(())
}
