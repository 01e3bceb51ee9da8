pub mod candle_cache;
