// =============================================================================
// Market Data Module
// =============================================================================
//
// Candle series ingestion: the OHLCV domain type with its parsing and
// series invariants, plus the HTTP source adapter for the authoritative
// klines endpoint and the coarse markets-listing fallback.

pub mod candle;
pub mod source;

pub use candle::{
    candles_from_hourly_closes, closes, intraday_count, sanitize_series, Candle,
};
pub use source::{MarketDataSource, MarketEntry};
