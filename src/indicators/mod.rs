// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free implementations of the indicators the scanner
// derives from candle series.  Every function here is total: for any
// well-typed input it returns a value, never panics and never produces
// NaN — inputs too short for a window fall back to a defined neutral
// sentinel so that one bad series cannot halt a load batch.

pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod rsi;
pub mod stoch_rsi;
pub mod vwap;
