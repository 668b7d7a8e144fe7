// =============================================================================
// Moving Average Convergence / Divergence (MACD)
// =============================================================================
//
//   line      = EMA(fast) - EMA(slow)
//   signal    = EMA(signal_period) of the line series
//   histogram = line - signal
//
// Input shorter than `slow + signal_period` closes returns the zero
// sentinel {0, 0, 0} rather than an error, so callers can always read a
// well-defined value.

use crate::indicators::ema::ema_series;

/// Default fast EMA period.
pub const DEFAULT_FAST: usize = 12;
/// Default slow EMA period.
pub const DEFAULT_SLOW: usize = 26;
/// Default signal EMA period.
pub const DEFAULT_SIGNAL: usize = 9;

/// The most recent MACD state of a close series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Macd {
    pub line: f64,
    pub signal: f64,
    pub histogram: f64,
}

impl Macd {
    /// The zero sentinel used for too-short input.
    pub const ZERO: Macd = Macd {
        line: 0.0,
        signal: 0.0,
        histogram: 0.0,
    };

    /// True when the histogram sign agrees with the line/signal ordering
    /// on the bullish side.
    pub fn is_bullish(&self) -> bool {
        self.histogram > 0.0 && self.line > self.signal
    }
}

/// Compute the most recent MACD values for `closes`.
///
/// # Edge cases
/// - `closes.len() < slow + signal_period` => [`Macd::ZERO`]
/// - Degenerate periods (zero, or fast >= slow) => [`Macd::ZERO`]
pub fn macd(closes: &[f64], fast: usize, slow: usize, signal_period: usize) -> Macd {
    if fast == 0 || slow == 0 || signal_period == 0 || fast >= slow {
        return Macd::ZERO;
    }
    if closes.len() < slow + signal_period {
        return Macd::ZERO;
    }

    let fast_series = ema_series(closes, fast);
    let slow_series = ema_series(closes, slow);

    // Both EMA series have the same length as the input.
    let line_series: Vec<f64> = fast_series
        .iter()
        .zip(slow_series.iter())
        .map(|(f, s)| f - s)
        .collect();

    let signal_series = ema_series(&line_series, signal_period);

    let line = line_series.last().copied().unwrap_or(0.0);
    let signal = signal_series.last().copied().unwrap_or(0.0);
    let histogram = line - signal;

    if line.is_finite() && signal.is_finite() && histogram.is_finite() {
        Macd {
            line,
            signal,
            histogram,
        }
    } else {
        Macd::ZERO
    }
}

/// Convenience wrapper with the standard 12/26/9 parameters.
pub fn macd_default(closes: &[f64]) -> Macd {
    macd(closes, DEFAULT_FAST, DEFAULT_SLOW, DEFAULT_SIGNAL)
}
