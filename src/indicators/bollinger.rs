// =============================================================================
// Bollinger Bands
// =============================================================================
//
// Middle band = SMA of the last `period` closes, upper/lower = middle
// +/- `mult` standard deviations.  The normalised bandwidth is
// 2 * mult * sigma / mean; a bandwidth below 0.04 flags a volatility
// squeeze.
//
// Too-short input pins all three bands to the last close (sigma = 0), so
// the result is always well-defined.

/// Bandwidth below this value counts as a squeeze.
pub const SQUEEZE_THRESHOLD: f64 = 0.04;

/// Result of a Bollinger Band calculation.
#[derive(Debug, Clone, Copy)]
pub struct Bollinger {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
    /// Normalised band width: 2 * mult * sigma / mean.
    pub bandwidth: f64,
    pub squeeze: bool,
}

/// Calculate Bollinger Bands over the last `period` closes.
///
/// # Edge cases
/// - Empty input => all fields zero, `squeeze` true.
/// - `closes.len() < period` => bands pinned to the last close.
/// - Zero mean => bandwidth 0 (degenerate input, still total).
pub fn bollinger(closes: &[f64], period: usize, mult: f64) -> Bollinger {
    let last = closes.last().copied().unwrap_or(0.0);

    if period == 0 || closes.len() < period {
        return Bollinger {
            upper: last,
            middle: last,
            lower: last,
            bandwidth: 0.0,
            squeeze: true,
        };
    }

    let window = &closes[closes.len() - period..];
    let mean = window.iter().sum::<f64>() / period as f64;
    let variance = window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / period as f64;
    let std_dev = variance.sqrt();

    let upper = mean + mult * std_dev;
    let lower = mean - mult * std_dev;
    let bandwidth = if mean != 0.0 && std_dev.is_finite() {
        (2.0 * mult * std_dev / mean).abs()
    } else {
        0.0
    };

    if upper.is_finite() && lower.is_finite() {
        Bollinger {
            upper,
            middle: mean,
            lower,
            bandwidth,
            squeeze: bandwidth < SQUEEZE_THRESHOLD,
        }
    } else {
        Bollinger {
            upper: last,
            middle: last,
            lower: last,
            bandwidth: 0.0,
            squeeze: true,
        }
    }
}

/// Convenience wrapper with the standard 20-period / 2-sigma parameters.
pub fn bollinger_default(closes: &[f64]) -> Bollinger {
    bollinger(closes, 20, 2.0)
}
