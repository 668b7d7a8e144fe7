// =============================================================================
// Stochastic RSI
// =============================================================================
//
// A stochastic oscillator applied to the RSI series instead of price:
//
//   raw %K_t = (RSI_t - min(RSI window)) / (max - min) * 100   (50 if flat)
//   %K       = SMA(raw %K, k_smooth)
//   %D       = SMA(%K, d_smooth)
//
// Needs `rsi_period + stoch_period + k_smooth + d_smooth` closes; shorter
// input yields `{k: None, d: None}` — the one indicator whose outputs are
// optional, surfaced only in the per-entity detail panel.

use crate::indicators::rsi::rsi_series;

/// The most recent %K / %D pair, when computable.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StochRsi {
    pub k: Option<f64>,
    pub d: Option<f64>,
}

/// Compute the Stochastic RSI for `closes`.
pub fn stoch_rsi(
    closes: &[f64],
    rsi_period: usize,
    stoch_period: usize,
    k_smooth: usize,
    d_smooth: usize,
) -> StochRsi {
    if rsi_period == 0 || stoch_period == 0 || k_smooth == 0 || d_smooth == 0 {
        return StochRsi::default();
    }
    if closes.len() < rsi_period + stoch_period + k_smooth + d_smooth {
        return StochRsi::default();
    }

    let rsi_values = rsi_series(closes, rsi_period);
    if rsi_values.len() < stoch_period {
        return StochRsi::default();
    }

    // --- Min-max normalise each RSI value over its trailing window -----------
    let mut raw_k: Vec<f64> = Vec::with_capacity(rsi_values.len() - stoch_period + 1);
    for i in (stoch_period - 1)..rsi_values.len() {
        let window = &rsi_values[i + 1 - stoch_period..=i];
        let min = window.iter().copied().fold(f64::INFINITY, f64::min);
        let max = window.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let value = if (max - min).abs() < f64::EPSILON {
            50.0
        } else {
            (rsi_values[i] - min) / (max - min) * 100.0
        };
        raw_k.push(value.clamp(0.0, 100.0));
    }

    // --- Smooth raw %K into %K, then %K into %D ------------------------------
    let k_values = sma_series(&raw_k, k_smooth);
    let d_values = sma_series(&k_values, d_smooth);

    StochRsi {
        k: k_values.last().copied(),
        d: d_values.last().copied(),
    }
}

/// Convenience wrapper with the standard 14/14/3/3 parameters.
pub fn stoch_rsi_default(closes: &[f64]) -> StochRsi {
    stoch_rsi(closes, 14, 14, 3, 3)
}

/// Simple-average smoothing: one output per full `period` window.
fn sma_series(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }
    values
        .windows(period)
        .map(|w| w.iter().sum::<f64>() / period as f64)
        .collect()
}
