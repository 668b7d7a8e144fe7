// =============================================================================
// Relative Strength Index (RSI) — Wilder's Smoothing
// =============================================================================
//
// Step 1 — Price deltas from consecutive closes.
// Step 2 — Seed average gain / average loss with the SMA of the first
//          `period` deltas.
// Step 3 — Wilder's smoothing:
//            avg_gain = (prev_avg_gain * (period - 1) + gain) / period
//            avg_loss = (prev_avg_loss * (period - 1) + loss) / period
// Step 4 — RS  = avg_gain / avg_loss
//          RSI = 100 - 100 / (1 + RS)
//
// Conventions: avg_loss == 0 with gains => 100.  A perfectly flat series
// (avg_gain == avg_loss == 0) => 50.  Input shorter than `period + 1`
// closes => the neutral sentinel 50.

/// Neutral sentinel returned when the series is too short for an RSI.
pub const RSI_SENTINEL: f64 = 50.0;

/// Compute the full RSI series for `closes` and `period`.
///
/// The returned vector carries one value per close starting at index
/// `period` (the first `period` closes seed the averages).  Too-short
/// input yields an empty vec; [`rsi`] maps that onto the sentinel.
pub fn rsi_series(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() < period + 1 {
        return Vec::new();
    }

    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();

    // --- Seed averages with SMA of first `period` deltas ---------------------
    let (sum_gain, sum_loss) = deltas[..period].iter().fold((0.0_f64, 0.0_f64), |(g, l), &d| {
        if d > 0.0 {
            (g + d, l)
        } else {
            (g, l + d.abs())
        }
    });

    let period_f = period as f64;
    let mut avg_gain = sum_gain / period_f;
    let mut avg_loss = sum_loss / period_f;

    let mut result = Vec::with_capacity(deltas.len() - period + 1);
    result.push(rsi_from_averages(avg_gain, avg_loss));

    // --- Wilder's smoothing for subsequent values ----------------------------
    for &delta in &deltas[period..] {
        let gain = if delta > 0.0 { delta } else { 0.0 };
        let loss = if delta < 0.0 { delta.abs() } else { 0.0 };

        avg_gain = (avg_gain * (period_f - 1.0) + gain) / period_f;
        avg_loss = (avg_loss * (period_f - 1.0) + loss) / period_f;

        result.push(rsi_from_averages(avg_gain, avg_loss));
    }

    result
}

/// The most recent RSI value, or [`RSI_SENTINEL`] when the series is too
/// short.  Always finite, always in [0, 100].
pub fn rsi(closes: &[f64], period: usize) -> f64 {
    rsi_series(closes, period)
        .last()
        .copied()
        .unwrap_or(RSI_SENTINEL)
}

/// Convert average gain / average loss into an RSI value in [0, 100].
fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    let value = if avg_loss == 0.0 && avg_gain == 0.0 {
        RSI_SENTINEL // flat series
    } else if avg_loss == 0.0 {
        100.0 // only gains
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    };

    if value.is_finite() {
        value.clamp(0.0, 100.0)
    } else {
        RSI_SENTINEL
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsi_empty_input_returns_sentinel() {
        assert_eq!(rsi(&[], 14), RSI_SENTINEL);
    }

    #[test]
    fn rsi_period_zero_returns_sentinel() {
        assert_eq!(rsi(&[1.0, 2.0, 3.0], 0), RSI_SENTINEL);
    }

    #[test]
    fn rsi_insufficient_data_returns_sentinel() {
        // 14 closes => 13 deltas < period, one short of the minimum.
        let closes: Vec<f64> = (1..=14).map(|x| x as f64).collect();
        assert!(rsi_series(&closes, 14).is_empty());
        assert_eq!(rsi(&closes, 14), RSI_SENTINEL);
    }

    #[test]
    fn rsi_all_gains_is_100() {
        let closes: Vec<f64> = (1..=30).map(|x| x as f64).collect();
        let series = rsi_series(&closes, 14);
        assert!(!series.is_empty());
        for &v in &series {
            assert!((v - 100.0).abs() < 1e-10, "expected 100.0, got {v}");
        }
    }

    #[test]
    fn rsi_all_losses_is_0() {
        let closes: Vec<f64> = (1..=30).rev().map(|x| x as f64).collect();
        let series = rsi_series(&closes, 14);
        assert!(!series.is_empty());
        for &v in &series {
            assert!(v.abs() < 1e-10, "expected 0.0, got {v}");
        }
    }

    #[test]
    fn rsi_flat_series_is_50() {
        // 300 identical closes: avg_gain == avg_loss == 0 on every step,
        // which resolves to the documented 50.0 convention.
        let closes = vec![100.0; 300];
        let series = rsi_series(&closes, 14);
        assert!(!series.is_empty());
        for &v in &series {
            assert!((v - RSI_SENTINEL).abs() < 1e-10, "expected 50.0, got {v}");
        }
    }

    #[test]
    fn rsi_range_check() {
        let closes = vec![
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.42, 45.84, 46.08,
            45.89, 46.03, 44.18, 44.22, 44.57, 43.42, 42.66, 43.13,
        ];
        for &v in &rsi_series(&closes, 14) {
            assert!((0.0..=100.0).contains(&v), "RSI {v} out of range");
        }
    }

    #[test]
    fn rsi_is_total_over_hostile_input() {
        let closes = vec![1.0, f64::NAN, 3.0, f64::INFINITY, 5.0, 4.0, 6.0, 2.0,
                          3.0, 7.0, 1.0, 8.0, 2.0, 9.0, 3.0, 10.0];
        let value = rsi(&closes, 14);
        assert!(value.is_finite());
        assert!((0.0..=100.0).contains(&value));
    }
}
