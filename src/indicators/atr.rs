// =============================================================================
// Average True Range (ATR) — Wilder's Smoothing Method
// =============================================================================
//
// True Range for each bar:
//   TR = max(H - L, |H - prevClose|, |L - prevClose|)
//
// ATR is the Wilder-smoothed average of TR:
//   ATR_0 = SMA of first `period` TR values
//   ATR_t = (ATR_{t-1} * (period - 1) + TR_t) / period
//
// Too-short input returns the 0.0 sentinel — callers treat a zero ATR as
// "no volatility estimate" and the trade-level calculator degrades
// accordingly.

use crate::market_data::Candle;

/// Sentinel returned when the series is too short for an ATR.
pub const ATR_SENTINEL: f64 = 0.0;

/// Compute the most recent ATR value over `candles` (oldest first).
///
/// # Edge cases
/// - `period == 0` or fewer than `period + 1` candles => [`ATR_SENTINEL`]
/// - Non-finite intermediates collapse to the sentinel rather than
///   propagating NaN.
pub fn atr(candles: &[Candle], period: usize) -> f64 {
    if period == 0 || candles.len() < period + 1 {
        return ATR_SENTINEL;
    }

    // --- Step 1: True Range for each consecutive pair ------------------------
    let mut tr_values: Vec<f64> = Vec::with_capacity(candles.len() - 1);
    for i in 1..candles.len() {
        let high = candles[i].high;
        let low = candles[i].low;
        let prev_close = candles[i - 1].close;

        let hl = high - low;
        let hc = (high - prev_close).abs();
        let lc = (low - prev_close).abs();

        tr_values.push(hl.max(hc).max(lc));
    }

    // --- Step 2: Seed with SMA of the first `period` TR values ---------------
    let seed = tr_values[..period].iter().sum::<f64>() / period as f64;
    if !seed.is_finite() {
        return ATR_SENTINEL;
    }

    // --- Step 3: Wilder's smoothing over the remainder -----------------------
    let period_f = period as f64;
    let mut value = seed;
    for &tr in &tr_values[period..] {
        value = (value * (period_f - 1.0) + tr) / period_f;
        if !value.is_finite() {
            return ATR_SENTINEL;
        }
    }

    value
}

/// ATR as a percentage of the last close.  Zero when the close is zero.
pub fn atr_pct(candles: &[Candle], period: usize) -> f64 {
    let value = atr(candles, period);
    let last_close = candles.last().map(|c| c.close).unwrap_or(0.0);
    if last_close == 0.0 {
        return 0.0;
    }
    (value / last_close) * 100.0
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::Candle;

    fn candle(open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            open_time: 0,
            open,
            high,
            low,
            close,
            volume: 100.0,
        }
    }

    #[test]
    fn atr_period_zero_is_sentinel() {
        let candles = vec![candle(100.0, 105.0, 95.0, 102.0); 20];
        assert_eq!(atr(&candles, 0), ATR_SENTINEL);
    }

    #[test]
    fn atr_insufficient_data_is_sentinel() {
        let candles = vec![candle(100.0, 105.0, 95.0, 102.0); 10];
        assert_eq!(atr(&candles, 14), ATR_SENTINEL);
    }

    #[test]
    fn atr_constant_range_converges() {
        // Every candle spans 10 with close at the midpoint; ATR ~= 10.
        let mut candles = Vec::new();
        for i in 0..30 {
            let base = 100.0 + i as f64 * 0.1;
            candles.push(candle(base, base + 5.0, base - 5.0, base));
        }
        let value = atr(&candles, 14);
        assert!((value - 10.0).abs() < 1.0, "expected ATR near 10.0, got {value}");
    }

    #[test]
    fn atr_true_range_uses_prev_close() {
        // Gap up: |H - prevClose| dominates H - L.
        let candles = vec![
            candle(100.0, 105.0, 95.0, 95.0),
            candle(110.0, 115.0, 108.0, 112.0),
            candle(112.0, 118.0, 110.0, 115.0),
            candle(115.0, 120.0, 113.0, 118.0),
        ];
        let value = atr(&candles, 3);
        assert!(value > 7.0, "ATR should reflect the gap, got {value}");
    }

    #[test]
    fn atr_is_positive_for_real_series() {
        let candles: Vec<Candle> = (0..50)
            .map(|i| {
                let base = 100.0 + (i as f64 * 0.5).sin() * 10.0;
                candle(base - 0.5, base + 2.0, base - 2.0, base + 0.5)
            })
            .collect();
        let value = atr(&candles, 14);
        assert!(value > 0.0);
        assert!(value.is_finite());
    }

    #[test]
    fn atr_nan_input_is_sentinel() {
        let candles = vec![
            candle(100.0, 105.0, 95.0, 100.0),
            candle(100.0, f64::NAN, 95.0, 100.0),
            candle(100.0, 105.0, 95.0, 100.0),
            candle(100.0, 105.0, 95.0, 100.0),
        ];
        assert_eq!(atr(&candles, 3), ATR_SENTINEL);
    }

    #[test]
    fn atr_pct_scales_by_close() {
        let candles: Vec<Candle> = (0..30)
            .map(|i| {
                let base = 100.0 + i as f64;
                candle(base, base + 3.0, base - 3.0, base + 1.0)
            })
            .collect();
        let pct = atr_pct(&candles, 14);
        assert!(pct > 0.0);
        assert!(pct.is_finite());
    }
}
