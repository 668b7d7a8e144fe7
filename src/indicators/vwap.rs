// =============================================================================
// Session VWAP — Volume-Weighted Average Price
// =============================================================================
//
//   typical = (high + low + close) / 3
//   VWAP    = sum(typical * volume) / sum(volume)
//
// The window is session-relative: the caller passes `intraday_count`, the
// number of candles since the UTC session open, and only those trailing
// candles contribute.  Zero traded volume falls back to the last close so
// the value stays total.

use crate::market_data::Candle;

/// Compute the session VWAP over the last `intraday_count` candles.
///
/// # Edge cases
/// - Empty input => 0.0
/// - `intraday_count == 0` or zero total volume => last close
/// - Non-finite sums => last close
pub fn vwap(candles: &[Candle], intraday_count: usize) -> f64 {
    let last_close = match candles.last() {
        Some(c) => c.close,
        None => return 0.0,
    };

    if intraday_count == 0 {
        return last_close;
    }

    let start = candles.len().saturating_sub(intraday_count);
    let session = &candles[start..];

    let mut weighted_sum = 0.0;
    let mut volume_sum = 0.0;
    for c in session {
        let typical = (c.high + c.low + c.close) / 3.0;
        weighted_sum += typical * c.volume;
        volume_sum += c.volume;
    }

    if volume_sum <= 0.0 || !weighted_sum.is_finite() || !volume_sum.is_finite() {
        return last_close;
    }

    let value = weighted_sum / volume_sum;
    if value.is_finite() {
        value
    } else {
        last_close
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::Candle;

    fn candle(high: f64, low: f64, close: f64, volume: f64) -> Candle {
        Candle {
            open_time: 0,
            open: close,
            high,
            low,
            close,
            volume,
        }
    }

    #[test]
    fn vwap_empty_input_is_zero() {
        assert_eq!(vwap(&[], 10), 0.0);
    }

    #[test]
    fn vwap_zero_session_falls_back_to_last_close() {
        let candles = vec![candle(105.0, 95.0, 100.0, 10.0)];
        assert_eq!(vwap(&candles, 0), 100.0);
    }

    #[test]
    fn vwap_single_candle_is_typical_price() {
        let candles = vec![candle(105.0, 95.0, 100.0, 10.0)];
        // typical = (105 + 95 + 100) / 3 = 100
        assert!((vwap(&candles, 1) - 100.0).abs() < 1e-12);
    }

    #[test]
    fn vwap_weights_by_volume() {
        // Heavy volume at typical 100, light volume at typical 200:
        // VWAP must sit far closer to 100.
        let candles = vec![
            candle(100.0, 100.0, 100.0, 90.0),
            candle(200.0, 200.0, 200.0, 10.0),
        ];
        let value = vwap(&candles, 2);
        assert!((value - 110.0).abs() < 1e-9, "expected 110.0, got {value}");
    }

    #[test]
    fn vwap_window_excludes_older_candles() {
        // First candle priced wildly differently but outside the session.
        let candles = vec![
            candle(1000.0, 1000.0, 1000.0, 50.0),
            candle(100.0, 100.0, 100.0, 10.0),
            candle(102.0, 98.0, 100.0, 10.0),
        ];
        let value = vwap(&candles, 2);
        assert!((value - 100.0).abs() < 1e-9);
    }

    #[test]
    fn vwap_zero_volume_falls_back_to_last_close() {
        let candles = vec![candle(105.0, 95.0, 101.0, 0.0), candle(106.0, 96.0, 102.0, 0.0)];
        assert_eq!(vwap(&candles, 2), 102.0);
    }
}
