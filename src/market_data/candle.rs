// =============================================================================
// Candle — one OHLCV bar and the series helpers built on it
// =============================================================================
//
// Series invariant: candles are ordered oldest -> newest with strictly
// increasing `open_time`.  `sanitize_series` enforces this on ingest so
// downstream indicator code can rely on it.

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A single OHLCV candle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Candle {
    /// Bar open time, milliseconds since the UNIX epoch.
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Typical price (h + l + c) / 3.
    pub fn typical(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }
}

/// Extract the close series from a candle slice.
pub fn closes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close).collect()
}

/// Number of trailing candles belonging to the current UTC session (the
/// day of the most recent candle).  Used to window the session VWAP.
pub fn intraday_count(candles: &[Candle]) -> usize {
    let last = match candles.last() {
        Some(c) => c,
        None => return 0,
    };

    let day_start_ms = match Utc.timestamp_millis_opt(last.open_time).single() {
        Some(dt) => {
            let midnight = dt.date_naive().and_hms_opt(0, 0, 0).unwrap_or_default();
            DateTime::<Utc>::from_naive_utc_and_offset(midnight, Utc).timestamp_millis()
        }
        None => return candles.len(),
    };

    candles
        .iter()
        .rev()
        .take_while(|c| c.open_time >= day_start_ms)
        .count()
}

/// Drop malformed rows and enforce the strictly-increasing open-time
/// invariant.  Rows with non-finite prices, non-positive ranges or
/// out-of-order timestamps are discarded.
pub fn sanitize_series(mut candles: Vec<Candle>) -> Vec<Candle> {
    candles.retain(|c| {
        c.open.is_finite()
            && c.high.is_finite()
            && c.low.is_finite()
            && c.close.is_finite()
            && c.volume.is_finite()
            && c.high >= c.low
    });
    candles.sort_by_key(|c| c.open_time);
    candles.dedup_by_key(|c| c.open_time);
    candles
}

// =============================================================================
// Klines payload parsing
// =============================================================================

/// Parse a klines response body: a JSON array of arrays shaped
/// `[openTime, "open", "high", "low", "close", "volume", ...]` with the
/// numeric fields encoded as strings.
pub fn parse_klines_payload(body: &str) -> Result<Vec<Candle>> {
    let rows: Vec<serde_json::Value> =
        serde_json::from_str(body).context("failed to parse klines JSON")?;

    let mut candles = Vec::with_capacity(rows.len());
    for row in &rows {
        let fields = match row.as_array() {
            Some(f) if f.len() >= 6 => f,
            _ => continue, // malformed row — skip, not fatal
        };

        let open_time = match fields[0].as_i64() {
            Some(t) => t,
            None => continue,
        };

        let parse = |v: &serde_json::Value| -> Option<f64> {
            match v {
                serde_json::Value::String(s) => s.parse::<f64>().ok(),
                serde_json::Value::Number(n) => n.as_f64(),
                _ => None,
            }
        };

        let (open, high, low, close, volume) = match (
            parse(&fields[1]),
            parse(&fields[2]),
            parse(&fields[3]),
            parse(&fields[4]),
            parse(&fields[5]),
        ) {
            (Some(o), Some(h), Some(l), Some(c), Some(v)) => (o, h, l, c, v),
            _ => continue,
        };

        candles.push(Candle {
            open_time,
            open,
            high,
            low,
            close,
            volume,
        });
    }

    Ok(sanitize_series(candles))
}

// =============================================================================
// Coarse fallback series
// =============================================================================

/// Build an approximate candle series from a multi-day hourly close
/// series, as delivered by the markets listing.  The listing carries no
/// OHLC: high/low are approximated from adjacent closes and the 24 h
/// volume is amortised evenly across the points.
pub fn candles_from_hourly_closes(
    hourly_closes: &[f64],
    total_volume: f64,
    end_time_ms: i64,
) -> Vec<Candle> {
    const HOUR_MS: i64 = 3_600_000;

    let n = hourly_closes.len();
    if n == 0 {
        return Vec::new();
    }
    let per_point_volume = if total_volume > 0.0 {
        total_volume / n as f64
    } else {
        0.0
    };

    let mut candles = Vec::with_capacity(n);
    for (i, &close) in hourly_closes.iter().enumerate() {
        let prev = if i > 0 { hourly_closes[i - 1] } else { close };
        candles.push(Candle {
            open_time: end_time_ms - (n as i64 - i as i64) * HOUR_MS,
            open: prev,
            high: prev.max(close),
            low: prev.min(close),
            close,
            volume: per_point_volume,
        });
    }

    sanitize_series(candles)
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn candle_at(open_time: i64, close: f64) -> Candle {
        Candle {
            open_time,
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 10.0,
        }
    }

    #[test]
    fn sanitize_orders_and_dedupes() {
        let series = sanitize_series(vec![
            candle_at(3_000, 3.0),
            candle_at(1_000, 1.0),
            candle_at(2_000, 2.0),
            candle_at(2_000, 2.5),
        ]);
        let times: Vec<i64> = series.iter().map(|c| c.open_time).collect();
        assert_eq!(times, vec![1_000, 2_000, 3_000]);
        for w in series.windows(2) {
            assert!(w[1].open_time > w[0].open_time);
        }
    }

    #[test]
    fn sanitize_drops_malformed_rows() {
        let mut bad = candle_at(1_000, 5.0);
        bad.high = f64::NAN;
        let mut inverted = candle_at(2_000, 5.0);
        inverted.high = 1.0;
        inverted.low = 9.0;
        let series = sanitize_series(vec![bad, inverted, candle_at(3_000, 5.0)]);
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].open_time, 3_000);
    }

    #[test]
    fn parse_klines_happy_path() {
        let body = r#"[
            [1700000000000, "100.0", "105.0", "95.0", "102.0", "12.5", 1700000899999],
            [1700000900000, "102.0", "108.0", "101.0", "107.0", "9.75", 1700001799999]
        ]"#;
        let candles = parse_klines_payload(body).expect("should parse");
        assert_eq!(candles.len(), 2);
        assert!((candles[0].close - 102.0).abs() < f64::EPSILON);
        assert!((candles[1].volume - 9.75).abs() < f64::EPSILON);
        assert!(candles[1].open_time > candles[0].open_time);
    }

    #[test]
    fn parse_klines_skips_malformed_rows() {
        let body = r#"[
            [1700000000000, "100.0", "105.0", "95.0", "102.0", "12.5"],
            ["not-a-timestamp", "1", "2", "3", "4", "5"],
            [1700000900000, "bad", "108.0", "101.0", "107.0", "9.75"],
            [1700001800000, "107.0", "109.0", "106.0", "108.0", "3.25"]
        ]"#;
        let candles = parse_klines_payload(body).expect("should parse");
        assert_eq!(candles.len(), 2);
    }

    #[test]
    fn parse_klines_rejects_non_array_body() {
        assert!(parse_klines_payload(r#"{"code": -1121}"#).is_err());
    }

    #[test]
    fn hourly_closes_approximate_ohlc() {
        let closes = vec![100.0, 102.0, 99.0];
        let candles = candles_from_hourly_closes(&closes, 300.0, 1_700_000_000_000);
        assert_eq!(candles.len(), 3);
        // Second bar: open = prev close, high/low from the adjacent pair.
        assert!((candles[1].open - 100.0).abs() < 1e-12);
        assert!((candles[1].high - 102.0).abs() < 1e-12);
        assert!((candles[1].low - 100.0).abs() < 1e-12);
        // Volume amortised evenly.
        for c in &candles {
            assert!((c.volume - 100.0).abs() < 1e-12);
        }
        // Strictly increasing hourly timestamps.
        for w in candles.windows(2) {
            assert_eq!(w[1].open_time - w[0].open_time, 3_600_000);
        }
    }

    #[test]
    fn hourly_closes_empty_input() {
        assert!(candles_from_hourly_closes(&[], 100.0, 0).is_empty());
    }

    #[test]
    fn intraday_count_resets_at_utc_midnight() {
        const HOUR_MS: i64 = 3_600_000;
        // 2023-11-15 00:00:00 UTC.
        let midnight = 1_700_006_400_000;
        let candles: Vec<Candle> = (-3..5)
            .map(|i| candle_at(midnight + i * HOUR_MS, 100.0))
            .collect();
        // Last candle opens at midnight + 4h; 5 candles at/after midnight.
        assert_eq!(intraday_count(&candles), 5);
    }

    #[test]
    fn intraday_count_empty_is_zero() {
        assert_eq!(intraday_count(&[]), 0);
    }
}
