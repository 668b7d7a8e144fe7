// =============================================================================
// Support / Resistance Clustering Engine
// =============================================================================
//
// 1. Slide a half-width-3 window over the series; a candle is a local
//    minimum (maximum) when no other candle in the window has a lower low
//    (higher high).
// 2. Sort the extrema and greedily group consecutive values whose
//    relative distance to the running cluster mean is < 0.5 %; each
//    cluster collapses to its mean.
// 3. Classify against the current price: below => support, above =>
//    resistance, `Major` within 1 % of price.  Keep at most 4 of each,
//    nearest-first.
//
// Invariant by construction: every support < current price < every
// resistance.

use serde::{Deserialize, Serialize};

use crate::market_data::Candle;
use crate::types::Timeframe;

/// Half-width of the extrema detection window, in candles.
const PIVOT_HALF_WIDTH: usize = 3;
/// Relative distance below which extrema merge into one cluster.
const CLUSTER_TOLERANCE: f64 = 0.005;
/// Relative distance to price below which a level counts as major.
const MAJOR_DISTANCE: f64 = 0.01;
/// Maximum levels kept on each side of the price.
const MAX_PER_SIDE: usize = 4;

/// Which side of the current price a level sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SrKind {
    Support,
    Resistance,
}

/// How close the level is to the current price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SrStrength {
    Major,
    Minor,
}

/// One clustered support/resistance level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SrLevel {
    pub price: f64,
    pub kind: SrKind,
    pub strength: SrStrength,
    pub timeframe: Timeframe,
}

/// Detect and cluster S/R levels in a candle window.
///
/// Returns supports nearest-first (highest first), then resistances
/// nearest-first (lowest first).  Levels exactly at the current price are
/// dropped so the side invariant always holds.
pub fn detect_levels(candles: &[Candle], current_price: f64, timeframe: Timeframe) -> Vec<SrLevel> {
    if current_price <= 0.0 {
        return Vec::new();
    }

    let extrema = find_extrema(candles);
    let clusters = cluster(extrema);

    let mut supports: Vec<f64> = Vec::new();
    let mut resistances: Vec<f64> = Vec::new();
    for level in clusters {
        if level < current_price {
            supports.push(level);
        } else if level > current_price {
            resistances.push(level);
        }
    }

    // Nearest-first on each side of the price.
    supports.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    supports.truncate(MAX_PER_SIDE);
    resistances.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    resistances.truncate(MAX_PER_SIDE);

    let strength_of = |price: f64| {
        if (price - current_price).abs() / current_price < MAJOR_DISTANCE {
            SrStrength::Major
        } else {
            SrStrength::Minor
        }
    };

    let mut levels = Vec::with_capacity(supports.len() + resistances.len());
    for price in supports {
        levels.push(SrLevel {
            price,
            kind: SrKind::Support,
            strength: strength_of(price),
            timeframe,
        });
    }
    for price in resistances {
        levels.push(SrLevel {
            price,
            kind: SrKind::Resistance,
            strength: strength_of(price),
            timeframe,
        });
    }
    levels
}

/// Collect local-extremum prices (lows of minima, highs of maxima).
fn find_extrema(candles: &[Candle]) -> Vec<f64> {
    let n = candles.len();
    if n < PIVOT_HALF_WIDTH * 2 + 1 {
        return Vec::new();
    }

    let mut extrema = Vec::new();
    for i in PIVOT_HALF_WIDTH..n - PIVOT_HALF_WIDTH {
        let window = &candles[i - PIVOT_HALF_WIDTH..=i + PIVOT_HALF_WIDTH];

        let is_min = window.iter().all(|c| c.low >= candles[i].low);
        let is_max = window.iter().all(|c| c.high <= candles[i].high);

        if is_min {
            extrema.push(candles[i].low);
        }
        if is_max {
            extrema.push(candles[i].high);
        }
    }
    extrema
}

/// Greedy clustering: sort, then merge consecutive values within
/// [`CLUSTER_TOLERANCE`] of the running cluster mean.
fn cluster(mut values: Vec<f64>) -> Vec<f64> {
    values.retain(|v| v.is_finite() && *v > 0.0);
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mut clusters = Vec::new();
    let mut current: Vec<f64> = Vec::new();
    let mut mean = 0.0;

    for value in values {
        if current.is_empty() {
            current.push(value);
            mean = value;
            continue;
        }
        if (value - mean).abs() / mean < CLUSTER_TOLERANCE {
            current.push(value);
            mean = current.iter().sum::<f64>() / current.len() as f64;
        } else {
            clusters.push(mean);
            current = vec![value];
            mean = value;
        }
    }
    if !current.is_empty() {
        clusters.push(mean);
    }
    clusters
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::Candle;

    fn candle(open_time: i64, high: f64, low: f64) -> Candle {
        let mid = (high + low) / 2.0;
        Candle {
            open_time,
            open: mid,
            high,
            low,
            close: mid,
            volume: 100.0,
        }
    }

    /// A zig-zag series with clear troughs near 90 and peaks near 110.
    fn zigzag(cycles: usize) -> Vec<Candle> {
        let mut candles = Vec::new();
        let mut t = 0;
        for _ in 0..cycles {
            for &mid in &[100.0, 95.0, 90.0, 95.0, 100.0, 105.0, 110.0, 105.0] {
                candles.push(candle(t, mid + 1.0, mid - 1.0));
                t += 900_000;
            }
        }
        candles
    }

    #[test]
    fn side_invariant_holds() {
        let price = 100.0;
        let levels = detect_levels(&zigzag(6), price, Timeframe::H1);
        assert!(!levels.is_empty());
        for level in &levels {
            match level.kind {
                SrKind::Support => assert!(level.price < price, "support {} >= price", level.price),
                SrKind::Resistance => {
                    assert!(level.price > price, "resistance {} <= price", level.price)
                }
            }
        }
    }

    #[test]
    fn at_most_four_per_side() {
        let levels = detect_levels(&zigzag(10), 100.0, Timeframe::H1);
        let supports = levels.iter().filter(|l| l.kind == SrKind::Support).count();
        let resistances = levels.iter().filter(|l| l.kind == SrKind::Resistance).count();
        assert!(supports <= 4);
        assert!(resistances <= 4);
    }

    #[test]
    fn supports_are_nearest_first() {
        let levels = detect_levels(&zigzag(6), 100.0, Timeframe::H1);
        let supports: Vec<f64> = levels
            .iter()
            .filter(|l| l.kind == SrKind::Support)
            .map(|l| l.price)
            .collect();
        for w in supports.windows(2) {
            assert!(w[0] >= w[1], "supports not nearest-first: {supports:?}");
        }
        let resistances: Vec<f64> = levels
            .iter()
            .filter(|l| l.kind == SrKind::Resistance)
            .map(|l| l.price)
            .collect();
        for w in resistances.windows(2) {
            assert!(w[0] <= w[1], "resistances not nearest-first: {resistances:?}");
        }
    }

    #[test]
    fn major_within_one_percent() {
        let levels = detect_levels(&zigzag(6), 100.0, Timeframe::H1);
        for level in &levels {
            let distance = (level.price - 100.0).abs() / 100.0;
            match level.strength {
                SrStrength::Major => assert!(distance < 0.01),
                SrStrength::Minor => assert!(distance >= 0.01),
            }
        }
    }

    #[test]
    fn short_series_yields_no_levels() {
        let candles: Vec<Candle> = (0..5).map(|i| candle(i, 101.0, 99.0)).collect();
        assert!(detect_levels(&candles, 100.0, Timeframe::H1).is_empty());
    }

    #[test]
    fn zero_price_yields_no_levels() {
        assert!(detect_levels(&zigzag(6), 0.0, Timeframe::H1).is_empty());
    }

    #[test]
    fn clustering_merges_nearby_extrema() {
        // Troughs at 89.0 and 89.2 (0.22% apart) must collapse into one
        // cluster near 89.1.
        let values = vec![89.0, 89.2, 110.0];
        let clusters = cluster(values);
        assert_eq!(clusters.len(), 2);
        assert!((clusters[0] - 89.1).abs() < 1e-9);
        assert!((clusters[1] - 110.0).abs() < 1e-9);
    }

    #[test]
    fn clustering_keeps_distant_extrema_apart() {
        let values = vec![90.0, 95.0, 100.0];
        let clusters = cluster(values);
        assert_eq!(clusters.len(), 3);
    }
}
