// =============================================================================
// Trade-Level Calculator — stop-loss / take-profit derivation
// =============================================================================
//
// Two variants:
//
//   Simple — ATR-scaled: SL at 1.5 ATR against the trade, TP at 2 ATR in
//   favour, risk/reward from the two distances.
//
//   Tight — range-scaled: SL distance is the mean (high-low)/close of the
//   last 20 candles, times 1.5, clamped to [0.3 %, 0.8 %].  TP1/2/3 sit
//   at 1.2/2.0/3.0 times that distance, each snapped to the nearest
//   clustered S/R level inside a tolerance band.  After snapping, the
//   ordering invariant (LONG: sl < entry < tp1 < tp2 < tp3, SHORT
//   mirrored) is restored by clamping violators a minimum step past
//   their neighbour.

use serde::{Deserialize, Serialize};

use crate::analysis::sr_levels::SrLevel;
use crate::market_data::Candle;
use crate::types::Direction;

/// ATR multiplier for the simple stop-loss.
const SL_ATR_MULT: f64 = 1.5;
/// ATR multiplier for the simple take-profit.
const TP_ATR_MULT: f64 = 2.0;

/// Range multiplier for the tight stop distance.
const TIGHT_RANGE_MULT: f64 = 1.5;
/// Clamp bounds for the tight stop distance, in percent.
const TIGHT_MIN_PCT: f64 = 0.3;
const TIGHT_MAX_PCT: f64 = 0.8;
/// TP distance multipliers relative to the stop distance.
const TP_MULTS: [f64; 3] = [1.2, 2.0, 3.0];
/// Candle window for the tight range estimate.
const RANGE_WINDOW: usize = 20;
/// Snap tolerance around each raw target, as a fraction of entry.
const SNAP_TOLERANCE: f64 = 0.0015;
/// Minimum separation enforced between adjacent levels, as a fraction
/// of entry.
const MIN_STEP: f64 = 0.0005;

/// Simple ATR-derived levels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TradeLevels {
    pub direction: Direction,
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub risk_reward: f64,
}

/// Compute the simple ATR-scaled levels.
///
/// A zero or negative ATR degrades to levels pinned at the entry with a
/// zero risk/reward — the caller treats that as "no volatility estimate".
pub fn simple_levels(entry: f64, atr: f64, direction: Direction) -> TradeLevels {
    let atr = if atr.is_finite() && atr > 0.0 { atr } else { 0.0 };

    let (stop_loss, take_profit) = match direction {
        Direction::Long => (entry - atr * SL_ATR_MULT, entry + atr * TP_ATR_MULT),
        Direction::Short => (entry + atr * SL_ATR_MULT, entry - atr * TP_ATR_MULT),
    };

    let risk = (entry - stop_loss).abs();
    let reward = (take_profit - entry).abs();
    let risk_reward = if risk > 0.0 { reward / risk } else { 0.0 };

    TradeLevels {
        direction,
        entry,
        stop_loss,
        take_profit,
        risk_reward,
    }
}

/// Tight levels with three take-profit targets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TightLevels {
    pub direction: Direction,
    pub entry: f64,
    pub stop_loss: f64,
    pub tp1: f64,
    pub tp2: f64,
    pub tp3: f64,
    /// Stop distance actually used, in percent of entry.
    pub sl_distance_pct: f64,
}

/// Compute the tight range-scaled levels, snapping targets to clustered
/// S/R levels and then enforcing the ordering invariant.
pub fn tight_levels(
    candles: &[Candle],
    entry: f64,
    direction: Direction,
    sr: &[SrLevel],
) -> TightLevels {
    let sl_distance_pct = stop_distance_pct(candles);
    let dist = entry * sl_distance_pct / 100.0;

    let sign = match direction {
        Direction::Long => 1.0,
        Direction::Short => -1.0,
    };

    let stop_loss = entry - sign * dist;
    let mut tps = [
        entry + sign * dist * TP_MULTS[0],
        entry + sign * dist * TP_MULTS[1],
        entry + sign * dist * TP_MULTS[2],
    ];

    // --- Snap each target to the nearest S/R level in tolerance --------------
    let tolerance = entry * SNAP_TOLERANCE;
    for tp in tps.iter_mut() {
        if let Some(snapped) = nearest_level(sr, *tp, tolerance) {
            *tp = snapped;
        }
    }

    // --- Restore the ordering invariant --------------------------------------
    let step = entry * MIN_STEP;
    let (stop_loss, tp1, tp2, tp3) = match direction {
        Direction::Long => {
            let sl = stop_loss.min(entry - step);
            let tp1 = tps[0].max(entry + step);
            let tp2 = tps[1].max(tp1 + step);
            let tp3 = tps[2].max(tp2 + step);
            (sl, tp1, tp2, tp3)
        }
        Direction::Short => {
            let sl = stop_loss.max(entry + step);
            let tp1 = tps[0].min(entry - step);
            let tp2 = tps[1].min(tp1 - step);
            let tp3 = tps[2].min(tp2 - step);
            (sl, tp1, tp2, tp3)
        }
    };

    TightLevels {
        direction,
        entry,
        stop_loss,
        tp1,
        tp2,
        tp3,
        sl_distance_pct,
    }
}

/// Mean (high-low)/close over the trailing window, times the range
/// multiplier, clamped to the tight bounds.  Empty input sits on the
/// lower clamp.
fn stop_distance_pct(candles: &[Candle]) -> f64 {
    let n = candles.len().min(RANGE_WINDOW);
    if n == 0 {
        return TIGHT_MIN_PCT;
    }

    let window = &candles[candles.len() - n..];
    let mean_range: f64 = window
        .iter()
        .filter(|c| c.close > 0.0)
        .map(|c| (c.high - c.low) / c.close)
        .sum::<f64>()
        / n as f64;

    let pct = mean_range * 100.0 * TIGHT_RANGE_MULT;
    if pct.is_finite() {
        pct.clamp(TIGHT_MIN_PCT, TIGHT_MAX_PCT)
    } else {
        TIGHT_MIN_PCT
    }
}

/// The S/R level closest to `target` within `tolerance`, if any.
fn nearest_level(sr: &[SrLevel], target: f64, tolerance: f64) -> Option<f64> {
    sr.iter()
        .map(|l| l.price)
        .filter(|p| (p - target).abs() <= tolerance)
        .min_by(|a, b| {
            (a - target)
                .abs()
                .partial_cmp(&(b - target).abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
}
