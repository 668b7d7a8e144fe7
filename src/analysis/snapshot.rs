// =============================================================================
// Timeframe Snapshot Builder — indicators + light classification
// =============================================================================
//
// One `TimeframeSnapshot` per (entity, timeframe).  Every numeric field is
// a total function of the candle series: too-short input lands on the
// indicator sentinels, never on NaN or a missing field.
//
// The bull/neutral/bear "light" comes from a weighted vote table (total
// weight 10):
//
//   EMA alignment   weight 3   fast>mid and close>long: 3, exactly one: 1
//   MACD agreement  weight 2   hist > 0 and line > signal: 2
//   RSI zone        weight 2   (50,70]: 2, extremes: 1, [30,50]: 0
//   VWAP side       weight 3   close above VWAP: 3
//
// A rule whose inputs are indeterminate (sentinel or exactly flat)
// contributes half its weight, so a series too short for every indicator
// lands at ratio 0.5 — an orange light.

use serde::{Deserialize, Serialize};

use crate::indicators::bollinger::bollinger_default;
use crate::indicators::ema::ema;
use crate::indicators::macd::macd_default;
use crate::indicators::rsi::rsi;
use crate::indicators::stoch_rsi::stoch_rsi_default;
use crate::indicators::vwap::vwap;
use crate::market_data::{closes, intraday_count, Candle};
use crate::types::Light;

/// EMA periods for the fast / mid / long stack.
pub const EMA_FAST: usize = 9;
pub const EMA_MID: usize = 21;
pub const EMA_LONG: usize = 55;

/// Trailing window for the volume ratio.
const VOLUME_WINDOW: usize = 20;

/// Full indicator snapshot of one candle series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeframeSnapshot {
    pub ema_fast: f64,
    pub ema_mid: f64,
    pub ema_long: f64,
    pub macd_line: f64,
    pub macd_signal: f64,
    pub macd_hist: f64,
    pub rsi: f64,
    pub vwap_value: f64,
    pub vwap_above: bool,
    pub bb_upper: f64,
    pub bb_middle: f64,
    pub bb_lower: f64,
    pub bb_squeeze: bool,
    pub atr: f64,
    pub last_close: f64,
    /// Stochastic RSI %K, when the series is long enough.
    pub stoch_k: Option<f64>,
    /// Stochastic RSI %D, when the series is long enough.
    pub stoch_d: Option<f64>,
    /// Last volume over the trailing average (1.0 when undefined).
    pub volume_ratio: f64,
    pub light: Light,
}

impl TimeframeSnapshot {
    /// MACD bullish agreement: histogram sign matches the line/signal
    /// ordering on the bullish side.
    pub fn macd_bullish(&self) -> bool {
        self.macd_hist > 0.0 && self.macd_line > self.macd_signal
    }
}

/// Build the snapshot for one candle series (oldest first).
pub fn build_snapshot(candles: &[Candle]) -> TimeframeSnapshot {
    let close_series = closes(candles);
    let last_close = close_series.last().copied().unwrap_or(0.0);

    let ema_fast = ema(&close_series, EMA_FAST, last_close);
    let ema_mid = ema(&close_series, EMA_MID, last_close);
    let ema_long = ema(&close_series, EMA_LONG, last_close);

    let macd = macd_default(&close_series);
    let rsi_value = rsi(&close_series, 14);
    let bb = bollinger_default(&close_series);
    let atr_value = crate::indicators::atr::atr(candles, 14);
    let stoch = stoch_rsi_default(&close_series);

    let vwap_value = vwap(candles, intraday_count(candles));

    let volume_ratio = {
        let n = candles.len().min(VOLUME_WINDOW);
        if n == 0 {
            1.0
        } else {
            let avg = candles[candles.len() - n..]
                .iter()
                .map(|c| c.volume)
                .sum::<f64>()
                / n as f64;
            let last = candles.last().map(|c| c.volume).unwrap_or(0.0);
            if avg > 0.0 && (last / avg).is_finite() {
                last / avg
            } else {
                1.0
            }
        }
    };

    let mut snapshot = TimeframeSnapshot {
        ema_fast,
        ema_mid,
        ema_long,
        macd_line: macd.line,
        macd_signal: macd.signal,
        macd_hist: macd.histogram,
        rsi: rsi_value,
        vwap_value,
        vwap_above: last_close > vwap_value,
        bb_upper: bb.upper,
        bb_middle: bb.middle,
        bb_lower: bb.lower,
        bb_squeeze: bb.squeeze,
        atr: atr_value,
        last_close,
        stoch_k: stoch.k,
        stoch_d: stoch.d,
        volume_ratio,
        light: Light::Orange,
    };
    snapshot.light = classify_light(&snapshot);
    snapshot
}

// =============================================================================
// Light classification — weighted vote table
// =============================================================================

/// One row of the vote table.  `vote` returns the bull points earned in
/// `0..=weight`, or `None` when the rule's inputs are indeterminate — an
/// indeterminate rule contributes half its weight.
pub struct VoteRule {
    pub name: &'static str,
    pub weight: f64,
    vote: fn(&TimeframeSnapshot) -> Option<f64>,
}

/// The full vote table.  Weights sum to 10.
pub const VOTE_RULES: [VoteRule; 4] = [
    VoteRule {
        name: "ema_alignment",
        weight: 3.0,
        vote: ema_vote,
    },
    VoteRule {
        name: "macd_agreement",
        weight: 2.0,
        vote: macd_vote,
    },
    VoteRule {
        name: "rsi_zone",
        weight: 2.0,
        vote: rsi_vote,
    },
    VoteRule {
        name: "vwap_side",
        weight: 3.0,
        vote: vwap_vote,
    },
];

/// Total voting weight.
pub const TOTAL_WEIGHT: f64 = 10.0;

fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= f64::EPSILON * a.abs().max(b.abs()).max(1.0)
}

fn ema_vote(s: &TimeframeSnapshot) -> Option<f64> {
    if approx_eq(s.ema_fast, s.ema_mid) && approx_eq(s.last_close, s.ema_long) {
        return None; // flat stack — no directional information
    }
    let fast_over_mid = s.ema_fast > s.ema_mid;
    let price_over_long = s.last_close > s.ema_long;
    Some(match (fast_over_mid, price_over_long) {
        (true, true) => 3.0,
        (true, false) | (false, true) => 1.0,
        (false, false) => 0.0,
    })
}

fn macd_vote(s: &TimeframeSnapshot) -> Option<f64> {
    if s.macd_line == 0.0 && s.macd_signal == 0.0 && s.macd_hist == 0.0 {
        return None; // zero sentinel
    }
    Some(if s.macd_bullish() { 2.0 } else { 0.0 })
}

fn rsi_vote(s: &TimeframeSnapshot) -> Option<f64> {
    if approx_eq(s.rsi, 50.0) {
        return None; // sentinel / exact midpoint
    }
    Some(if s.rsi > 50.0 && s.rsi <= 70.0 {
        2.0
    } else if s.rsi > 70.0 || s.rsi < 30.0 {
        1.0
    } else {
        0.0
    })
}

fn vwap_vote(s: &TimeframeSnapshot) -> Option<f64> {
    if approx_eq(s.last_close, s.vwap_value) {
        return None;
    }
    Some(if s.last_close > s.vwap_value { 3.0 } else { 0.0 })
}

/// Total bull points across the vote table, in [0, 10].
pub fn bull_points(snapshot: &TimeframeSnapshot) -> f64 {
    VOTE_RULES
        .iter()
        .map(|rule| (rule.vote)(snapshot).unwrap_or(rule.weight / 2.0))
        .sum()
}

/// Classify the light from the vote ratio: green >= 0.7, red <= 0.3,
/// otherwise orange.
pub fn classify_light(snapshot: &TimeframeSnapshot) -> Light {
    let ratio = bull_points(snapshot) / TOTAL_WEIGHT;
    if ratio >= 0.7 {
        Light::Green
    } else if ratio <= 0.3 {
        Light::Red
    } else {
        Light::Orange
    }
}
