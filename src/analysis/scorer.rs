// =============================================================================
// Composite Scorer — fuses the timeframe triple into a capped 0-100 score
// =============================================================================
//
// 1. Count red/orange/green lights across (M15, H1, H4).
// 2. Light distribution => hard score ceiling (first-match rule table).
//    The ceiling is monotone: more bullish lights never lower it.
// 3. Raw score (max 100) = weighted component sum.
// 4. Final score = min(raw, ceiling), clamped to [0, 100].
// 5. Score => Signal via the fixed thresholds in `types::Signal`.

use serde::Serialize;

use crate::analysis::snapshot::TimeframeSnapshot;
use crate::types::{Light, Signal};

/// Light counts across the timeframe triple.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LightCounts {
    pub green: usize,
    pub orange: usize,
    pub red: usize,
}

impl LightCounts {
    /// Tally the lights of a snapshot triple.
    pub fn tally(lights: &[Light]) -> Self {
        let mut counts = Self::default();
        for light in lights {
            match light {
                Light::Green => counts.green += 1,
                Light::Orange => counts.orange += 1,
                Light::Red => counts.red += 1,
            }
        }
        counts
    }
}

// =============================================================================
// Ceiling rule table
// =============================================================================

/// One row of the ceiling table: the first matching rule wins.
pub struct CeilingRule {
    pub name: &'static str,
    pub cap: f64,
    applies: fn(&LightCounts) -> bool,
}

/// Hard score ceilings by light distribution, most bearish first.
pub const CEILING_RULES: [CeilingRule; 5] = [
    CeilingRule {
        name: "two_or_more_red",
        cap: 25.0,
        applies: |c| c.red >= 2,
    },
    CeilingRule {
        name: "one_red",
        cap: 40.0,
        applies: |c| c.red == 1,
    },
    CeilingRule {
        name: "two_or_more_orange",
        cap: 55.0,
        applies: |c| c.orange >= 2,
    },
    CeilingRule {
        name: "one_orange_two_green",
        cap: 65.0,
        applies: |c| c.orange == 1 && c.green == 2,
    },
    CeilingRule {
        name: "all_green",
        cap: 100.0,
        applies: |c| c.green == 3,
    },
];

/// The hard score ceiling for a light distribution.
pub fn score_ceiling(counts: &LightCounts) -> f64 {
    for rule in &CEILING_RULES {
        if (rule.applies)(counts) {
            return rule.cap;
        }
    }
    // Unreachable for a triple of lights; stay total regardless.
    100.0
}

// =============================================================================
// Raw score
// =============================================================================

/// Contribution of one scoring component.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreComponent {
    pub name: &'static str,
    pub points: f64,
    pub max: f64,
}

/// Full scoring result for one entity.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreBreakdown {
    pub raw: f64,
    pub ceiling: f64,
    pub score: f64,
    pub signal: Signal,
    pub lights: LightCounts,
    pub components: Vec<ScoreComponent>,
}

/// Compute the composite score for the (short, medium, long) snapshot
/// triple at the given current price.
pub fn compute_score(
    short: &TimeframeSnapshot,
    medium: &TimeframeSnapshot,
    long: &TimeframeSnapshot,
    price: f64,
) -> ScoreBreakdown {
    let triple = [short, medium, long];
    let lights = LightCounts::tally(&[short.light, medium.light, long.light]);

    let mut components = Vec::with_capacity(6);

    // --- Lights: 10 per green + 3 per orange, max 30 -------------------------
    let light_points = (lights.green as f64 * 10.0 + lights.orange as f64 * 3.0).min(30.0);
    components.push(ScoreComponent {
        name: "lights",
        points: light_points,
        max: 30.0,
    });

    // --- VWAP agreement across all timeframes, max 20 ------------------------
    let above = triple.iter().filter(|s| s.vwap_above).count();
    let vwap_points = 20.0 * above as f64 / 3.0;
    components.push(ScoreComponent {
        name: "vwap_agreement",
        points: vwap_points,
        max: 20.0,
    });

    // --- RSI zone (mean across the triple), max 15 ---------------------------
    let mean_rsi = triple.iter().map(|s| s.rsi).sum::<f64>() / 3.0;
    let rsi_points = if mean_rsi > 50.0 && mean_rsi <= 70.0 {
        15.0
    } else if mean_rsi > 70.0 {
        8.0
    } else if mean_rsi >= 40.0 {
        5.0
    } else {
        0.0
    };
    components.push(ScoreComponent {
        name: "rsi_zone",
        points: rsi_points,
        max: 15.0,
    });

    // --- MACD state, 5 per bullish timeframe, max 15 -------------------------
    let macd_points = triple.iter().filter(|s| s.macd_bullish()).count() as f64 * 5.0;
    components.push(ScoreComponent {
        name: "macd_state",
        points: macd_points,
        max: 15.0,
    });

    // --- Price vs the long timeframe's slow EMA, max 15 ----------------------
    let ema_points = if price > long.ema_long { 15.0 } else { 0.0 };
    components.push(ScoreComponent {
        name: "price_above_long_ema",
        points: ema_points,
        max: 15.0,
    });

    // --- Bollinger position + volume on the short timeframe, max 5 -----------
    let mut bb_points = 0.0;
    if short.last_close > short.bb_middle {
        bb_points += 3.0;
    }
    if short.volume_ratio > 1.0 {
        bb_points += 2.0;
    }
    components.push(ScoreComponent {
        name: "bollinger_volume",
        points: bb_points,
        max: 5.0,
    });

    let raw: f64 = components.iter().map(|c| c.points).sum::<f64>().min(100.0);
    let ceiling = score_ceiling(&lights);
    let score = raw.min(ceiling).clamp(0.0, 100.0);

    ScoreBreakdown {
        raw,
        ceiling,
        score,
        signal: Signal::from_score(score),
        lights,
        components,
    }
}
