// =============================================================================
// Analysis Module
// =============================================================================
//
// The pure core of the scanner: per-timeframe indicator snapshots, the
// composite scorer, support/resistance clustering and trade-level
// derivation, plus the `Entity` record that ties one symbol's analysis
// together for the display surface.

pub mod levels;
pub mod scorer;
pub mod snapshot;
pub mod sr_levels;

pub use levels::{simple_levels, tight_levels, TightLevels, TradeLevels};
pub use scorer::{compute_score, score_ceiling, LightCounts, ScoreBreakdown};
pub use snapshot::{build_snapshot, classify_light, TimeframeSnapshot};
pub use sr_levels::{detect_levels, SrKind, SrLevel, SrStrength};

use std::collections::HashMap;

use serde::Serialize;

use crate::types::{Provenance, Signal, Timeframe};

/// One analysed market entity — a row of the scanner table plus the full
/// detail payload behind it.
///
/// Entities are seeded from the coarse markets listing (`Approximate`
/// provenance) and upgraded in place as the loader's authoritative
/// batches complete.  `provenance` never moves backwards within a cycle.
#[derive(Debug, Clone, Serialize)]
pub struct Entity {
    /// Trading pair, e.g. `BTCUSDT`.  The identity key for merges.
    pub symbol: String,
    pub name: String,
    pub rank: u32,
    pub price: f64,
    pub change_24h_pct: f64,
    pub volume_24h: f64,
    pub market_cap: f64,
    pub snapshots: HashMap<Timeframe, TimeframeSnapshot>,
    /// Composite score in [0, 100]; `None` while the signal is `Pending`.
    pub score: Option<f64>,
    pub signal: Signal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<ScoreBreakdown>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trade_levels: Option<TradeLevels>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tight_levels: Option<TightLevels>,
    pub sr_levels: Vec<SrLevel>,
    pub provenance: Provenance,
    /// Last update, milliseconds since the UNIX epoch.
    pub updated_at: i64,
}

impl Entity {
    /// A bare entity with no analysis yet: score `None`, signal
    /// `Pending`, approximate provenance.
    pub fn pending(symbol: impl Into<String>, name: impl Into<String>, rank: u32) -> Self {
        Self {
            symbol: symbol.into(),
            name: name.into(),
            rank,
            price: 0.0,
            change_24h_pct: 0.0,
            volume_24h: 0.0,
            market_cap: 0.0,
            snapshots: HashMap::new(),
            score: None,
            signal: Signal::Pending,
            breakdown: None,
            trade_levels: None,
            tight_levels: None,
            sr_levels: Vec::new(),
            provenance: Provenance::Approximate,
            updated_at: 0,
        }
    }

    /// Upgrade provenance, never downgrading.
    pub fn mark_provenance(&mut self, provenance: Provenance) {
        if provenance == Provenance::Authoritative {
            self.provenance = Provenance::Authoritative;
        }
    }
}
