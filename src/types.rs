// =============================================================================
// Shared types used across the Meridian scanner
// =============================================================================

use serde::{Deserialize, Serialize};

/// Per-timeframe discrete bull/neutral/bear classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Light {
    Green,
    Orange,
    Red,
}

impl std::fmt::Display for Light {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Green => write!(f, "GREEN"),
            Self::Orange => write!(f, "ORANGE"),
            Self::Red => write!(f, "RED"),
        }
    }
}

/// Discrete trading signal derived from the composite score.
///
/// `Pending` is a distinct state used while an entity has no authoritative
/// data yet. It carries no score and must never be read as `Neutral`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    StrongBuy,
    Buy,
    Neutral,
    Sell,
    StrongSell,
    Pending,
}

impl Signal {
    /// Map a composite score in [0, 100] onto a signal.
    ///
    /// Thresholds: >75 StrongBuy, >60 Buy, >40 Neutral, >25 Sell,
    /// else StrongSell. The partition is total over [0, 100].
    pub fn from_score(score: f64) -> Self {
        if score > 75.0 {
            Self::StrongBuy
        } else if score > 60.0 {
            Self::Buy
        } else if score > 40.0 {
            Self::Neutral
        } else if score > 25.0 {
            Self::Sell
        } else {
            Self::StrongSell
        }
    }

    /// The trade direction implied by this signal, if any.
    pub fn direction(&self) -> Option<Direction> {
        match self {
            Self::StrongBuy | Self::Buy => Some(Direction::Long),
            Self::Sell | Self::StrongSell => Some(Direction::Short),
            Self::Neutral | Self::Pending => None,
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StrongBuy => write!(f, "STRONG_BUY"),
            Self::Buy => write!(f, "BUY"),
            Self::Neutral => write!(f, "NEUTRAL"),
            Self::Sell => write!(f, "SELL"),
            Self::StrongSell => write!(f, "STRONG_SELL"),
            Self::Pending => write!(f, "PENDING"),
        }
    }
}

/// Trade direction for level calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
        }
    }
}

/// Whether an entity's analysis came from the coarse listing fallback or
/// from authoritative per-timeframe candles.
///
/// Transitions monotonically `Approximate -> Authoritative` within a load
/// cycle; the merge path never downgrades it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Provenance {
    Approximate,
    Authoritative,
}

impl Default for Provenance {
    fn default() -> Self {
        Self::Approximate
    }
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Approximate => write!(f, "approximate"),
            Self::Authoritative => write!(f, "authoritative"),
        }
    }
}

/// The fixed timeframe triple the scanner analyses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    M15,
    H1,
    H4,
}

impl Timeframe {
    /// All timeframes, shortest first.
    pub const ALL: [Timeframe; 3] = [Timeframe::M15, Timeframe::H1, Timeframe::H4];

    /// The interval string the klines endpoint expects.
    pub fn interval(&self) -> &'static str {
        match self {
            Self::M15 => "15m",
            Self::H1 => "1h",
            Self::H4 => "4h",
        }
    }

    /// Candle duration in minutes.
    pub fn minutes(&self) -> i64 {
        match self {
            Self::M15 => 15,
            Self::H1 => 60,
            Self::H4 => 240,
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.interval())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_partition_is_total_and_non_overlapping() {
        // Walk the whole score domain in small steps; every score maps to
        // exactly one non-Pending signal.
        let mut i = 0;
        while i <= 1000 {
            let score = i as f64 / 10.0;
            let signal = Signal::from_score(score);
            assert_ne!(signal, Signal::Pending, "score {score} must never map to PENDING");
            i += 1;
        }
    }

    #[test]
    fn signal_thresholds() {
        assert_eq!(Signal::from_score(100.0), Signal::StrongBuy);
        assert_eq!(Signal::from_score(75.1), Signal::StrongBuy);
        assert_eq!(Signal::from_score(75.0), Signal::Buy);
        assert_eq!(Signal::from_score(60.0), Signal::Neutral);
        assert_eq!(Signal::from_score(40.0), Signal::Sell);
        assert_eq!(Signal::from_score(25.0), Signal::StrongSell);
        assert_eq!(Signal::from_score(0.0), Signal::StrongSell);
    }

    #[test]
    fn signal_directions() {
        assert_eq!(Signal::StrongBuy.direction(), Some(Direction::Long));
        assert_eq!(Signal::Buy.direction(), Some(Direction::Long));
        assert_eq!(Signal::Sell.direction(), Some(Direction::Short));
        assert_eq!(Signal::StrongSell.direction(), Some(Direction::Short));
        assert_eq!(Signal::Neutral.direction(), None);
        assert_eq!(Signal::Pending.direction(), None);
    }

    #[test]
    fn timeframe_intervals() {
        assert_eq!(Timeframe::M15.interval(), "15m");
        assert_eq!(Timeframe::H1.interval(), "1h");
        assert_eq!(Timeframe::H4.interval(), "4h");
        assert_eq!(Timeframe::ALL.len(), 3);
    }

    #[test]
    fn provenance_default_is_approximate() {
        assert_eq!(Provenance::default(), Provenance::Approximate);
    }
}
