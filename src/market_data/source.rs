// =============================================================================
// Market Data Source — upstream OHLCV and listing client
// =============================================================================
//
// Two upstream surfaces:
//   1. Authoritative klines: per (pair, interval) candle arrays.
//   2. Coarse markets listing: ranked symbols with price / 24 h stats and
//      a multi-day hourly close series, used only to seed entities before
//      their authoritative data arrives.
//
// The client reads the upstream's used-weight response header into an
// atomic tracker and refuses to send once the hard budget is reached; the
// loader's inter-batch delay is the primary limiter, this is the backstop.

use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::market_data::candle::{parse_klines_payload, Candle};
use crate::types::Timeframe;

/// Hard ceiling at which we refuse to send additional requests.
const WEIGHT_HARD_LIMIT: u32 = 1000;
/// Soft warning threshold.
const WEIGHT_WARN_THRESHOLD: u32 = 800;
/// Request weight charged per klines call.
const KLINES_WEIGHT: u32 = 2;

/// One row of the coarse markets listing.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketEntry {
    pub symbol: String,
    pub name: String,
    #[serde(default)]
    pub market_cap_rank: Option<u32>,
    #[serde(default)]
    pub current_price: f64,
    #[serde(default)]
    pub price_change_percentage_24h: Option<f64>,
    #[serde(default)]
    pub total_volume: f64,
    #[serde(default)]
    pub market_cap: f64,
    #[serde(default)]
    pub sparkline_in_7d: Option<Sparkline>,
}

/// Hourly close series attached to a listing row.
#[derive(Debug, Clone, Deserialize)]
pub struct Sparkline {
    #[serde(default)]
    pub price: Vec<f64>,
}

impl MarketEntry {
    /// The trading pair the klines endpoint expects for this symbol.
    pub fn pair(&self) -> String {
        format!("{}USDT", self.symbol.to_uppercase())
    }

    /// The hourly close series, empty when the listing omitted it.
    pub fn hourly_closes(&self) -> &[f64] {
        self.sparkline_in_7d
            .as_ref()
            .map(|s| s.price.as_slice())
            .unwrap_or(&[])
    }
}

/// HTTP client for both upstream surfaces.
pub struct MarketDataSource {
    client: reqwest::Client,
    klines_base: String,
    listing_base: String,
    used_weight_1m: AtomicU32,
}

impl MarketDataSource {
    /// Create a new source client.
    ///
    /// # Arguments
    /// * `klines_base`  — base URL of the authoritative klines endpoint.
    /// * `listing_base` — base URL of the coarse markets listing.
    pub fn new(klines_base: impl Into<String>, listing_base: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("failed to build reqwest client");

        Self {
            client,
            klines_base: klines_base.into(),
            listing_base: listing_base.into(),
            used_weight_1m: AtomicU32::new(0),
        }
    }

    // -------------------------------------------------------------------------
    // Rate-limit tracking
    // -------------------------------------------------------------------------

    /// Current used weight as reported by the upstream.
    pub fn used_weight(&self) -> u32 {
        self.used_weight_1m.load(Ordering::Relaxed)
    }

    fn update_weight_from_headers(&self, headers: &reqwest::header::HeaderMap) {
        if let Some(val) = headers.get("X-MBX-USED-WEIGHT-1M") {
            if let Ok(w) = val.to_str().unwrap_or("").parse::<u32>() {
                let prev = self.used_weight_1m.swap(w, Ordering::Relaxed);
                if w >= WEIGHT_WARN_THRESHOLD && prev < WEIGHT_WARN_THRESHOLD {
                    warn!(
                        used_weight = w,
                        hard_limit = WEIGHT_HARD_LIMIT,
                        "rate-limit weight crossed warning threshold"
                    );
                }
            }
        }
    }

    fn can_send(&self, weight: u32) -> bool {
        let current = self.used_weight_1m.load(Ordering::Relaxed);
        current + weight <= WEIGHT_HARD_LIMIT
    }

    // -------------------------------------------------------------------------
    // Authoritative klines
    // -------------------------------------------------------------------------

    /// Fetch an ordered candle series for `pair` at `timeframe`.
    ///
    /// A non-success status, malformed body or empty series is a fetch
    /// failure — the caller degrades to the entity's prior snapshot.
    pub async fn fetch_series(
        &self,
        pair: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        if !self.can_send(KLINES_WEIGHT) {
            anyhow::bail!(
                "rate-limit budget exhausted ({} used)",
                self.used_weight()
            );
        }

        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.klines_base,
            pair,
            timeframe.interval(),
            limit
        );

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("klines request failed for {pair}@{timeframe}"))?;

        self.update_weight_from_headers(resp.headers());

        let status = resp.status();
        let body = resp
            .text()
            .await
            .with_context(|| format!("failed to read klines body for {pair}@{timeframe}"))?;

        if !status.is_success() {
            anyhow::bail!("klines for {pair}@{timeframe} returned {status}: {body}");
        }

        let candles = parse_klines_payload(&body)
            .with_context(|| format!("malformed klines payload for {pair}@{timeframe}"))?;

        if candles.is_empty() {
            anyhow::bail!("klines for {pair}@{timeframe} returned no usable candles");
        }

        debug!(pair, timeframe = %timeframe, count = candles.len(), "series fetched");
        Ok(candles)
    }

    // -------------------------------------------------------------------------
    // Coarse markets listing
    // -------------------------------------------------------------------------

    /// Fetch the ranked markets listing (top `count` by market cap) with
    /// the hourly sparkline series attached.
    pub async fn fetch_markets(&self, count: usize) -> Result<Vec<MarketEntry>> {
        let url = format!(
            "{}/api/v3/coins/markets?vs_currency=usd&order=market_cap_desc&per_page={}&page=1&sparkline=true",
            self.listing_base, count
        );

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("markets listing request failed")?;

        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("markets listing returned {status}");
        }

        let entries: Vec<MarketEntry> = resp
            .json()
            .await
            .context("failed to parse markets listing")?;

        debug!(count = entries.len(), "markets listing fetched");
        Ok(entries)
    }
}
