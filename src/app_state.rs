// =============================================================================
// Central Application State — Meridian scanner
// =============================================================================
//
// The single source of truth for the scanner.  The entity map is the only
// mutable shared resource: the loader upserts entities by identity key so
// unrelated rows never block each other, and the API reads consistent
// per-entity records.
//
// Thread safety:
//   - Atomic counters for lock-free version and generation tracking.
//   - parking_lot::RwLock for all mutable shared collections.
//
// Generation tokens: every load session captures `active_generation` at
// start.  A refresh (periodic or manual) bumps the counter, so any batch
// still in flight from a superseded session fails its generation check
// and its results are discarded on arrival.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;

use crate::analysis::Entity;
use crate::market_data::MarketDataSource;
use crate::runtime_config::RuntimeConfig;
use crate::types::{Light, Provenance, Signal, Timeframe};

/// Maximum number of recent errors to retain.
const MAX_RECENT_ERRORS: usize = 50;

/// A recorded error event for the status feed.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub message: String,
    /// ISO 8601 timestamp.
    pub at: String,
}

/// Progress of the currently active load cycle.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct LoadProgress {
    pub generation: u64,
    pub processed: usize,
    pub total: usize,
    pub finished: bool,
}

/// Central application state shared across all async tasks via
/// `Arc<AppState>`.
pub struct AppState {
    /// Monotonically increasing version counter, incremented on every
    /// meaningful mutation.  The WebSocket feed polls this to detect
    /// changes.
    pub state_version: AtomicU64,

    /// Generation token of the currently active load cycle.
    active_generation: AtomicU64,

    pub runtime_config: Arc<RwLock<RuntimeConfig>>,
    pub source: Arc<MarketDataSource>,

    /// The shared entity list, keyed by symbol.
    pub entities: RwLock<HashMap<String, Entity>>,

    pub load_progress: RwLock<LoadProgress>,

    /// Set when no entity could be fetched at all during a cycle;
    /// cleared on the next successful cycle.
    pub outage_warning: RwLock<Option<String>>,

    pub recent_errors: RwLock<Vec<ErrorRecord>>,

    /// Woken by the API to request an immediate refresh cycle.
    pub refresh_trigger: tokio::sync::Notify,

    pub start_time: std::time::Instant,
}

impl AppState {
    /// Construct the state from the given runtime configuration.
    pub fn new(config: RuntimeConfig) -> Self {
        let source = Arc::new(MarketDataSource::new(
            config.klines_base.clone(),
            config.listing_base.clone(),
        ));

        Self {
            state_version: AtomicU64::new(1),
            active_generation: AtomicU64::new(0),
            runtime_config: Arc::new(RwLock::new(config)),
            source,
            entities: RwLock::new(HashMap::new()),
            load_progress: RwLock::new(LoadProgress::default()),
            outage_warning: RwLock::new(None),
            recent_errors: RwLock::new(Vec::new()),
            refresh_trigger: tokio::sync::Notify::new(),
            start_time: std::time::Instant::now(),
        }
    }

    // ── Version management ──────────────────────────────────────────────

    /// Atomically increment the state version.
    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    /// Read the current state version.
    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    // ── Generation tokens ───────────────────────────────────────────────

    /// Begin a new load cycle: bump the generation, superseding any load
    /// still in flight, and return the new token.
    pub fn begin_generation(&self) -> u64 {
        let generation = self.active_generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.load_progress.write() = LoadProgress {
            generation,
            ..LoadProgress::default()
        };
        self.increment_version();
        generation
    }

    /// The currently active generation.
    pub fn current_generation(&self) -> u64 {
        self.active_generation.load(Ordering::SeqCst)
    }

    /// Whether `generation` is still the active one.
    pub fn is_current(&self, generation: u64) -> bool {
        self.current_generation() == generation
    }

    /// Request cancellation of the active load without starting a new
    /// one.  Takes effect at the next batch boundary.
    pub fn cancel_active_load(&self) -> u64 {
        self.active_generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    // ── Entity map ──────────────────────────────────────────────────────

    /// Replace the entity universe for a new cycle.  A no-op when the
    /// generation is stale.
    pub fn seed_universe(&self, generation: u64, entities: Vec<Entity>) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        let mut map = self.entities.write();
        *map = entities
            .into_iter()
            .map(|e| (e.symbol.clone(), e))
            .collect();
        drop(map);
        self.increment_version();
        true
    }

    /// Identity-keyed upsert of one entity, gated on the generation
    /// token.  Returns `false` (and changes nothing) when the result is
    /// stale.  Re-applying the same record is a no-op for readers.
    pub fn upsert_entity(&self, generation: u64, entity: Entity) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        self.entities.write().insert(entity.symbol.clone(), entity);
        self.increment_version();
        true
    }

    /// Clone one entity by symbol.
    pub fn entity(&self, symbol: &str) -> Option<Entity> {
        self.entities.read().get(symbol).cloned()
    }

    // ── Progress / errors ───────────────────────────────────────────────

    /// Advance the progress counter after a batch, gated on generation.
    pub fn record_progress(&self, generation: u64, processed: usize, total: usize, finished: bool) {
        if !self.is_current(generation) {
            return;
        }
        *self.load_progress.write() = LoadProgress {
            generation,
            processed,
            total,
            finished,
        };
        self.increment_version();
    }

    /// Record an error message.  The ring buffer is capped at
    /// [`MAX_RECENT_ERRORS`].
    pub fn push_error(&self, message: String) {
        let record = ErrorRecord {
            message,
            at: Utc::now().to_rfc3339(),
        };
        let mut errors = self.recent_errors.write();
        errors.push(record);
        while errors.len() > MAX_RECENT_ERRORS {
            errors.remove(0);
        }
        drop(errors);
        self.increment_version();
    }

    /// Set or clear the total-outage warning.
    pub fn set_outage_warning(&self, warning: Option<String>) {
        *self.outage_warning.write() = warning;
        self.increment_version();
    }

    // ── Snapshot builder ────────────────────────────────────────────────

    /// Build the serialisable table snapshot for the display surface.
    pub fn table_snapshot(&self) -> TableSnapshot {
        let entities = self.entities.read();

        let mut rows: Vec<TableRow> = entities.values().map(TableRow::from_entity).collect();
        rows.sort_by_key(|r| r.rank);

        let progress = *self.load_progress.read();
        let status = StatusSnapshot {
            generation: progress.generation,
            processed: progress.processed,
            total: progress.total,
            loading: !progress.finished && progress.total > 0,
            outage_warning: self.outage_warning.read().clone(),
            used_weight: self.source.used_weight(),
            uptime_secs: self.start_time.elapsed().as_secs(),
        };

        TableSnapshot {
            state_version: self.current_state_version(),
            server_time: Utc::now().timestamp_millis(),
            rows,
            status,
        }
    }
}

// =============================================================================
// Serialisable snapshot types
// =============================================================================

/// Full table snapshot sent to the display surface.
#[derive(Debug, Clone, Serialize)]
pub struct TableSnapshot {
    pub state_version: u64,
    pub server_time: i64,
    pub rows: Vec<TableRow>,
    pub status: StatusSnapshot,
}

/// Operational status for the dashboard banner.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub generation: u64,
    pub processed: usize,
    pub total: usize,
    pub loading: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outage_warning: Option<String>,
    pub used_weight: u32,
    pub uptime_secs: u64,
}

/// One row of the scanner table.
#[derive(Debug, Clone, Serialize)]
pub struct TableRow {
    pub symbol: String,
    pub name: String,
    pub rank: u32,
    pub price: f64,
    pub change_24h_pct: f64,
    pub lights: HashMap<Timeframe, Light>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub signal: Signal,
    /// H1 RSI, shown in the table.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rsi: Option<f64>,
    /// H1 MACD bullish agreement.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub macd_bullish: Option<bool>,
    /// Whether the price sits above the H4 slow EMA.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub above_long_ema: Option<bool>,
    pub provenance: Provenance,
}

impl TableRow {
    fn from_entity(entity: &Entity) -> Self {
        let lights = entity
            .snapshots
            .iter()
            .map(|(tf, snap)| (*tf, snap.light))
            .collect();

        let h1 = entity.snapshots.get(&Timeframe::H1);
        let h4 = entity.snapshots.get(&Timeframe::H4);

        Self {
            symbol: entity.symbol.clone(),
            name: entity.name.clone(),
            rank: entity.rank,
            price: entity.price,
            change_24h_pct: entity.change_24h_pct,
            lights,
            score: entity.score,
            signal: entity.signal,
            rsi: h1.map(|s| s.rsi),
            macd_bullish: h1.map(|s| s.macd_bullish()),
            above_long_ema: h4.map(|s| entity.price > s.ema_long),
            provenance: entity.provenance,
        }
    }
}
