// =============================================================================
// Progressive Batch Loader — bounded fan-out over the entity universe
// =============================================================================
//
// Entities are processed in ceil(N / batch_size) sequential batches.
// Within a batch, fetch-and-build runs concurrently across the batch's
// entities; each entity is wrapped so an individual failure leaves its
// prior state untouched rather than aborting the batch.  A fixed delay
// separates batches as cooperative rate limiting against the upstream.
//
// Every load runs inside a `LoadSession` carrying a generation token.
// Cancellation is cooperative and checked between batches only; merges
// are additionally gated on the token, so a batch already in flight when
// a newer load begins finds its generation stale and its results are
// discarded on arrival.
//
// Failure semantics:
//   - per-timeframe fetch failure  -> prior snapshot kept (Degraded)
//   - nothing fetched for entity   -> no upsert at all (Failed)
//   - nothing fetched for anyone   -> single operator-visible outage
//     warning; the engine keeps serving the last computed state.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::alerts::AlertDispatcher;
use crate::analysis::{
    build_snapshot, compute_score, detect_levels, simple_levels, tight_levels, Entity, SrLevel,
};
use crate::app_state::AppState;
use crate::market_data::{candles_from_hourly_closes, Candle, MarketDataSource, MarketEntry};
use crate::types::{Direction, Provenance, Timeframe};

/// Boxed future returned by [`SeriesFetcher::fetch`].
pub type SeriesFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<Candle>>> + Send + 'a>>;

/// The one seam the loader needs from the outside world: an ordered
/// candle series per (pair, timeframe).  Tests inject scripted fetchers.
pub trait SeriesFetcher: Send + Sync {
    fn fetch(&self, pair: &str, timeframe: Timeframe, limit: usize) -> SeriesFuture<'_>;
}

impl SeriesFetcher for MarketDataSource {
    fn fetch(&self, pair: &str, timeframe: Timeframe, limit: usize) -> SeriesFuture<'_> {
        let pair = pair.to_string();
        Box::pin(async move { self.fetch_series(&pair, timeframe, limit).await })
    }
}

/// A load session: the generation token every merge of this load is
/// gated on.
#[derive(Debug, Clone, Copy)]
pub struct LoadSession {
    pub generation: u64,
}

impl LoadSession {
    /// Begin a new session, superseding any load still in flight.
    pub fn begin(state: &AppState) -> Self {
        Self {
            generation: state.begin_generation(),
        }
    }
}

/// Outcome of one entity build within a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityOutcome {
    /// All timeframes fetched fresh.
    Fresh,
    /// Some timeframes kept their prior snapshot.
    Degraded { stale_timeframes: Vec<Timeframe> },
    /// Nothing could be fetched; prior state untouched.
    Failed,
}

/// Summary of one completed (or cancelled) load cycle.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub generation: u64,
    pub processed: usize,
    pub total: usize,
    pub fresh: usize,
    pub degraded: usize,
    pub failed: usize,
    pub cancelled: bool,
    /// True when not a single entity fetched anything.
    pub outage: bool,
}

/// The progressive batch loader.
pub struct BatchLoader<F: SeriesFetcher> {
    state: Arc<AppState>,
    fetcher: Arc<F>,
    alerts: Option<Arc<AlertDispatcher>>,
}

impl<F: SeriesFetcher + 'static> BatchLoader<F> {
    pub fn new(state: Arc<AppState>, fetcher: Arc<F>) -> Self {
        Self {
            state,
            fetcher,
            alerts: None,
        }
    }

    /// Attach the outbound alert dispatcher.
    pub fn with_alerts(mut self, alerts: Arc<AlertDispatcher>) -> Self {
        self.alerts = Some(alerts);
        self
    }

    /// Run one load cycle over `symbols` under `session`.
    ///
    /// Batches are applied in submission order; within a batch,
    /// completion order across entities is unordered and merges are
    /// idempotent per-entity upserts.
    pub async fn run(&self, session: LoadSession, symbols: Vec<String>) -> LoadReport {
        let (batch_size, batch_delay_ms, candle_limit) = {
            let config = self.state.runtime_config.read();
            (
                config.batch_size.max(1),
                config.batch_delay_ms,
                config.candle_limit,
            )
        };

        let total = symbols.len();
        let mut report = LoadReport {
            generation: session.generation,
            total,
            ..LoadReport::default()
        };

        for (batch_index, chunk) in symbols.chunks(batch_size).enumerate() {
            // Inter-batch delay first, then the cancellation check: a
            // supersede during the pause takes effect before any new
            // fetches start.
            if batch_index > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(batch_delay_ms)).await;
            }
            if !self.state.is_current(session.generation) {
                report.cancelled = true;
                info!(
                    generation = session.generation,
                    processed = report.processed,
                    "load superseded — stopping at batch boundary"
                );
                break;
            }

            let results = join_all(
                chunk
                    .iter()
                    .map(|symbol| self.load_entity(symbol, candle_limit)),
            )
            .await;

            for (entity, outcome) in results {
                match outcome {
                    EntityOutcome::Failed => {
                        report.failed += 1;
                    }
                    outcome => {
                        if let Some(entity) = entity {
                            // Gated merge: a stale generation discards the
                            // result on arrival.
                            let applied =
                                self.state.upsert_entity(session.generation, entity.clone());
                            if applied {
                                if let Some(alerts) = &self.alerts {
                                    alerts.maybe_alert(&entity);
                                }
                            }
                        }
                        match outcome {
                            EntityOutcome::Fresh => report.fresh += 1,
                            EntityOutcome::Degraded { .. } => report.degraded += 1,
                            EntityOutcome::Failed => unreachable!(),
                        }
                    }
                }
            }

            report.processed += chunk.len();
            self.state
                .record_progress(session.generation, report.processed, total, false);
        }

        if !report.cancelled {
            self.state
                .record_progress(session.generation, report.processed, total, true);
        }

        report.outage = total > 0 && report.failed == report.processed && !report.cancelled;
        if report.outage {
            warn!(
                generation = session.generation,
                total, "no entity could be fetched — upstream outage"
            );
            self.state.set_outage_warning(Some(format!(
                "market data source unreachable ({total} entities, none fetched)"
            )));
        } else if report.fresh + report.degraded > 0 {
            self.state.set_outage_warning(None);
        }

        info!(
            generation = report.generation,
            fresh = report.fresh,
            degraded = report.degraded,
            failed = report.failed,
            cancelled = report.cancelled,
            "load cycle complete"
        );
        report
    }

    /// Fetch and rebuild one entity.  Never fails the batch: errors
    /// degrade to the prior per-timeframe snapshots.
    async fn load_entity(&self, symbol: &str, candle_limit: usize) -> (Option<Entity>, EntityOutcome) {
        let mut entity = match self.state.entity(symbol) {
            Some(e) => e,
            // Symbol vanished from the universe mid-cycle; nothing to do.
            None => return (None, EntityOutcome::Failed),
        };

        let mut series_by_tf: HashMap<Timeframe, Vec<Candle>> = HashMap::new();
        let mut stale_timeframes = Vec::new();

        for timeframe in Timeframe::ALL {
            match self.fetcher.fetch(symbol, timeframe, candle_limit).await {
                Ok(candles) => {
                    entity.snapshots.insert(timeframe, build_snapshot(&candles));
                    series_by_tf.insert(timeframe, candles);
                }
                Err(e) => {
                    // Transient failure or malformed shape: keep whatever
                    // snapshot this timeframe had before.
                    debug!(symbol, timeframe = %timeframe, error = %e, "fetch failed — keeping prior snapshot");
                    stale_timeframes.push(timeframe);
                }
            }
        }

        if series_by_tf.is_empty() {
            return (None, EntityOutcome::Failed);
        }

        // Freshest price: last close of the shortest fetched timeframe.
        for timeframe in Timeframe::ALL {
            if let Some(candles) = series_by_tf.get(&timeframe) {
                if let Some(last) = candles.last() {
                    entity.price = last.close;
                }
                break;
            }
        }

        self.rescore(&mut entity, &series_by_tf);
        entity.updated_at = Utc::now().timestamp_millis();

        let outcome = if stale_timeframes.is_empty() {
            EntityOutcome::Fresh
        } else {
            EntityOutcome::Degraded { stale_timeframes }
        };
        (Some(entity), outcome)
    }

    /// Recompute score, signal and trade levels from the entity's
    /// current snapshot set and the freshly fetched series.
    fn rescore(&self, entity: &mut Entity, series_by_tf: &HashMap<Timeframe, Vec<Candle>>) {
        let (short, medium, long) = (
            entity.snapshots.get(&Timeframe::M15),
            entity.snapshots.get(&Timeframe::H1),
            entity.snapshots.get(&Timeframe::H4),
        );

        let (short, medium, long) = match (short, medium, long) {
            (Some(s), Some(m), Some(l)) => (s, m, l),
            // Not all timeframes have ever produced a snapshot: the
            // entity stays pending.
            _ => return,
        };

        let breakdown = compute_score(short, medium, long, entity.price);
        entity.score = Some(breakdown.score);
        entity.signal = breakdown.signal;

        // Levels from the medium timeframe's candles, snapped against the
        // clustered S/R of the medium and long windows.
        if let Some(h1_candles) = series_by_tf.get(&Timeframe::H1) {
            let mut sr: Vec<SrLevel> = detect_levels(h1_candles, entity.price, Timeframe::H1);
            if let Some(h4_candles) = series_by_tf.get(&Timeframe::H4) {
                sr.extend(detect_levels(h4_candles, entity.price, Timeframe::H4));
            }

            let direction = breakdown.signal.direction().unwrap_or(Direction::Long);
            let atr = medium.atr;
            entity.trade_levels = Some(simple_levels(entity.price, atr, direction));
            entity.tight_levels = Some(tight_levels(h1_candles, entity.price, direction, &sr));
            entity.sr_levels = sr;
        }

        entity.breakdown = Some(breakdown);
        entity.mark_provenance(Provenance::Authoritative);
    }
}

// =============================================================================
// Universe seeding from the coarse listing
// =============================================================================

/// Build the entity universe from a markets listing.  Entities with an
/// hourly close series get an approximate analysis immediately; the rest
/// start pending.  Provenance stays `Approximate` either way.
pub fn seed_entities(entries: &[MarketEntry], now_ms: i64) -> Vec<Entity> {
    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let rank = entry.market_cap_rank.unwrap_or(index as u32 + 1);
            let mut entity = Entity::pending(entry.pair(), entry.name.clone(), rank);
            entity.price = entry.current_price;
            entity.change_24h_pct = entry.price_change_percentage_24h.unwrap_or(0.0);
            entity.volume_24h = entry.total_volume;
            entity.market_cap = entry.market_cap;
            entity.updated_at = now_ms;

            let hourly = entry.hourly_closes();
            if !hourly.is_empty() {
                let candles = candles_from_hourly_closes(hourly, entry.total_volume, now_ms);
                let snapshot = build_snapshot(&candles);
                // The coarse series carries no per-timeframe resolution:
                // the one approximate snapshot stands in for all three
                // until authoritative data lands.
                for timeframe in Timeframe::ALL {
                    entity.snapshots.insert(timeframe, snapshot.clone());
                }
                let breakdown =
                    compute_score(&snapshot, &snapshot, &snapshot, entity.price);
                entity.score = Some(breakdown.score);
                entity.signal = breakdown.signal;
                entity.breakdown = Some(breakdown);
            }
            entity
        })
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime_config::RuntimeConfig;
    use crate::types::Signal;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted fetcher: serves a synthetic rising series, optionally
    /// failing specific symbols or timeframes.
    struct ScriptedFetcher {
        calls: AtomicUsize,
        fail_symbols: Vec<String>,
        fail_timeframes: Vec<Timeframe>,
        fail_all: bool,
    }

    impl ScriptedFetcher {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_symbols: Vec::new(),
                fail_timeframes: Vec::new(),
                fail_all: false,
            }
        }

        fn rising_series(n: usize) -> Vec<Candle> {
            (0..n)
                .map(|i| {
                    let close = 100.0 + i as f64;
                    Candle {
                        open_time: i as i64 * 900_000,
                        open: close - 0.5,
                        high: close + 1.0,
                        low: close - 1.0,
                        close,
                        volume: 50.0,
                    }
                })
                .collect()
        }
    }

    impl SeriesFetcher for ScriptedFetcher {
        fn fetch(&self, pair: &str, timeframe: Timeframe, _limit: usize) -> SeriesFuture<'_> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let fail = self.fail_all
                || self.fail_symbols.iter().any(|s| s == pair)
                || self.fail_timeframes.contains(&timeframe);
            Box::pin(async move {
                if fail {
                    anyhow::bail!("scripted failure");
                }
                Ok(Self::rising_series(120))
            })
        }
    }

    fn test_state(batch_delay_ms: u64) -> Arc<AppState> {
        let config = RuntimeConfig {
            batch_delay_ms,
            ..RuntimeConfig::default()
        };
        Arc::new(AppState::new(config))
    }

    fn seed_pending(state: &AppState, session: LoadSession, count: usize) -> Vec<String> {
        let entities: Vec<Entity> = (0..count)
            .map(|i| Entity::pending(format!("SYM{i}USDT"), format!("Sym {i}"), i as u32 + 1))
            .collect();
        let symbols: Vec<String> = entities.iter().map(|e| e.symbol.clone()).collect();
        assert!(state.seed_universe(session.generation, entities));
        symbols
    }

    #[tokio::test]
    async fn full_cycle_loads_every_entity() {
        let state = test_state(0);
        let session = LoadSession::begin(&state);
        let symbols = seed_pending(&state, session, 7);

        let fetcher = Arc::new(ScriptedFetcher::new());
        let loader = BatchLoader::new(state.clone(), fetcher.clone());
        let report = loader.run(session, symbols).await;

        assert_eq!(report.processed, 7);
        assert_eq!(report.fresh, 7);
        assert_eq!(report.failed, 0);
        assert!(!report.cancelled);
        assert!(!report.outage);
        // 7 entities x 3 timeframes.
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 21);

        let map = state.entities.read();
        for entity in map.values() {
            assert_eq!(entity.provenance, Provenance::Authoritative);
            assert!(entity.score.is_some());
            assert_ne!(entity.signal, Signal::Pending);
            assert_eq!(entity.snapshots.len(), 3);
            assert!(entity.trade_levels.is_some());
            assert!(entity.tight_levels.is_some());
        }
        assert!(state.load_progress.read().finished);
    }

    #[tokio::test]
    async fn cancellation_between_batches_preserves_unloaded_entities() {
        // 12 entities, batch size 5 => batches of (5, 5, 2).  Cancelling
        // after batch 1 completes but before batch 2 starts must leave
        // entities 6-12 in their pre-load state.
        let state = test_state(200);
        let session = LoadSession::begin(&state);
        let symbols = seed_pending(&state, session, 12);

        let fetcher = Arc::new(ScriptedFetcher::new());
        let loader = Arc::new(BatchLoader::new(state.clone(), fetcher.clone()));

        let run_state = state.clone();
        let run_loader = loader.clone();
        let run_symbols = symbols.clone();
        let handle = tokio::spawn(async move { run_loader.run(session, run_symbols).await });

        // Wait for batch 1 to be applied, then supersede during the
        // inter-batch delay.
        loop {
            if run_state.load_progress.read().processed >= 5 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
        state.cancel_active_load();

        let report = handle.await.expect("loader task");
        assert!(report.cancelled);
        assert_eq!(report.processed, 5);
        // Only batch 1 was fetched: 5 entities x 3 timeframes.
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 15);

        let map = state.entities.read();
        let loaded = map.values().filter(|e| e.score.is_some()).count();
        let pending = map
            .values()
            .filter(|e| e.signal == Signal::Pending)
            .count();
        assert_eq!(loaded, 5);
        assert_eq!(pending, 7, "entities 6-12 must retain their pre-load state");
    }

    #[tokio::test]
    async fn stale_session_merges_nothing() {
        let state = test_state(0);
        let stale = LoadSession::begin(&state);
        let symbols = seed_pending(&state, stale, 4);
        // A newer load supersedes before the stale one starts.
        let _newer = LoadSession::begin(&state);

        let fetcher = Arc::new(ScriptedFetcher::new());
        let loader = BatchLoader::new(state.clone(), fetcher.clone());
        let report = loader.run(stale, symbols).await;

        assert!(report.cancelled);
        assert_eq!(report.processed, 0);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        for entity in state.entities.read().values() {
            assert_eq!(entity.signal, Signal::Pending);
        }
    }

    #[tokio::test]
    async fn per_timeframe_failure_degrades_gracefully() {
        let state = test_state(0);
        let session = LoadSession::begin(&state);
        let symbols = seed_pending(&state, session, 2);

        let fetcher = Arc::new(ScriptedFetcher {
            fail_timeframes: vec![Timeframe::H4],
            ..ScriptedFetcher::new()
        });
        let loader = BatchLoader::new(state.clone(), fetcher);
        let report = loader.run(session, symbols).await;

        assert_eq!(report.degraded, 2);
        assert_eq!(report.failed, 0);
        assert!(!report.outage);

        // With no prior H4 snapshot the entities cannot be scored yet,
        // so they stay pending and approximate.
        for entity in state.entities.read().values() {
            assert_eq!(entity.snapshots.len(), 2);
            assert_eq!(entity.signal, Signal::Pending);
            assert_eq!(entity.provenance, Provenance::Approximate);
        }
    }

    #[tokio::test]
    async fn degraded_timeframe_keeps_prior_snapshot() {
        let state = test_state(0);

        // Cycle 1: everything loads.
        let session = LoadSession::begin(&state);
        let symbols = seed_pending(&state, session, 1);
        let loader = BatchLoader::new(state.clone(), Arc::new(ScriptedFetcher::new()));
        loader.run(session, symbols.clone()).await;
        let before = state.entity("SYM0USDT").expect("loaded");
        assert_eq!(before.snapshots.len(), 3);

        // Cycle 2 over the same universe: H4 fetches fail; the prior H4
        // snapshot must survive and scoring continues.
        let session2 = LoadSession { generation: state.begin_generation() };
        let loader2 = BatchLoader::new(
            state.clone(),
            Arc::new(ScriptedFetcher {
                fail_timeframes: vec![Timeframe::H4],
                ..ScriptedFetcher::new()
            }),
        );
        let report = loader2.run(session2, symbols).await;
        assert_eq!(report.degraded, 1);

        let after = state.entity("SYM0USDT").expect("still there");
        assert_eq!(after.snapshots.len(), 3, "prior H4 snapshot retained");
        assert!(after.score.is_some());
        assert_eq!(after.provenance, Provenance::Authoritative);
    }

    #[tokio::test]
    async fn total_outage_sets_single_warning_and_keeps_state() {
        let state = test_state(0);
        let session = LoadSession::begin(&state);
        let symbols = seed_pending(&state, session, 3);

        let fetcher = Arc::new(ScriptedFetcher {
            fail_all: true,
            ..ScriptedFetcher::new()
        });
        let loader = BatchLoader::new(state.clone(), fetcher);
        let report = loader.run(session, symbols).await;

        assert!(report.outage);
        assert_eq!(report.failed, 3);
        assert!(state.outage_warning.read().is_some());
        for entity in state.entities.read().values() {
            assert_eq!(entity.signal, Signal::Pending);
        }
    }

    #[tokio::test]
    async fn recovery_clears_outage_warning() {
        let state = test_state(0);
        state.set_outage_warning(Some("market data source unreachable".into()));

        let session = LoadSession::begin(&state);
        let symbols = seed_pending(&state, session, 1);
        let loader = BatchLoader::new(state.clone(), Arc::new(ScriptedFetcher::new()));
        loader.run(session, symbols).await;

        assert!(state.outage_warning.read().is_none());
    }

    // ---- seeding -----------------------------------------------------------

    #[test]
    fn seed_entities_with_sparkline_get_approximate_analysis() {
        let entry: MarketEntry = serde_json::from_str(
            r#"{
                "symbol": "btc", "name": "Bitcoin", "market_cap_rank": 1,
                "current_price": 120.0, "total_volume": 5000.0,
                "price_change_percentage_24h": 2.5,
                "sparkline_in_7d": { "price": [100.0, 101.0, 102.0, 103.0, 104.0,
                    105.0, 106.0, 107.0, 108.0, 109.0, 110.0, 111.0, 112.0, 113.0,
                    114.0, 115.0, 116.0, 117.0, 118.0, 119.0, 120.0] }
            }"#,
        )
        .unwrap();

        let entities = seed_entities(&[entry], 1_700_000_000_000);
        assert_eq!(entities.len(), 1);
        let e = &entities[0];
        assert_eq!(e.symbol, "BTCUSDT");
        assert_eq!(e.rank, 1);
        assert_eq!(e.provenance, Provenance::Approximate);
        assert!(e.score.is_some());
        assert_ne!(e.signal, Signal::Pending);
        assert_eq!(e.snapshots.len(), 3);
    }

    #[test]
    fn seed_entities_without_sparkline_stay_pending() {
        let entry: MarketEntry =
            serde_json::from_str(r#"{"symbol": "new", "name": "Newcoin"}"#).unwrap();
        let entities = seed_entities(&[entry], 0);
        assert_eq!(entities[0].signal, Signal::Pending);
        assert_eq!(entities[0].score, None);
        assert!(entities[0].snapshots.is_empty());
        // Rank falls back to the listing position.
        assert_eq!(entities[0].rank, 1);
    }
}
