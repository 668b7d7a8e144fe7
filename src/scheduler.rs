// =============================================================================
// Refresh Scheduler — owns the periodic scan cycle
// =============================================================================
//
// An explicit scheduler abstraction, independent of any rendering
// concern: each cycle begins a new load session (which supersedes any
// load still in flight via the generation token), rebuilds the entity
// universe from the markets listing, then runs the batch loader over it.
// Between cycles it sleeps for the configured interval or wakes early on
// a manual trigger from the API.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::app_state::AppState;
use crate::loader::{seed_entities, BatchLoader, LoadSession, SeriesFetcher};

/// Drives refresh cycles until the process shuts down.
pub struct RefreshScheduler<F: SeriesFetcher + 'static> {
    state: Arc<AppState>,
    loader: BatchLoader<F>,
}

impl<F: SeriesFetcher + 'static> RefreshScheduler<F> {
    pub fn new(state: Arc<AppState>, loader: BatchLoader<F>) -> Self {
        Self { state, loader }
    }

    /// Run forever: cycle, then wait for the interval or a manual
    /// trigger, whichever comes first.
    pub async fn run(self) {
        loop {
            self.run_cycle().await;

            let interval_secs = self.state.runtime_config.read().refresh_interval_secs;
            tokio::select! {
                _ = tokio::time::sleep(std::time::Duration::from_secs(interval_secs)) => {
                    debug!("periodic refresh due");
                }
                _ = self.state.refresh_trigger.notified() => {
                    info!("manual refresh triggered");
                }
            }
        }
    }

    /// One full scan cycle.
    pub async fn run_cycle(&self) {
        let session = LoadSession::begin(&self.state);
        let universe_size = self.state.runtime_config.read().universe_size;

        let symbols = match self.state.source.fetch_markets(universe_size).await {
            Ok(entries) => {
                let entities = seed_entities(&entries, Utc::now().timestamp_millis());
                let symbols: Vec<String> = entities.iter().map(|e| e.symbol.clone()).collect();
                if !self.state.seed_universe(session.generation, entities) {
                    // Superseded while seeding; the newer cycle owns the map.
                    return;
                }
                symbols
            }
            Err(e) => {
                warn!(error = %e, "markets listing failed — rescanning existing universe");
                self.state.push_error(format!("markets listing failed: {e}"));

                // Degrade: keep scanning the entities we already have.
                let map = self.state.entities.read();
                let mut ranked: Vec<(u32, String)> =
                    map.values().map(|e| (e.rank, e.symbol.clone())).collect();
                ranked.sort_by_key(|(rank, _)| *rank);
                ranked.into_iter().map(|(_, symbol)| symbol).collect()
            }
        };

        if symbols.is_empty() {
            warn!("no entities to scan this cycle");
            return;
        }

        info!(
            generation = session.generation,
            entities = symbols.len(),
            "refresh cycle starting"
        );
        self.loader.run(session, symbols).await;
    }
}
