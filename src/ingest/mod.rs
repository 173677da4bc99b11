//! Odds ingestion.
//!
//! Pulls upcoming events and bookmaker prices from the odds feed and
//! upserts them into the store: events keyed by provider id, odds stored
//! as current-line batches that supersede (never delete) older lines.
//! The whole refresh is idempotent — re-running it converges on the same
//! current state.

use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::data::{FeedError, FeedEvent, OddsFeed};
use crate::store::Store;
use crate::types::{NewEvent, NewOddsLine};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Sport keys to track, in fetch order.
    pub tracked_sports: Vec<String>,
    /// Forward window of fixtures to ingest, in days.
    pub window_days: i64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            tracked_sports: vec![
                "soccer_epl".to_string(),
                "americanfootball_nfl".to_string(),
                "basketball_nba".to_string(),
                "baseball_mlb".to_string(),
                "icehockey_nhl".to_string(),
                "mma_mixed_martial_arts".to_string(),
                "tennis_atp".to_string(),
            ],
            window_days: 7,
        }
    }
}

/// Outcome counts for one refresh pass.
#[derive(Debug, Clone, Default)]
pub struct RefreshReport {
    pub sports_checked: usize,
    pub events_upserted: usize,
    pub lines_stored: usize,
}

// ---------------------------------------------------------------------------
// Ingestor
// ---------------------------------------------------------------------------

pub struct OddsIngestor {
    feed: Arc<dyn OddsFeed>,
    store: Store,
    config: IngestConfig,
}

impl OddsIngestor {
    pub fn new(feed: Arc<dyn OddsFeed>, store: Store, config: IngestConfig) -> Self {
        Self { feed, store, config }
    }

    /// Fetch and store odds for every tracked sport.
    ///
    /// Per-sport failures are logged and skipped; exhausted feed credits
    /// abandon the remaining sports for this pass since every further
    /// request would burn a failed call.
    pub async fn refresh(&self) -> Result<RefreshReport> {
        info!(sports = self.config.tracked_sports.len(), "Refreshing odds");
        let mut report = RefreshReport::default();

        for sport_key in &self.config.tracked_sports {
            let events = match self.feed.fetch_odds(sport_key, self.config.window_days).await {
                Ok(events) => events,
                Err(FeedError::CreditsExhausted) => {
                    warn!(sport_key, "Feed credits exhausted — abandoning remaining sports");
                    break;
                }
                Err(e) => {
                    error!(sport_key, error = %e, "Odds fetch failed — sport skipped");
                    continue;
                }
            };
            report.sports_checked += 1;

            for event in &events {
                match self.store_event(event).await {
                    Ok(lines) => {
                        report.events_upserted += 1;
                        report.lines_stored += lines;
                    }
                    Err(e) => {
                        error!(
                            external_id = %event.external_id,
                            error = %e,
                            "Failed to store event odds"
                        );
                    }
                }
            }
        }

        info!(
            sports = report.sports_checked,
            events = report.events_upserted,
            lines = report.lines_stored,
            "Odds refresh complete"
        );
        Ok(report)
    }

    /// Upsert one event and replace its current odds lines.
    async fn store_event(&self, event: &FeedEvent) -> Result<usize> {
        let event_id = self
            .store
            .upsert_event(&NewEvent {
                external_id: event.external_id.clone(),
                sport_key: event.sport_key.clone(),
                sport_title: event.sport_title.clone(),
                home_team: event.home_team.clone(),
                away_team: event.away_team.clone(),
                start_time: event.commence_time,
            })
            .await?;

        let lines: Vec<NewOddsLine> = event
            .bookmakers
            .iter()
            .flat_map(|bookmaker| {
                bookmaker.markets.iter().flat_map(move |market| {
                    market.outcomes.iter().map(move |outcome| NewOddsLine {
                        bookmaker: bookmaker.name.clone(),
                        market: market.key.clone(),
                        selection: outcome.name.clone(),
                        decimal_odds: outcome.price,
                    })
                })
            })
            .collect();

        if lines.is_empty() {
            return Ok(0);
        }

        self.store.replace_current_odds(event_id, &lines).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
