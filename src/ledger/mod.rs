//! Ledger scheduler — the agent's long-running loop.
//!
//! One cooperative loop ticking on a short interval; each tick fires, in
//! fixed order, whichever of the three sub-tasks is due: odds refresh,
//! recommendation recording, and outcome grading. Sub-tasks are awaited
//! inline so no sub-task ever overlaps itself, and the stop flag is
//! observed at tick boundaries only — an in-flight tick always completes.

pub mod grading;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::data::{EventScore, FeedError, ScoreProvider};
use crate::ingest::OddsIngestor;
use crate::selector::TopSelector;
use crate::store::Store;
use crate::types::{BetStatus, LedgerSummary, Recommendation, Streak, StreakKind};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Loop tick interval in seconds.
    pub tick_secs: u64,
    /// How often to record new recommendations.
    pub record_interval_secs: u64,
    /// How often to grade pending bets.
    pub grade_interval_secs: u64,
    /// How often to refresh odds.
    pub odds_refresh_interval_secs: u64,
    /// Priority leagues checked for scores (1 credit each).
    pub score_leagues: Vec<String>,
    /// Cap on leagues checked per grading cycle.
    pub max_score_leagues_per_cycle: usize,
    /// Look-back window passed to the score provider, in days.
    pub score_days_from: u8,
    /// Hours after start before a resultless bet is voided as expired.
    pub result_expiry_hours: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: 30,
            record_interval_secs: 300,
            grade_interval_secs: 600,
            odds_refresh_interval_secs: 900,
            score_leagues: vec![
                "basketball_nba".to_string(),
                "soccer_epl".to_string(),
                "icehockey_nhl".to_string(),
                "soccer_spain_la_liga".to_string(),
                "soccer_germany_bundesliga".to_string(),
                "soccer_italy_serie_a".to_string(),
                "soccer_france_ligue_one".to_string(),
                "soccer_usa_mls".to_string(),
                "basketball_ncaab".to_string(),
                "americanfootball_nfl".to_string(),
                "baseball_mlb".to_string(),
                "mma_mixed_martial_arts".to_string(),
            ],
            max_score_leagues_per_cycle: 4,
            score_days_from: 3,
            result_expiry_hours: 48.0,
        }
    }
}

/// Outcome counts for one grading pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GradeSummary {
    pub won: u64,
    pub lost: u64,
    pub voided: u64,
    pub still_pending: u64,
    pub errors: u64,
    pub leagues_checked: usize,
}

impl fmt::Display for GradeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}W {}L {}V, {} pending, {} errors ({} leagues checked)",
            self.won, self.lost, self.voided, self.still_pending, self.errors,
            self.leagues_checked,
        )
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

pub struct LedgerScheduler {
    store: Store,
    selector: TopSelector,
    ingestor: OddsIngestor,
    scores: Arc<dyn ScoreProvider>,
    config: SchedulerConfig,
    last_refresh: Option<DateTime<Utc>>,
    last_record: Option<DateTime<Utc>>,
    last_grade: Option<DateTime<Utc>>,
}

impl LedgerScheduler {
    pub fn new(
        store: Store,
        selector: TopSelector,
        ingestor: OddsIngestor,
        scores: Arc<dyn ScoreProvider>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            selector,
            ingestor,
            scores,
            config,
            last_refresh: None,
            last_record: None,
            last_grade: None,
        }
    }

    /// Run until the stop flag flips. The flag is checked at tick
    /// boundaries; whatever sub-tasks a tick started run to completion
    /// before the loop exits.
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) {
        let mut ticker =
            tokio::time::interval(std::time::Duration::from_secs(self.config.tick_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            tick_secs = self.config.tick_secs,
            record_secs = self.config.record_interval_secs,
            grade_secs = self.config.grade_interval_secs,
            refresh_secs = self.config.odds_refresh_interval_secs,
            "Ledger scheduler started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if *stop.borrow() {
                        break;
                    }
                    self.tick().await;
                }
                _ = stop.changed() => {
                    break;
                }
            }
        }

        info!("Ledger scheduler stopped");
    }

    /// One tick: fire each due sub-task in fixed order. A sub-task's
    /// `last_*` marker only advances on success, so failures retry as soon
    /// as the task is due again.
    pub async fn tick(&mut self) {
        let now = Utc::now();
        let cycle = Uuid::new_v4();

        if is_due(self.last_refresh, self.config.odds_refresh_interval_secs, now) {
            match self.ingestor.refresh().await {
                Ok(report) => {
                    self.last_refresh = Some(now);
                    debug!(cycle = %cycle, events = report.events_upserted, "Odds refreshed");
                }
                Err(e) => {
                    error!(cycle = %cycle, error = %e, "Odds refresh failed — will retry");
                }
            }
        }

        if is_due(self.last_record, self.config.record_interval_secs, now) {
            match self.selector.select(None).await {
                Ok(picks) => {
                    self.last_record = Some(now);
                    if !picks.is_empty() {
                        info!(cycle = %cycle, recorded = picks.len(), "New bets recorded");
                    }
                }
                Err(e) => {
                    error!(cycle = %cycle, error = %e, "Bet recording failed — will retry");
                }
            }
        }

        if is_due(self.last_grade, self.config.grade_interval_secs, now) {
            match self.grade_pending().await {
                Ok(summary) => {
                    self.last_grade = Some(now);
                    info!(cycle = %cycle, %summary, "Grading pass complete");
                }
                Err(e) => {
                    error!(cycle = %cycle, error = %e, "Grading failed — will retry");
                }
            }
        }
    }

    // -- Grading -------------------------------------------------------------

    /// Grade every pending recommendation against the score provider.
    ///
    /// Scores are fetched for a bounded number of priority leagues;
    /// exhausted feed credits abandon the remaining leagues for the cycle,
    /// while other per-league failures just skip that league. Entries
    /// whose event started more than `result_expiry_hours` ago without a
    /// result are voided so the ledger cannot go stale forever.
    pub async fn grade_pending(&self) -> Result<GradeSummary> {
        let mut summary = GradeSummary::default();

        let mut completed: HashMap<String, EventScore> = HashMap::new();
        for league in &self.config.score_leagues {
            if summary.leagues_checked >= self.config.max_score_leagues_per_cycle {
                break;
            }
            match self
                .scores
                .completed_events(league, self.config.score_days_from)
                .await
            {
                Ok(scores) => {
                    for score in scores {
                        if score.completed {
                            completed.insert(score.external_id.clone(), score);
                        }
                    }
                    summary.leagues_checked += 1;
                }
                Err(FeedError::CreditsExhausted) => {
                    warn!(league, "Score credits exhausted — abandoning remaining leagues");
                    break;
                }
                Err(e) => {
                    error!(league, error = %e, "Score fetch failed — league skipped");
                }
            }
        }

        if completed.is_empty() {
            debug!("No completed events from scores feed");
        }

        let pending = self.store.pending_recommendations().await?;
        for rec in pending {
            if let Err(e) = self.grade_one(&rec, &completed, &mut summary).await {
                error!(rec_id = rec.id, error = %e, "Failed to grade recommendation");
                summary.errors += 1;
            }
        }

        Ok(summary)
    }

    async fn grade_one(
        &self,
        rec: &Recommendation,
        completed: &HashMap<String, EventScore>,
        summary: &mut GradeSummary,
    ) -> Result<()> {
        let Some(event) = self.store.event_by_id(rec.event_id).await? else {
            // Orphaned entry; nothing to grade against.
            return Ok(());
        };

        // Not yet gradeable.
        if !event.has_started() {
            summary.still_pending += 1;
            return Ok(());
        }

        let Some(score) = completed.get(&event.external_id) else {
            // Started but no result yet — void once it is clearly stale.
            if event.hours_since_start() > self.config.result_expiry_hours {
                self.store
                    .settle_recommendation(
                        rec.id,
                        event.id,
                        BetStatus::Void,
                        "expired - no result found",
                        Decimal::ZERO,
                    )
                    .await?;
                summary.voided += 1;
            } else {
                summary.still_pending += 1;
            }
            return Ok(());
        };

        match grading::determine_winner(score) {
            None => {
                self.store
                    .settle_recommendation(
                        rec.id,
                        event.id,
                        BetStatus::Void,
                        "no winner determined",
                        Decimal::ZERO,
                    )
                    .await?;
                summary.voided += 1;
            }
            Some(winner) => {
                if grading::selection_matches_winner(&rec.selection, &winner, &event) {
                    let actual_return = (rec.recommended_stake
                        * Decimal::from_f64(rec.recommended_odds).unwrap_or(Decimal::ONE))
                    .round_dp(2);
                    self.store
                        .settle_recommendation(
                            rec.id,
                            event.id,
                            BetStatus::Won,
                            &winner,
                            actual_return,
                        )
                        .await?;
                    summary.won += 1;
                    info!(
                        event = %event.name,
                        selection = %rec.selection,
                        payout = %actual_return,
                        "Bet won"
                    );
                } else {
                    self.store
                        .settle_recommendation(rec.id, event.id, BetStatus::Lost, &winner, Decimal::ZERO)
                        .await?;
                    summary.lost += 1;
                    info!(event = %event.name, selection = %rec.selection, winner, "Bet lost");
                }
            }
        }

        Ok(())
    }

    // -- Aggregation ---------------------------------------------------------

    /// On-demand P&L aggregation over the whole ledger.
    pub async fn ledger_summary(&self) -> Result<LedgerSummary> {
        ledger_summary(&self.store).await
    }
}

/// Whether a sub-task is due at `now`. A task that has never run is due
/// immediately.
fn is_due(last: Option<DateTime<Utc>>, interval_secs: u64, now: DateTime<Utc>) -> bool {
    match last {
        None => true,
        Some(last) => (now - last).num_seconds() >= interval_secs as i64,
    }
}

// ---------------------------------------------------------------------------
// Ledger aggregation
// ---------------------------------------------------------------------------

/// Compute the aggregate ledger view from the store.
pub async fn ledger_summary(store: &Store) -> Result<LedgerSummary> {
    let all = store.all_recommendations().await?;
    let graded_desc = store.graded_recommendations().await?;
    Ok(summarize(&all, &graded_desc))
}

/// Pure aggregation: counts, win rate and money over graded bets, and the
/// current streak scanned over graded entries most-recent-first.
pub fn summarize(all: &[Recommendation], graded_desc: &[Recommendation]) -> LedgerSummary {
    let won = all.iter().filter(|r| r.status == BetStatus::Won).count() as u64;
    let lost = all.iter().filter(|r| r.status == BetStatus::Lost).count() as u64;
    let pending = all.iter().filter(|r| r.status == BetStatus::Pending).count() as u64;
    let void = all.iter().filter(|r| r.status == BetStatus::Void).count() as u64;

    let total_staked: Decimal = all
        .iter()
        .filter(|r| r.status.is_graded())
        .map(|r| r.recommended_stake)
        .sum();
    let total_returned: Decimal = all
        .iter()
        .filter(|r| r.status.is_graded())
        .filter_map(|r| r.actual_return)
        .sum();
    let net_profit = (total_returned - total_staked).round_dp(2);

    let graded = won + lost;
    let win_rate = if graded > 0 {
        (won as f64 / graded as f64 * 10_000.0).round() / 100.0
    } else {
        0.0
    };
    let roi = if total_staked > Decimal::ZERO {
        use rust_decimal::prelude::ToPrimitive;
        let ratio = (net_profit / total_staked).to_f64().unwrap_or(0.0);
        (ratio * 10_000.0).round() / 100.0
    } else {
        0.0
    };

    LedgerSummary {
        total_bets: all.len() as u64,
        won,
        lost,
        pending,
        void,
        win_rate,
        total_staked: total_staked.round_dp(2),
        total_returned: total_returned.round_dp(2),
        net_profit,
        roi,
        streak: current_streak(graded_desc),
    }
}

/// Run of identical graded outcomes at the head of the most-recent-first
/// list.
fn current_streak(graded_desc: &[Recommendation]) -> Streak {
    let Some(first) = graded_desc.first() else {
        return Streak { kind: StreakKind::None, count: 0 };
    };

    let kind = match first.status {
        BetStatus::Won => StreakKind::Won,
        _ => StreakKind::Lost,
    };
    let count = graded_desc
        .iter()
        .take_while(|r| r.status == first.status)
        .count() as u32;

    Streak { kind, count }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
