//! Recommendation selection.
//!
//! One pipeline pass per invocation: pull upcoming events and their
//! current odds, derive market features, ask the ensemble for one
//! prediction per event, value every odds line, filter, rank, and record
//! the top picks as pending ledger entries with one-recommendation-per-
//! event diversity.

pub mod features;

use anyhow::Result;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::models::{EnsemblePredictor, MatchFeatures};
use crate::scoring::{
    self, FilterThresholds, ScoreWeights, DEFAULT_KELLY_FRACTION, DEFAULT_MAX_UNITS,
    DEFAULT_VIG_RATE,
};
use crate::store::Store;
use crate::types::{Candidate, Event, OddsLine, PredictionResult};
use features::{classify_selection, derive_features, MarketSnapshot, SelectionRole};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Stake sizing bounds against a fixed reference bankroll.
#[derive(Debug, Clone)]
pub struct StakeConfig {
    /// Reference bankroll in dollars.
    pub bankroll: f64,
    /// Ceiling on the stake as a fraction of the bankroll.
    pub max_stake_pct: f64,
    /// Dollar floor per bet.
    pub min_stake: f64,
    /// Dollar ceiling per bet.
    pub max_stake: f64,
}

impl Default for StakeConfig {
    fn default() -> Self {
        Self {
            bankroll: 10_000.0,
            max_stake_pct: 0.05,
            min_stake: 10.0,
            max_stake: 1_000.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SelectorConfig {
    /// Forward window for candidate events, in hours.
    pub time_window_hours: i64,
    /// Maximum picks per pass.
    pub max_picks: usize,
    /// Dedup window for (event, selection) pairs, in hours.
    pub dedup_hours: i64,
    pub thresholds: FilterThresholds,
    pub weights: ScoreWeights,
    pub stake: StakeConfig,
    /// Permissive mode: bypass the inverse filter entirely. An escape
    /// hatch for environments with no trained model yet.
    pub demo_mode: bool,
    pub vig_rate: f64,
    pub max_units: f64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            time_window_hours: 24,
            max_picks: 3,
            dedup_hours: 12,
            thresholds: FilterThresholds {
                min_confidence: 0.65,
                min_ev: 1.05,
                max_risk: 0.70,
            },
            weights: ScoreWeights::default(),
            stake: StakeConfig::default(),
            demo_mode: false,
            vig_rate: DEFAULT_VIG_RATE,
            max_units: DEFAULT_MAX_UNITS,
        }
    }
}

// ---------------------------------------------------------------------------
// Selector
// ---------------------------------------------------------------------------

/// Top-N bet selector over the event catalog.
pub struct TopSelector {
    store: Store,
    ensemble: Arc<EnsemblePredictor>,
    config: SelectorConfig,
}

impl TopSelector {
    pub fn new(store: Store, ensemble: Arc<EnsemblePredictor>, config: SelectorConfig) -> Self {
        Self { store, ensemble, config }
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    /// Run one full selection pass and record the picks.
    ///
    /// Returns the newly recorded recommendations with 1-based ranks.
    /// Candidates whose (event, selection) already has a ledger entry
    /// within the dedup window are skipped silently.
    pub async fn select(&self, sport: Option<&str>) -> Result<Vec<Candidate>> {
        let events = self
            .store
            .upcoming_events(self.config.time_window_hours, sport)
            .await?;

        if events.is_empty() {
            debug!(window_hours = self.config.time_window_hours, "No upcoming events in window");
            return Ok(Vec::new());
        }

        info!(events = events.len(), sport = sport.unwrap_or("all"), "Analyzing upcoming events");

        // Recent graded outcomes feed the streak sizing adjustment.
        let recent_results = self.store.recent_results(10).await.unwrap_or_default();

        let mut candidates: Vec<Candidate> = Vec::new();
        for event in &events {
            match self.analyze_event(event, &recent_results).await {
                Ok(mut event_candidates) => candidates.append(&mut event_candidates),
                Err(e) => {
                    // One broken event never aborts the whole pass.
                    error!(event_id = event.id, error = %e, "Event analysis failed — skipping");
                }
            }
        }

        let surviving = self.filter_candidates(candidates);
        let picks = self.rank_and_diversify(surviving);
        let recorded = self.record_picks(picks).await?;

        info!(picks = recorded.len(), "Selection pass complete");
        Ok(recorded)
    }

    // -- Pipeline stages -----------------------------------------------------

    /// Value every current odds line of one event against a single
    /// ensemble prediction.
    async fn analyze_event(
        &self,
        event: &Event,
        recent_results: &[bool],
    ) -> Result<Vec<Candidate>> {
        let lines = self.store.current_odds(event.id).await?;
        if lines.is_empty() {
            debug!(event_id = event.id, "No current odds — event skipped");
            return Ok(Vec::new());
        }

        let Some(snapshot) = MarketSnapshot::from_lines(event, &lines) else {
            debug!(event_id = event.id, "No usable prices — event skipped");
            return Ok(Vec::new());
        };

        let match_features = derive_features(&snapshot);
        // One prediction serves every line of the event.
        let prediction = self.ensemble.predict(&match_features);

        let candidates = lines
            .iter()
            .map(|line| {
                self.build_candidate(event, line, &snapshot, &match_features, &prediction, recent_results)
            })
            .collect();

        Ok(candidates)
    }

    fn build_candidate(
        &self,
        event: &Event,
        line: &OddsLine,
        snapshot: &MarketSnapshot,
        match_features: &MatchFeatures,
        prediction: &PredictionResult,
        recent_results: &[bool],
    ) -> Candidate {
        // The model predicts home-win likelihood; each line needs the
        // probability of *its own* selection. Draw lines take the fair
        // implied draw probability since the model does not predict draws.
        let probability = match classify_selection(&line.selection, event) {
            SelectionRole::Home => prediction.probability,
            SelectionRole::Draw => snapshot.fair_draw_probability(),
            SelectionRole::Away => 1.0 - prediction.probability,
        };

        let ev = scoring::ev_with_vig(probability, line.decimal_odds, self.config.vig_rate);
        let edge = ev - 1.0;
        let risk = 1.0 - probability;
        let confidence = probability;

        let base_units = scoring::unit_size(confidence, ev, risk, self.config.max_units);
        let units = if base_units > 0.0 {
            scoring::streak_adjustment(recent_results, base_units, 0.5)
        } else {
            0.0
        };

        let (stake, stake_pct) = self.size_stake(probability, line.decimal_odds, confidence);

        let composite = scoring::composite_score(confidence, ev, risk, &self.config.weights);

        let rationale = build_rationale(line, probability, confidence, edge, prediction);

        Candidate {
            event_id: event.id,
            event_name: event.name.clone(),
            sport_key: event.sport_key.clone(),
            start_time: event.start_time,
            selection: line.selection.clone(),
            market: line.market.clone(),
            bookmaker: line.bookmaker.clone(),
            recommended_odds: line.decimal_odds,
            probability,
            confidence,
            ev_with_vig: ev,
            expected_value: edge,
            risk_score: risk,
            units,
            recommended_stake: stake,
            stake_pct,
            composite_score: composite,
            rationale,
            model_breakdown: serde_json::to_value(&prediction.votes)
                .unwrap_or(serde_json::Value::Null),
            rank: None,
        }
    }

    /// Quarter-Kelly stake scaled by confidence against the reference
    /// bankroll, capped by the percentage ceiling and clamped to the
    /// configured dollar range.
    fn size_stake(&self, probability: f64, odds: f64, confidence: f64) -> (Decimal, f64) {
        let stake = &self.config.stake;

        let kelly = scoring::kelly_fraction(probability, odds, DEFAULT_KELLY_FRACTION);
        let adjusted_pct = (kelly * confidence).min(stake.max_stake_pct);

        let amount = (stake.bankroll * adjusted_pct).clamp(stake.min_stake, stake.max_stake);

        let amount = Decimal::from_f64(amount).unwrap_or(Decimal::ZERO).round_dp(2);
        let pct = (adjusted_pct * 10_000.0).round() / 100.0;
        (amount, pct)
    }

    /// Inverse-filter every candidate, unless permissive mode bypasses
    /// filtering entirely. Rejections are logged, never errors.
    fn filter_candidates(&self, candidates: Vec<Candidate>) -> Vec<Candidate> {
        if self.config.demo_mode {
            info!(candidates = candidates.len(), "Demo mode enabled — skipping filters");
            return candidates;
        }

        let total = candidates.len();
        let mut surviving = Vec::new();
        let mut rejected = 0usize;

        for candidate in candidates {
            let verdict = scoring::inverse_filter(
                candidate.confidence,
                candidate.ev_with_vig,
                candidate.risk_score,
                &self.config.thresholds,
            );
            if verdict.accepted {
                surviving.push(candidate);
            } else {
                rejected += 1;
                debug!(
                    event = %candidate.event_name,
                    selection = %candidate.selection,
                    reason = %verdict.reason,
                    "Candidate rejected"
                );
            }
        }

        info!(surviving = surviving.len(), rejected, total, "Inverse filter complete");
        surviving
    }

    /// Rank by composite score and walk the ranking taking at most one
    /// candidate per event until `max_picks`.
    fn rank_and_diversify(&self, mut candidates: Vec<Candidate>) -> Vec<Candidate> {
        candidates.sort_by(|a, b| {
            b.composite_score
                .partial_cmp(&a.composite_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut chosen_events: HashSet<i64> = HashSet::new();
        let mut picks: Vec<Candidate> = Vec::new();

        for candidate in candidates {
            if picks.len() >= self.config.max_picks {
                break;
            }
            if !chosen_events.insert(candidate.event_id) {
                continue;
            }
            picks.push(candidate);
        }

        picks
    }

    /// Persist the picks as pending ledger entries, skipping entries that
    /// would violate the dedup invariant, and assign final ranks.
    async fn record_picks(&self, picks: Vec<Candidate>) -> Result<Vec<Candidate>> {
        let mut fresh: Vec<Candidate> = Vec::new();
        for pick in picks {
            let duplicate = self
                .store
                .has_recent_recommendation(pick.event_id, &pick.selection, self.config.dedup_hours)
                .await?;
            if duplicate {
                debug!(
                    event_id = pick.event_id,
                    selection = %pick.selection,
                    "Skipping duplicate recommendation"
                );
                continue;
            }
            fresh.push(pick);
        }

        for (i, pick) in fresh.iter_mut().enumerate() {
            pick.rank = Some(i as u32 + 1);
        }

        if !fresh.is_empty() {
            self.store.insert_recommendations(&fresh).await?;
            for pick in &fresh {
                info!(
                    rank = pick.rank.unwrap_or(0),
                    event = %pick.event_name,
                    selection = %pick.selection,
                    odds = pick.recommended_odds,
                    stake = %pick.recommended_stake,
                    "Recommendation recorded"
                );
            }
        }

        Ok(fresh)
    }
}

// ---------------------------------------------------------------------------
// Rationale
// ---------------------------------------------------------------------------

/// Structured reasoning payload: confidence tier, edge tier, and the
/// market-vs-model disagreement.
fn build_rationale(
    line: &OddsLine,
    probability: f64,
    confidence: f64,
    edge: f64,
    prediction: &PredictionResult,
) -> serde_json::Value {
    let mut reasons: Vec<String> = Vec::new();

    if confidence > 0.8 {
        reasons.push("Very high win probability (>80%)".to_string());
    } else if confidence > 0.7 {
        reasons.push("High win probability (>70%)".to_string());
    }

    if edge > 0.2 {
        reasons.push(format!("Excellent expected value (+{:.1}%)", edge * 100.0));
    } else if edge > 0.1 {
        reasons.push(format!("Strong expected value (+{:.1}%)", edge * 100.0));
    } else if edge > 0.05 {
        reasons.push(format!("Positive expected value (+{:.1}%)", edge * 100.0));
    }

    let implied = line.implied_probability();
    if probability > implied * 1.2 {
        reasons.push("Significant value vs market price".to_string());
    }

    if prediction.votes.len() >= 3 {
        let avg_conf: f64 = prediction.votes.iter().map(|v| v.confidence).sum::<f64>()
            / prediction.votes.len() as f64;
        if avg_conf > 0.7 {
            reasons.push("Strong consensus across models".to_string());
        }
    }

    json!({
        "summary": format!(
            "Recommended {} bet with {:.1}% win probability",
            line.selection,
            confidence * 100.0,
        ),
        "key_reasons": reasons,
        "value_analysis": {
            "expected_value": format!("{:.2}%", edge * 100.0),
            "implied_probability": format!("{:.2}%", implied * 100.0),
            "model_probability": format!("{:.2}%", probability * 100.0),
            "edge": format!("{:.2}%", (probability - implied) * 100.0),
        },
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PredictionSource;
    use crate::types::{NewEvent, NewOddsLine, SourcePrediction};
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    struct FixedSource {
        probability: f64,
        confidence: f64,
    }

    impl PredictionSource for FixedSource {
        fn predict(&self, _features: &MatchFeatures) -> Result<SourcePrediction> {
            Ok(SourcePrediction {
                prediction: if self.probability >= 0.5 { "home" } else { "away" }.to_string(),
                confidence: self.confidence,
                probability: self.probability,
            })
        }
    }

    fn ensemble_with(probability: f64, confidence: f64) -> Arc<EnsemblePredictor> {
        let mut ensemble = EnsemblePredictor::new();
        ensemble.register("fixed", 1.0, Box::new(FixedSource { probability, confidence }));
        Arc::new(ensemble)
    }

    async fn seed_event(store: &Store, external_id: &str, lines: &[(&str, &str, f64)]) -> i64 {
        let event_id = store
            .upsert_event(&NewEvent {
                external_id: external_id.to_string(),
                sport_key: "soccer_epl".to_string(),
                sport_title: "EPL".to_string(),
                home_team: "Arsenal".to_string(),
                away_team: "Chelsea".to_string(),
                start_time: Utc::now() + Duration::hours(6),
            })
            .await
            .unwrap();

        let new_lines: Vec<NewOddsLine> = lines
            .iter()
            .map(|(bookmaker, selection, odds)| NewOddsLine {
                bookmaker: bookmaker.to_string(),
                market: "h2h".to_string(),
                selection: selection.to_string(),
                decimal_odds: *odds,
            })
            .collect();
        store.replace_current_odds(event_id, &new_lines).await.unwrap();
        event_id
    }

    fn permissive_config() -> SelectorConfig {
        SelectorConfig { demo_mode: true, ..Default::default() }
    }

    #[tokio::test]
    async fn test_no_events_returns_empty() {
        let store = Store::in_memory().await.unwrap();
        let selector = TopSelector::new(store, ensemble_with(0.6, 0.8), permissive_config());
        let picks = selector.select(None).await.unwrap();
        assert!(picks.is_empty());
    }

    #[tokio::test]
    async fn test_event_without_odds_skipped() {
        let store = Store::in_memory().await.unwrap();
        store
            .upsert_event(&NewEvent {
                external_id: "no-odds".to_string(),
                sport_key: "soccer_epl".to_string(),
                sport_title: "EPL".to_string(),
                home_team: "Arsenal".to_string(),
                away_team: "Chelsea".to_string(),
                start_time: Utc::now() + Duration::hours(6),
            })
            .await
            .unwrap();

        let selector = TopSelector::new(store, ensemble_with(0.6, 0.8), permissive_config());
        let picks = selector.select(None).await.unwrap();
        assert!(picks.is_empty());
    }

    #[tokio::test]
    async fn test_probability_mapping_per_selection() {
        let store = Store::in_memory().await.unwrap();
        seed_event(
            &store,
            "x1",
            &[
                ("draftkings", "Arsenal", 2.0),
                ("draftkings", "Chelsea", 3.8),
                ("draftkings", "Draw", 3.4),
            ],
        )
        .await;

        let config = SelectorConfig { max_picks: 10, ..permissive_config() };
        let selector = TopSelector::new(store, ensemble_with(0.7, 0.8), config);
        let picks = selector.select(None).await.unwrap();

        // Diversity allows only one pick per event even in demo mode.
        assert_eq!(picks.len(), 1);

        // The home line ranks first with p=0.7 and carries it as-is.
        let pick = &picks[0];
        assert_eq!(pick.selection, "Arsenal");
        assert!((pick.probability - 0.7).abs() < 1e-10);
        assert!((pick.risk_score - 0.3).abs() < 1e-10);
    }

    #[tokio::test]
    async fn test_draw_uses_fair_implied_probability() {
        let store = Store::in_memory().await.unwrap();
        let event_id = seed_event(
            &store,
            "x1",
            &[
                ("draftkings", "Arsenal", 2.0),
                ("draftkings", "Chelsea", 3.8),
                ("draftkings", "Draw", 3.4),
            ],
        )
        .await;

        let event = store.event_by_id(event_id).await.unwrap().unwrap();
        let lines = store.current_odds(event_id).await.unwrap();
        let snapshot = MarketSnapshot::from_lines(&event, &lines).unwrap();
        let expected_draw = snapshot.fair_draw_probability();

        let selector = TopSelector::new(
            store,
            ensemble_with(0.8, 0.8),
            SelectorConfig { max_picks: 10, ..permissive_config() },
        );
        let mf = derive_features(&snapshot);
        let prediction = selector.ensemble.predict(&mf);
        let recent: Vec<bool> = Vec::new();

        let draw_line = lines.iter().find(|l| l.selection == "Draw").unwrap();
        let candidate =
            selector.build_candidate(&event, draw_line, &snapshot, &mf, &prediction, &recent);

        assert!((candidate.probability - expected_draw).abs() < 1e-10);
        // Not the raw model output, and not its complement either.
        assert!((candidate.probability - 0.8).abs() > 0.05);
        assert!((candidate.probability - 0.2).abs() > 0.05);
    }

    #[tokio::test]
    async fn test_stake_reference_case() {
        // kelly(0.6, 2.0) = 0.05; × conf 0.6 = 3% of $10,000 = $300.
        let store = Store::in_memory().await.unwrap();
        seed_event(
            &store,
            "x1",
            &[("draftkings", "Arsenal", 2.0), ("draftkings", "Chelsea", 2.0)],
        )
        .await;

        let selector = TopSelector::new(
            store,
            ensemble_with(0.6, 0.8),
            SelectorConfig { max_picks: 10, ..permissive_config() },
        );
        let picks = selector.select(None).await.unwrap();
        let home = picks.iter().find(|p| p.selection == "Arsenal").unwrap();
        assert_eq!(home.recommended_stake, dec!(300));
        assert!((home.stake_pct - 3.0).abs() < 1e-10);
    }

    #[tokio::test]
    async fn test_stake_respects_dollar_floor() {
        // Tiny edge: kelly × confidence lands under the $10 floor.
        let store = Store::in_memory().await.unwrap();
        seed_event(
            &store,
            "x1",
            &[("draftkings", "Arsenal", 1.95), ("draftkings", "Chelsea", 1.95)],
        )
        .await;

        let selector = TopSelector::new(
            store,
            ensemble_with(0.52, 0.6),
            SelectorConfig { max_picks: 10, ..permissive_config() },
        );
        let picks = selector.select(None).await.unwrap();
        for pick in &picks {
            assert!(pick.recommended_stake >= dec!(10));
            assert!(pick.recommended_stake <= dec!(1000));
        }
    }

    #[tokio::test]
    async fn test_diversity_one_pick_per_event() {
        let store = Store::in_memory().await.unwrap();
        for i in 0..4 {
            seed_event(
                &store,
                &format!("ev-{i}"),
                &[("draftkings", "Arsenal", 2.4), ("draftkings", "Chelsea", 3.0)],
            )
            .await;
        }

        let selector =
            TopSelector::new(store, ensemble_with(0.72, 0.8), permissive_config());
        let picks = selector.select(None).await.unwrap();

        assert!(picks.len() <= 3);
        let mut event_ids: Vec<i64> = picks.iter().map(|p| p.event_id).collect();
        event_ids.sort_unstable();
        event_ids.dedup();
        assert_eq!(event_ids.len(), picks.len());
    }

    #[tokio::test]
    async fn test_selection_is_idempotent_within_dedup_window() {
        let store = Store::in_memory().await.unwrap();
        seed_event(
            &store,
            "x1",
            &[("draftkings", "Arsenal", 2.4), ("draftkings", "Chelsea", 3.0)],
        )
        .await;

        let selector =
            TopSelector::new(store.clone(), ensemble_with(0.72, 0.8), permissive_config());

        let first = selector.select(None).await.unwrap();
        assert_eq!(first.len(), 1);

        // Same pass again inside the 12h window: nothing new recorded.
        let second = selector.select(None).await.unwrap();
        assert!(second.is_empty());
        assert_eq!(store.pending_recommendations().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_filter_drops_weak_candidates() {
        let store = Store::in_memory().await.unwrap();
        seed_event(
            &store,
            "x1",
            &[("draftkings", "Arsenal", 1.9), ("draftkings", "Chelsea", 1.9)],
        )
        .await;

        // Near-coin-flip model output fails the confidence floor.
        let selector = TopSelector::new(
            store,
            ensemble_with(0.52, 0.5),
            SelectorConfig::default(),
        );
        let picks = selector.select(None).await.unwrap();
        assert!(picks.is_empty());
    }

    #[tokio::test]
    async fn test_demo_mode_bypasses_filter() {
        let store = Store::in_memory().await.unwrap();
        seed_event(
            &store,
            "x1",
            &[("draftkings", "Arsenal", 1.9), ("draftkings", "Chelsea", 1.9)],
        )
        .await;

        let selector =
            TopSelector::new(store, ensemble_with(0.52, 0.5), permissive_config());
        let picks = selector.select(None).await.unwrap();
        assert!(!picks.is_empty());
    }

    #[tokio::test]
    async fn test_ranks_are_sequential() {
        let store = Store::in_memory().await.unwrap();
        for i in 0..3 {
            seed_event(
                &store,
                &format!("ev-{i}"),
                &[("draftkings", "Arsenal", 2.4), ("draftkings", "Chelsea", 3.0)],
            )
            .await;
        }

        let selector =
            TopSelector::new(store, ensemble_with(0.72, 0.8), permissive_config());
        let picks = selector.select(None).await.unwrap();
        let ranks: Vec<u32> = picks.iter().filter_map(|p| p.rank).collect();
        assert_eq!(ranks, (1..=picks.len() as u32).collect::<Vec<_>>());

        // Picks come out ordered by composite score.
        for pair in picks.windows(2) {
            assert!(pair[0].composite_score >= pair[1].composite_score);
        }
    }

    #[tokio::test]
    async fn test_rationale_contents() {
        let store = Store::in_memory().await.unwrap();
        seed_event(
            &store,
            "x1",
            &[("draftkings", "Arsenal", 2.4), ("draftkings", "Chelsea", 3.0)],
        )
        .await;

        let selector =
            TopSelector::new(store, ensemble_with(0.72, 0.8), permissive_config());
        let picks = selector.select(None).await.unwrap();
        let rationale = &picks[0].rationale;

        assert!(rationale["summary"].as_str().unwrap().contains("Arsenal"));
        assert!(rationale["value_analysis"]["edge"].is_string());
        assert!(rationale["value_analysis"]["model_probability"].is_string());
    }
}
