//! Prediction sources and the ensemble aggregator.
//!
//! Defines the `PredictionSource` capability trait, the strongly-typed
//! feature vector every source consumes, and `EnsemblePredictor`, which
//! combines weighted sources into one consensus per event. Prediction is
//! pure computation — no I/O, no suspension points — so the trait is
//! synchronous and an `EnsemblePredictor` is safely shareable once its
//! sources are registered.

pub mod baseline;

use anyhow::Result;
use tracing::{debug, warn};

use crate::types::{PredictionResult, SourcePrediction, SourceVote};

/// Placeholder decimal odds for the convenience EV on a consensus.
/// Callers needing accurate EV use the scoring module with real odds.
const DEFAULT_ODDS_PLACEHOLDER: f64 = 2.0;

// ---------------------------------------------------------------------------
// Feature vector
// ---------------------------------------------------------------------------

/// Market-derived features for one fixture.
///
/// Every field is computed from current bookmaker prices alone: fair
/// (vig-free) implied probabilities, cross-bookmaker dispersion, and the
/// proxies derived from them. No external statistics feed is required.
#[derive(Debug, Clone, Default)]
pub struct MatchFeatures {
    /// Mean decimal odds per selection across bookmakers.
    pub home_odds: f64,
    pub away_odds: f64,
    /// None for two-outcome sports.
    pub draw_odds: Option<f64>,

    /// Fair implied probabilities (normalized to sum to 1).
    pub home_implied: f64,
    pub away_implied: f64,
    pub draw_implied: f64,

    /// Implied win-rate proxies.
    pub home_win_rate: f64,
    pub away_win_rate: f64,

    /// Recent-form proxies (0–1, 0.5 = neutral).
    pub home_recent_form: f64,
    pub away_recent_form: f64,

    /// Head-to-head proxy, split by relative implied strength.
    pub h2h_home_wins: u32,
    pub h2h_away_wins: u32,
    pub h2h_draws: u32,

    /// Ranking proxies (lower is stronger, 50 = neutral).
    pub home_ranking: f64,
    pub away_ranking: f64,
    pub ranking_difference: f64,

    /// Venue advantage proxy in probability points.
    pub venue_advantage: f64,

    /// Population std-dev of each selection's odds across bookmakers.
    pub home_odds_dispersion: f64,
    pub away_odds_dispersion: f64,

    pub bookmaker_count: u32,
}

// ---------------------------------------------------------------------------
// Prediction source
// ---------------------------------------------------------------------------

/// Abstraction over prediction models.
///
/// A source that errors is simply absent from the current consensus —
/// the aggregator never propagates source failures.
pub trait PredictionSource: Send + Sync {
    fn predict(&self, features: &MatchFeatures) -> Result<SourcePrediction>;
}

// ---------------------------------------------------------------------------
// Ensemble
// ---------------------------------------------------------------------------

struct RegisteredSource {
    name: String,
    weight: f64,
    source: Box<dyn PredictionSource>,
}

/// Weighted voting ensemble over registered prediction sources.
///
/// Registration order is significant: consensus-label ties break toward
/// the first-registered source's vote. After registration the predictor
/// is read-only and can be shared across concurrent callers.
#[derive(Default)]
pub struct EnsemblePredictor {
    sources: Vec<RegisteredSource>,
}

impl EnsemblePredictor {
    pub fn new() -> Self {
        Self { sources: Vec::new() }
    }

    /// Register a named source with a relative weight. Weights need not
    /// sum to 1 — they are re-proportioned over responding sources at
    /// prediction time.
    pub fn register(&mut self, name: impl Into<String>, weight: f64, source: Box<dyn PredictionSource>) {
        let name = name.into();
        debug!(source = %name, weight, "Prediction source registered");
        self.sources.push(RegisteredSource { name, weight, source });
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Consensus prediction for one fixture.
    ///
    /// Sources that fail are logged and skipped; if none succeed the
    /// defined "unknown" fallback is returned instead of an error.
    pub fn predict(&self, features: &MatchFeatures) -> PredictionResult {
        let mut responders: Vec<(&RegisteredSource, SourcePrediction)> = Vec::new();

        for reg in &self.sources {
            match reg.source.predict(features) {
                Ok(pred) => responders.push((reg, pred)),
                Err(e) => {
                    warn!(source = %reg.name, error = %e, "Prediction source failed — excluded from consensus");
                }
            }
        }

        if responders.is_empty() {
            return Self::fallback("no valid predictions available");
        }

        // Re-proportion weights over the sources that actually responded.
        let total_weight: f64 = responders.iter().map(|(r, _)| r.weight).sum();
        if total_weight <= 0.0 {
            return Self::fallback("all responding sources have zero weight");
        }

        let votes: Vec<SourceVote> = responders
            .iter()
            .map(|(reg, pred)| SourceVote {
                source: reg.name.clone(),
                weight: reg.weight / total_weight,
                prediction: pred.prediction.clone(),
                confidence: pred.confidence,
                probability: pred.probability,
            })
            .collect();

        let confidence: f64 = votes.iter().map(|v| v.confidence * v.weight).sum();
        let probability: f64 = votes.iter().map(|v| v.probability * v.weight).sum();

        // Consensus label: identical string votes pooled by total normalized
        // weight; ties break toward the earliest-registered vote.
        let mut tally: Vec<(&str, f64)> = Vec::new();
        for vote in &votes {
            match tally.iter_mut().find(|(label, _)| *label == vote.prediction) {
                Some((_, w)) => *w += vote.weight,
                None => tally.push((&vote.prediction, vote.weight)),
            }
        }
        let prediction = tally
            .iter()
            .fold(("unknown", f64::MIN), |best, &(label, w)| {
                if w > best.1 { (label, w) } else { best }
            })
            .0
            .to_string();

        PredictionResult {
            prediction,
            confidence,
            probability,
            expected_value: placeholder_expected_value(probability),
            votes,
            error: None,
        }
    }

    /// Predictions for a batch of fixtures with per-item isolation: one
    /// fixture degrading to the fallback never aborts the batch.
    pub fn batch(&self, features: &[MatchFeatures]) -> Vec<PredictionResult> {
        features.iter().map(|f| self.predict(f)).collect()
    }

    fn fallback(reason: &str) -> PredictionResult {
        PredictionResult {
            prediction: "unknown".to_string(),
            confidence: 0.0,
            probability: 0.5,
            expected_value: 0.0,
            votes: Vec::new(),
            error: Some(reason.to_string()),
        }
    }
}

/// EV against the default-odds placeholder: `p·(odds−1) − (1−p)`.
fn placeholder_expected_value(probability: f64) -> f64 {
    probability * (DEFAULT_ODDS_PLACEHOLDER - 1.0) - (1.0 - probability)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
