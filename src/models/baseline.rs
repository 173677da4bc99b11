//! Baseline prediction sources.
//!
//! Deterministic models built on the same market-derived features the
//! selector produces. They stand in for trained gradient models in
//! environments where none has been fitted yet, and anchor the ensemble
//! with a market prior either way.

use anyhow::{ensure, Result};

use super::{MatchFeatures, PredictionSource};
use crate::types::SourcePrediction;

// ---------------------------------------------------------------------------
// Market prior
// ---------------------------------------------------------------------------

/// Predicts the fair market-implied home-win probability.
///
/// Confidence tracks bookmaker agreement: a tight cross-book consensus is
/// a stronger signal than a market where books disagree on the price.
pub struct MarketModel {
    /// Floor/ceiling keeping probabilities away from degenerate extremes.
    clamp: (f64, f64),
}

impl Default for MarketModel {
    fn default() -> Self {
        Self { clamp: (0.03, 0.97) }
    }
}

impl MarketModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Relative price disagreement across bookmakers for the home line.
    fn relative_dispersion(features: &MatchFeatures) -> f64 {
        if features.home_odds > 0.0 {
            features.home_odds_dispersion / features.home_odds
        } else {
            1.0
        }
    }
}

impl PredictionSource for MarketModel {
    fn predict(&self, features: &MatchFeatures) -> Result<SourcePrediction> {
        ensure!(
            features.home_implied > 0.0 && features.home_implied < 1.0,
            "degenerate implied probability: {}",
            features.home_implied,
        );

        let probability = features.home_implied.clamp(self.clamp.0, self.clamp.1);

        // <2% relative spread across books reads as consensus; >10% as noise.
        let dispersion = Self::relative_dispersion(features);
        let confidence = (0.85 - dispersion * 3.0).clamp(0.35, 0.85);

        Ok(SourcePrediction {
            prediction: if probability >= 0.5 { "home" } else { "away" }.to_string(),
            confidence,
            probability,
        })
    }
}

// ---------------------------------------------------------------------------
// Form / ranking model
// ---------------------------------------------------------------------------

/// Logistic model over form and ranking differentials plus venue advantage.
pub struct FormModel {
    /// Sensitivity to the recent-form differential.
    form_coef: f64,
    /// Sensitivity to the ranking differential (per ranking point).
    ranking_coef: f64,
}

impl Default for FormModel {
    fn default() -> Self {
        Self {
            form_coef: 3.0,
            ranking_coef: 0.02,
        }
    }
}

impl FormModel {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PredictionSource for FormModel {
    fn predict(&self, features: &MatchFeatures) -> Result<SourcePrediction> {
        ensure!(features.bookmaker_count > 0, "no market to derive form proxies from");

        // ranking_difference is home − away; lower ranking is stronger,
        // so a negative difference pushes toward home.
        let x = self.form_coef * (features.home_recent_form - features.away_recent_form)
            - self.ranking_coef * features.ranking_difference
            + features.venue_advantage;

        let probability = sigmoid(x).clamp(0.03, 0.97);

        // Stronger differentials are easier calls.
        let confidence = (0.50 + x.abs() * 0.4).clamp(0.50, 0.90);

        Ok(SourcePrediction {
            prediction: if probability >= 0.5 { "home" } else { "away" }.to_string(),
            confidence,
            probability,
        })
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
