//! Bet scoring and unit sizing.
//!
//! Pure, side-effect-free math over scalars: unit sizing, vig-adjusted
//! expected value, inverse quality filtering, composite ranking scores,
//! fractional Kelly staking, and streak-based sizing adjustment. Everything
//! here is deterministic and suspension-free; callers bring their own
//! probabilities and odds.

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Standard -110 juice (4.76%).
pub const DEFAULT_VIG_RATE: f64 = 0.0476;

/// Maximum recommended unit size.
pub const DEFAULT_MAX_UNITS: f64 = 5.0;

/// Quarter-Kelly: conservative fractional sizing.
pub const DEFAULT_KELLY_FRACTION: f64 = 0.25;

/// Hard cap on the Kelly bankroll fraction, applied after the multiplier.
pub const KELLY_CAP: f64 = 0.20;

// ---------------------------------------------------------------------------
// Unit sizing
// ---------------------------------------------------------------------------

/// Recommended bet units from confidence, edge, and risk.
///
/// Returns 0.0 below 70% confidence (no bet). Otherwise units grow with
/// confidence and edge and shrink with risk, clamped to [0.5, `max_units`]
/// and rounded to the nearest 0.5.
pub fn unit_size(confidence: f64, expected_value: f64, risk_score: f64, max_units: f64) -> f64 {
    if confidence < 0.70 {
        return 0.0;
    }

    let edge = expected_value - 1.0;
    let risk_penalty = risk_score * 0.5;

    // 0.70 conf = 0.5 units, 0.80 = 1.5 units; 10% edge adds 0.5 units.
    let base_units =
        (confidence - 0.65) * 10.0 + edge * 5.0 + (1.0 - risk_score) * 2.0 - risk_penalty;

    let units = base_units.clamp(0.5, max_units);

    (units * 2.0).round() / 2.0
}

// ---------------------------------------------------------------------------
// Expected value
// ---------------------------------------------------------------------------

/// Expected value including vigorish (bookmaker commission).
///
/// Returns a multiplier where 1.0 is this function's breakeven reference
/// and 1.1 reads as a 10% edge. The `1 + ev` form is a preserved contract
/// of the sizing and filter formulas downstream; it is not a standard
/// net-EV-over-stake quantity.
pub fn ev_with_vig(win_probability: f64, decimal_odds: f64, vig_rate: f64) -> f64 {
    let effective_payout = decimal_odds * (1.0 - vig_rate);
    let ev = win_probability * effective_payout - (1.0 - win_probability);
    1.0 + ev
}

// ---------------------------------------------------------------------------
// Inverse filter
// ---------------------------------------------------------------------------

/// Quality thresholds for the inverse filter.
#[derive(Debug, Clone)]
pub struct FilterThresholds {
    /// Minimum model confidence (0–1).
    pub min_confidence: f64,
    /// Minimum EV multiplier (1.08 = at least 8% edge after vig).
    pub min_ev: f64,
    /// Maximum acceptable risk score (0–1).
    pub max_risk: f64,
}

impl Default for FilterThresholds {
    fn default() -> Self {
        Self {
            min_confidence: 0.70,
            min_ev: 1.08,
            max_risk: 0.65,
        }
    }
}

/// Outcome of the inverse filter: whether the candidate is worth betting,
/// and why not when it isn't. Rejections are observability data, not errors.
#[derive(Debug, Clone)]
pub struct FilterVerdict {
    pub accepted: bool,
    pub reason: String,
}

impl FilterVerdict {
    fn reject(reason: String) -> Self {
        Self { accepted: false, reason }
    }
}

/// Inverse filtering: reject bets that don't meet quality standards.
/// Better to skip a bet than make a bad one.
///
/// Checks run in order: confidence floor, EV floor, risk ceiling, then two
/// pattern rejections — high confidence paired with low edge (model
/// overconfidence) and low risk paired with marginal edge (false security).
pub fn inverse_filter(
    confidence: f64,
    ev_with_vig: f64,
    risk_score: f64,
    thresholds: &FilterThresholds,
) -> FilterVerdict {
    if confidence < thresholds.min_confidence {
        return FilterVerdict::reject(format!(
            "low confidence: {:.1}% < {:.1}%",
            confidence * 100.0,
            thresholds.min_confidence * 100.0,
        ));
    }

    if ev_with_vig < thresholds.min_ev {
        return FilterVerdict::reject(format!(
            "low edge: {:.1}% < {:.1}%",
            (ev_with_vig - 1.0) * 100.0,
            (thresholds.min_ev - 1.0) * 100.0,
        ));
    }

    if risk_score > thresholds.max_risk {
        return FilterVerdict::reject(format!(
            "high risk: {:.1}% > {:.1}%",
            risk_score * 100.0,
            thresholds.max_risk * 100.0,
        ));
    }

    if confidence > 0.85 && ev_with_vig < 1.10 {
        return FilterVerdict::reject(
            "high confidence with low edge suggests overconfidence".to_string(),
        );
    }

    if risk_score < 0.3 && ev_with_vig < 1.12 {
        return FilterVerdict::reject(
            "low risk with marginal edge suggests false security".to_string(),
        );
    }

    FilterVerdict {
        accepted: true,
        reason: "passes all filters".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Composite ranking score
// ---------------------------------------------------------------------------

/// Component weights for the composite ranking score.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ScoreWeights {
    pub confidence: f64,
    pub ev: f64,
    pub risk_adjusted: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            confidence: 0.40,
            ev: 0.35,
            risk_adjusted: 0.25,
        }
    }
}

/// Composite score for ranking candidates; higher is better.
///
/// A 10% edge scales to a 0.5 EV component; the risk-adjusted component is
/// the EV multiplier discounted by risk.
pub fn composite_score(
    confidence: f64,
    ev_with_vig: f64,
    risk_score: f64,
    weights: &ScoreWeights,
) -> f64 {
    let ev_score = (ev_with_vig - 1.0) * 5.0;
    let risk_adjusted_score = (1.0 - risk_score) * ev_with_vig;

    weights.confidence * confidence
        + weights.ev * ev_score
        + weights.risk_adjusted * risk_adjusted_score
}

// ---------------------------------------------------------------------------
// Kelly criterion
// ---------------------------------------------------------------------------

/// Fractional Kelly bankroll fraction: `(b·p − q) / b` with `b = odds − 1`,
/// scaled by `fraction` and clamped to [0, 0.20].
///
/// Returns 0.0 when the odds carry no payout (`b <= 0`) or the edge is
/// negative.
pub fn kelly_fraction(win_probability: f64, decimal_odds: f64, fraction: f64) -> f64 {
    let b = decimal_odds - 1.0;
    if b <= 0.0 {
        return 0.0;
    }

    let p = win_probability;
    let q = 1.0 - p;
    let kelly = (b * p - q) / b;

    (kelly * fraction).clamp(0.0, KELLY_CAP)
}

// ---------------------------------------------------------------------------
// Streak adjustment
// ---------------------------------------------------------------------------

/// Adjust unit sizing based on the recent win/loss streak.
///
/// Fewer than 3 results: no adjustment. Otherwise looks at the last 10:
/// win rate ≥ 70% bumps units up, ≤ 40% trims them, each by at most
/// `max_adjustment`. The result never drops below half a unit.
pub fn streak_adjustment(recent_results: &[bool], base_units: f64, max_adjustment: f64) -> f64 {
    if recent_results.len() < 3 {
        return base_units;
    }

    let recent = &recent_results[recent_results.len().saturating_sub(10)..];
    let wins = recent.iter().filter(|&&w| w).count() as f64;
    let win_rate = wins / recent.len() as f64;

    let adjustment = if win_rate >= 0.70 {
        max_adjustment.min(0.5)
    } else if win_rate <= 0.40 {
        -max_adjustment.min(0.5)
    } else {
        0.0
    };

    (base_units + adjustment).max(0.5)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // ---- unit_size ---------------------------------------------------------

    #[test]
    fn test_unit_size_below_confidence_floor() {
        for conf in [0.0, 0.30, 0.50, 0.6999] {
            assert_eq!(unit_size(conf, 1.20, 0.2, DEFAULT_MAX_UNITS), 0.0);
        }
    }

    #[test]
    fn test_unit_size_reference_case() {
        // (0.75-0.65)*10 + 0.15*5 + 0.7*2 - 0.3*0.5 = 1.0 + 0.75 + 1.4 - 0.15
        let units = unit_size(0.75, 1.15, 0.3, DEFAULT_MAX_UNITS);
        assert_eq!(units, 3.0);
    }

    #[test]
    fn test_unit_size_floor() {
        // Barely qualifying bet still gets the half-unit floor.
        let units = unit_size(0.70, 1.0, 0.9, DEFAULT_MAX_UNITS);
        assert_eq!(units, 0.5);
    }

    #[test]
    fn test_unit_size_capped_at_max() {
        let units = unit_size(0.99, 2.0, 0.0, DEFAULT_MAX_UNITS);
        assert_eq!(units, DEFAULT_MAX_UNITS);
    }

    #[test]
    fn test_unit_size_rounds_to_half() {
        let units = unit_size(0.78, 1.12, 0.25, DEFAULT_MAX_UNITS);
        assert_eq!(units * 2.0, (units * 2.0).round());
    }

    // ---- ev_with_vig -------------------------------------------------------

    #[test]
    fn test_ev_with_vig_reference_case() {
        let ev = ev_with_vig(0.60, 2.0, DEFAULT_VIG_RATE);
        assert!((ev - 1.74288).abs() < 1e-4, "got {ev}");
    }

    #[test]
    fn test_ev_with_vig_zero_probability() {
        // Certain loss: 1 + (0 - 1) = 0.
        let ev = ev_with_vig(0.0, 2.0, DEFAULT_VIG_RATE);
        assert!((ev - 0.0).abs() < 1e-10);
    }

    #[test]
    fn test_ev_with_vig_no_vig_even_money() {
        // Fair coin at fair odds without vig is exactly breakeven.
        let ev = ev_with_vig(0.5, 2.0, 0.0);
        assert!((ev - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_ev_with_vig_increases_with_probability() {
        let low = ev_with_vig(0.4, 2.0, DEFAULT_VIG_RATE);
        let high = ev_with_vig(0.7, 2.0, DEFAULT_VIG_RATE);
        assert!(high > low);
    }

    // ---- inverse_filter ----------------------------------------------------

    #[test]
    fn test_filter_accepts_solid_bet() {
        let v = inverse_filter(0.75, 1.15, 0.35, &FilterThresholds::default());
        assert!(v.accepted, "{}", v.reason);
    }

    #[test]
    fn test_filter_rejects_low_confidence() {
        let v = inverse_filter(0.60, 1.20, 0.30, &FilterThresholds::default());
        assert!(!v.accepted);
        assert!(v.reason.contains("confidence"));
    }

    #[test]
    fn test_filter_rejects_low_edge() {
        let v = inverse_filter(0.75, 1.02, 0.40, &FilterThresholds::default());
        assert!(!v.accepted);
        assert!(v.reason.contains("edge"));
    }

    #[test]
    fn test_filter_rejects_high_risk() {
        let v = inverse_filter(0.75, 1.15, 0.80, &FilterThresholds::default());
        assert!(!v.accepted);
        assert!(v.reason.contains("risk"));
    }

    #[test]
    fn test_filter_rejects_overconfidence_pattern() {
        // Passes the loose baseline thresholds individually, but the
        // high-confidence/low-edge pattern still rejects it.
        let loose = FilterThresholds {
            min_confidence: 0.65,
            min_ev: 1.02,
            max_risk: 0.9,
        };
        let v = inverse_filter(0.90, 1.05, 0.40, &loose);
        assert!(!v.accepted);
        assert!(v.reason.contains("overconfidence"));
    }

    #[test]
    fn test_filter_rejects_false_security_pattern() {
        let loose = FilterThresholds {
            min_confidence: 0.65,
            min_ev: 1.02,
            max_risk: 0.9,
        };
        let v = inverse_filter(0.75, 1.05, 0.20, &loose);
        assert!(!v.accepted);
        assert!(v.reason.contains("false security"));
    }

    #[test]
    fn test_filter_order_confidence_first() {
        // A bet failing every check reports the confidence reason.
        let v = inverse_filter(0.10, 1.0, 0.99, &FilterThresholds::default());
        assert!(v.reason.contains("confidence"));
    }

    // ---- composite_score ---------------------------------------------------

    #[test]
    fn test_composite_score_components() {
        let w = ScoreWeights::default();
        // conf=0.8, ev=1.2, risk=0.3:
        // 0.4*0.8 + 0.35*(0.2*5) + 0.25*(0.7*1.2) = 0.32 + 0.35 + 0.21
        let score = composite_score(0.8, 1.2, 0.3, &w);
        assert!((score - 0.88).abs() < 1e-10);
    }

    #[test]
    fn test_composite_score_prefers_better_bet() {
        let w = ScoreWeights::default();
        let strong = composite_score(0.85, 1.25, 0.2, &w);
        let weak = composite_score(0.70, 1.08, 0.5, &w);
        assert!(strong > weak);
    }

    #[test]
    fn test_composite_score_custom_weights() {
        // All weight on confidence: score equals confidence.
        let w = ScoreWeights { confidence: 1.0, ev: 0.0, risk_adjusted: 0.0 };
        assert!((composite_score(0.73, 1.5, 0.9, &w) - 0.73).abs() < 1e-10);
    }

    // ---- kelly_fraction ----------------------------------------------------

    #[test]
    fn test_kelly_reference_case() {
        // b=1, kelly=(0.6-0.4)/1=0.2, quarter => 0.05
        let f = kelly_fraction(0.6, 2.0, DEFAULT_KELLY_FRACTION);
        assert!((f - 0.05).abs() < 1e-10);
    }

    #[test]
    fn test_kelly_negative_edge_is_zero() {
        let f = kelly_fraction(0.3, 2.0, DEFAULT_KELLY_FRACTION);
        assert_eq!(f, 0.0);
    }

    #[test]
    fn test_kelly_degenerate_odds() {
        assert_eq!(kelly_fraction(0.9, 1.0, DEFAULT_KELLY_FRACTION), 0.0);
        assert_eq!(kelly_fraction(0.9, 0.5, DEFAULT_KELLY_FRACTION), 0.0);
    }

    #[test]
    fn test_kelly_capped() {
        // Huge edge at full Kelly would exceed the cap.
        let f = kelly_fraction(0.95, 5.0, 1.0);
        assert_eq!(f, KELLY_CAP);
    }

    // ---- streak_adjustment -------------------------------------------------

    #[test]
    fn test_streak_too_few_results() {
        assert_eq!(streak_adjustment(&[], 2.0, 0.5), 2.0);
        assert_eq!(streak_adjustment(&[true, false], 2.0, 0.5), 2.0);
    }

    #[test]
    fn test_streak_hot_increases() {
        let recent = [true, true, true, true, false];
        assert_eq!(streak_adjustment(&recent, 2.0, 0.5), 2.5);
    }

    #[test]
    fn test_streak_cold_decreases() {
        let recent = [false, false, false, true];
        assert_eq!(streak_adjustment(&recent, 2.0, 0.5), 1.5);
    }

    #[test]
    fn test_streak_normal_variance_unchanged() {
        let recent = [true, false, true, false, true, false];
        assert_eq!(streak_adjustment(&recent, 2.0, 0.5), 2.0);
    }

    #[test]
    fn test_streak_floor() {
        let recent = [false, false, false];
        assert_eq!(streak_adjustment(&recent, 0.5, 0.5), 0.5);
    }

    #[test]
    fn test_streak_only_last_ten_count() {
        // 10 straight losses followed by... irrelevant older wins.
        let mut results = vec![true; 20];
        results.extend(vec![false; 10]);
        assert_eq!(streak_adjustment(&results, 2.0, 0.5), 1.5);
    }
}
