//! Shared types for the TIPSTER agent.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that data, model, selector,
//! and ledger modules can depend on them without circular references.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Lifecycle enums
// ---------------------------------------------------------------------------

/// Event lifecycle. Ingestion creates events as `Upcoming`; only the
/// grading pass flips them to `Finished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventStatus {
    Upcoming,
    Finished,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Upcoming => "upcoming",
            EventStatus::Finished => "finished",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EventStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "upcoming" => Ok(EventStatus::Upcoming),
            "finished" => Ok(EventStatus::Finished),
            _ => Err(anyhow::anyhow!("Unknown event status: {s}")),
        }
    }
}

/// Ledger state machine for a recommendation.
///
/// `Pending` is the only mutable state: grading moves an entry exactly once
/// to `Won`, `Lost`, or `Void`, after which it is immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BetStatus {
    Pending,
    Won,
    Lost,
    Void,
}

impl BetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BetStatus::Pending => "pending",
            BetStatus::Won => "won",
            BetStatus::Lost => "lost",
            BetStatus::Void => "void",
        }
    }

    /// Whether the bet has a real-money outcome (won or lost).
    /// Void entries carry no stake either way and are excluded from P&L.
    pub fn is_graded(&self) -> bool {
        matches!(self, BetStatus::Won | BetStatus::Lost)
    }

    /// Whether the entry has left the pending state.
    pub fn is_settled(&self) -> bool {
        !matches!(self, BetStatus::Pending)
    }
}

impl fmt::Display for BetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BetStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(BetStatus::Pending),
            "won" => Ok(BetStatus::Won),
            "lost" => Ok(BetStatus::Lost),
            "void" => Ok(BetStatus::Void),
            _ => Err(anyhow::anyhow!("Unknown bet status: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A sporting fixture tracked in the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    /// Stable provider key (The Odds API event id).
    pub external_id: String,
    /// Provider sport key, e.g. "soccer_epl".
    pub sport_key: String,
    /// Human-readable sport title, e.g. "EPL".
    pub sport_title: String,
    pub name: String,
    pub home_team: String,
    pub away_team: String,
    pub start_time: DateTime<Utc>,
    pub status: EventStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({}, {})",
            self.sport_title,
            self.name,
            self.start_time.format("%Y-%m-%d %H:%M"),
            self.status,
        )
    }
}

impl Event {
    /// Whether the fixture's scheduled start has passed.
    pub fn has_started(&self) -> bool {
        self.start_time <= Utc::now()
    }

    /// Hours elapsed since the scheduled start (negative if not started).
    pub fn hours_since_start(&self) -> f64 {
        (Utc::now() - self.start_time).num_seconds() as f64 / 3600.0
    }

    /// Helper to build a test fixture with sensible defaults.
    #[cfg(test)]
    pub fn sample() -> Self {
        Event {
            id: 1,
            external_id: "ext-001".to_string(),
            sport_key: "soccer_epl".to_string(),
            sport_title: "EPL".to_string(),
            name: "Arsenal vs Chelsea".to_string(),
            home_team: "Arsenal".to_string(),
            away_team: "Chelsea".to_string(),
            start_time: Utc::now() + chrono::Duration::hours(6),
            status: EventStatus::Upcoming,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}

/// Ingestion payload for creating/updating an event.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub external_id: String,
    pub sport_key: String,
    pub sport_title: String,
    pub home_team: String,
    pub away_team: String,
    pub start_time: DateTime<Utc>,
}

impl NewEvent {
    /// Display name, "Home vs Away".
    pub fn name(&self) -> String {
        format!("{} vs {}", self.home_team, self.away_team)
    }
}

// ---------------------------------------------------------------------------
// Odds
// ---------------------------------------------------------------------------

/// A single bookmaker price for one selection of an event.
///
/// Older lines for the same event are superseded (`is_current = false`),
/// never deleted. Multiple current lines per event — one per bookmaker —
/// are the normal case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OddsLine {
    pub id: i64,
    pub event_id: i64,
    pub bookmaker: String,
    /// Market key, e.g. "h2h".
    pub market: String,
    /// Selection label: team name, "home", "away", or "draw".
    pub selection: String,
    pub decimal_odds: f64,
    pub fetched_at: DateTime<Utc>,
    pub is_current: bool,
}

impl OddsLine {
    /// The raw probability encoded by the price, before vig removal.
    pub fn implied_probability(&self) -> f64 {
        if self.decimal_odds > 0.0 {
            1.0 / self.decimal_odds
        } else {
            0.0
        }
    }
}

impl fmt::Display for OddsLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} @ {:.2} ({})",
            self.bookmaker, self.selection, self.decimal_odds, self.market,
        )
    }
}

/// Ingestion payload for one fresh odds line.
#[derive(Debug, Clone)]
pub struct NewOddsLine {
    pub bookmaker: String,
    pub market: String,
    pub selection: String,
    pub decimal_odds: f64,
}

// ---------------------------------------------------------------------------
// Recommendation (ledger entry)
// ---------------------------------------------------------------------------

/// A recorded betting decision — one row of the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: i64,
    pub event_id: i64,
    pub selection: String,
    pub market: String,
    pub bookmaker: String,
    pub recommended_odds: f64,
    pub recommended_stake: Decimal,
    /// Stake as a fraction of the reference bankroll, in percent.
    pub stake_pct: f64,
    /// Confidence score on the 0–100 scale.
    pub confidence: f64,
    /// Edge over breakeven (`ev_with_vig − 1`).
    pub expected_value: f64,
    /// Risk score, 0–1, lower is better.
    pub risk_score: f64,
    /// Recommended unit size (0.5–5.0, 0 = no bet).
    pub units: f64,
    /// Structured reasoning payload.
    pub rationale: serde_json::Value,
    /// Per-source votes and normalized weights from the ensemble.
    pub model_breakdown: serde_json::Value,
    pub status: BetStatus,
    pub actual_outcome: Option<String>,
    pub actual_return: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl Recommendation {
    /// Net profit for graded entries: return − stake. None while pending
    /// or void.
    pub fn profit(&self) -> Option<Decimal> {
        if self.status.is_graded() {
            Some(self.actual_return.unwrap_or(Decimal::ZERO) - self.recommended_stake)
        } else {
            None
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} @ {:.2} | stake=${} conf={:.0} edge={:.1}% | {}",
            self.id,
            self.selection,
            self.recommended_odds,
            self.recommended_stake,
            self.confidence,
            self.expected_value * 100.0,
            self.status,
        )
    }
}

// ---------------------------------------------------------------------------
// Candidate (selector output, pre-persistence)
// ---------------------------------------------------------------------------

/// A fully scored bet candidate produced by the selector.
///
/// Candidates that survive filtering and ranking are persisted as
/// `Recommendation` rows; the rest exist only for the decision log.
#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    pub event_id: i64,
    pub event_name: String,
    pub sport_key: String,
    pub start_time: DateTime<Utc>,
    pub selection: String,
    pub market: String,
    pub bookmaker: String,
    pub recommended_odds: f64,
    /// Win probability mapped to this line's selection.
    pub probability: f64,
    /// Candidate confidence on the 0–1 scale (= mapped probability).
    pub confidence: f64,
    /// EV multiplier including vig (1.0 = breakeven).
    pub ev_with_vig: f64,
    /// Edge over breakeven.
    pub expected_value: f64,
    pub risk_score: f64,
    pub units: f64,
    pub recommended_stake: Decimal,
    pub stake_pct: f64,
    pub composite_score: f64,
    pub rationale: serde_json::Value,
    pub model_breakdown: serde_json::Value,
    /// 1-based rank, assigned to the final picks only.
    pub rank: Option<u32>,
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | {} @ {:.2} | P={:.0}% edge={:.1}% units={:.1} stake=${}",
            self.event_name,
            self.selection,
            self.recommended_odds,
            self.probability * 100.0,
            self.expected_value * 100.0,
            self.units,
            self.recommended_stake,
        )
    }
}

// ---------------------------------------------------------------------------
// Prediction types
// ---------------------------------------------------------------------------

/// One model's answer for a single event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcePrediction {
    /// Outcome label, e.g. "home" or "away".
    pub prediction: String,
    /// Self-reported confidence (0–1).
    pub confidence: f64,
    /// Home-win probability (0–1).
    pub probability: f64,
}

/// A single source's contribution to a consensus, with its normalized weight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceVote {
    pub source: String,
    /// Weight after re-normalization over responding sources.
    pub weight: f64,
    pub prediction: String,
    pub confidence: f64,
    pub probability: f64,
}

/// Consensus prediction for one event. Transient — never persisted as its
/// own row; selected candidates carry the breakdown into the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    pub prediction: String,
    pub confidence: f64,
    pub probability: f64,
    /// Convenience EV against a default-odds placeholder; callers needing
    /// accurate EV use the scoring module with real odds.
    pub expected_value: f64,
    pub votes: Vec<SourceVote>,
    /// Set when every source failed and the values above are the fallback.
    pub error: Option<String>,
}

impl PredictionResult {
    /// Whether this is the defined "unknown" fallback.
    pub fn is_fallback(&self) -> bool {
        self.error.is_some()
    }
}

// ---------------------------------------------------------------------------
// Ledger aggregation
// ---------------------------------------------------------------------------

/// Current run of identical graded outcomes, most recent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreakKind {
    None,
    Won,
    Lost,
}

impl fmt::Display for StreakKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreakKind::None => write!(f, "none"),
            StreakKind::Won => write!(f, "won"),
            StreakKind::Lost => write!(f, "lost"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Streak {
    pub kind: StreakKind,
    pub count: u32,
}

/// Aggregate P&L view over the whole ledger.
///
/// Staked/returned totals cover graded (won + lost) bets only; pending and
/// void entries are counted but carry no money either way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub total_bets: u64,
    pub won: u64,
    pub lost: u64,
    pub pending: u64,
    pub void: u64,
    /// Win rate over graded bets, in percent.
    pub win_rate: f64,
    pub total_staked: Decimal,
    pub total_returned: Decimal,
    pub net_profit: Decimal,
    /// Return on investment over graded stakes, in percent.
    pub roi: f64,
    pub streak: Streak,
}

impl fmt::Display for LedgerSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} bets (W{}/L{}/P{}/V{}) | win_rate={:.1}% | staked=${} returned=${} | net=${} roi={:.1}% | streak={}x{}",
            self.total_bets,
            self.won,
            self.lost,
            self.pending,
            self.void,
            self.win_rate,
            self.total_staked,
            self.total_returned,
            self.net_profit,
            self.roi,
            self.streak.count,
            self.streak.kind,
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    // -- status enums --

    #[test]
    fn test_event_status_roundtrip() {
        for s in [EventStatus::Upcoming, EventStatus::Finished] {
            let parsed: EventStatus = s.as_str().parse().unwrap();
            assert_eq!(parsed, s);
        }
        assert!("live".parse::<EventStatus>().is_err());
    }

    #[test]
    fn test_bet_status_roundtrip() {
        for s in [BetStatus::Pending, BetStatus::Won, BetStatus::Lost, BetStatus::Void] {
            let parsed: BetStatus = s.as_str().parse().unwrap();
            assert_eq!(parsed, s);
        }
        assert!("placed".parse::<BetStatus>().is_err());
    }

    #[test]
    fn test_bet_status_graded() {
        assert!(BetStatus::Won.is_graded());
        assert!(BetStatus::Lost.is_graded());
        assert!(!BetStatus::Void.is_graded());
        assert!(!BetStatus::Pending.is_graded());
    }

    #[test]
    fn test_bet_status_settled() {
        assert!(!BetStatus::Pending.is_settled());
        assert!(BetStatus::Void.is_settled());
    }

    // -- Event --

    #[test]
    fn test_event_not_started() {
        let event = Event::sample();
        assert!(!event.has_started());
        assert!(event.hours_since_start() < 0.0);
    }

    #[test]
    fn test_event_hours_since_start() {
        let mut event = Event::sample();
        event.start_time = Utc::now() - chrono::Duration::hours(50);
        assert!(event.has_started());
        assert!((event.hours_since_start() - 50.0).abs() < 0.1);
    }

    #[test]
    fn test_event_display() {
        let event = Event::sample();
        let s = format!("{event}");
        assert!(s.contains("EPL"));
        assert!(s.contains("Arsenal vs Chelsea"));
        assert!(s.contains("upcoming"));
    }

    #[test]
    fn test_new_event_name() {
        let ev = NewEvent {
            external_id: "x".into(),
            sport_key: "soccer_epl".into(),
            sport_title: "EPL".into(),
            home_team: "Leeds".into(),
            away_team: "Everton".into(),
            start_time: Utc::now(),
        };
        assert_eq!(ev.name(), "Leeds vs Everton");
    }

    // -- OddsLine --

    fn make_line(odds: f64) -> OddsLine {
        OddsLine {
            id: 1,
            event_id: 1,
            bookmaker: "draftkings".into(),
            market: "h2h".into(),
            selection: "home".into(),
            decimal_odds: odds,
            fetched_at: Utc::now(),
            is_current: true,
        }
    }

    #[test]
    fn test_implied_probability() {
        assert!((make_line(2.0).implied_probability() - 0.5).abs() < 1e-10);
        assert!((make_line(4.0).implied_probability() - 0.25).abs() < 1e-10);
    }

    #[test]
    fn test_implied_probability_zero_odds() {
        assert_eq!(make_line(0.0).implied_probability(), 0.0);
    }

    #[test]
    fn test_odds_line_display() {
        let s = format!("{}", make_line(1.91));
        assert!(s.contains("draftkings"));
        assert!(s.contains("1.91"));
    }

    // -- Recommendation --

    fn make_rec(status: BetStatus, stake: Decimal, ret: Option<Decimal>) -> Recommendation {
        Recommendation {
            id: 1,
            event_id: 1,
            selection: "home".into(),
            market: "h2h".into(),
            bookmaker: "draftkings".into(),
            recommended_odds: 2.1,
            recommended_stake: stake,
            stake_pct: 1.5,
            confidence: 72.0,
            expected_value: 0.09,
            risk_score: 0.28,
            units: 2.0,
            rationale: serde_json::json!({"summary": "test"}),
            model_breakdown: serde_json::Value::Null,
            status,
            actual_outcome: None,
            actual_return: ret,
            created_at: Utc::now(),
            settled_at: None,
        }
    }

    #[test]
    fn test_recommendation_profit_won() {
        let rec = make_rec(BetStatus::Won, dec!(100), Some(dec!(210)));
        assert_eq!(rec.profit(), Some(dec!(110)));
    }

    #[test]
    fn test_recommendation_profit_lost() {
        let rec = make_rec(BetStatus::Lost, dec!(100), Some(dec!(0)));
        assert_eq!(rec.profit(), Some(dec!(-100)));
    }

    #[test]
    fn test_recommendation_profit_pending_none() {
        let rec = make_rec(BetStatus::Pending, dec!(100), None);
        assert!(rec.profit().is_none());
    }

    #[test]
    fn test_recommendation_profit_void_none() {
        let rec = make_rec(BetStatus::Void, dec!(100), Some(dec!(0)));
        assert!(rec.profit().is_none());
    }

    #[test]
    fn test_recommendation_serialization_roundtrip() {
        let rec = make_rec(BetStatus::Pending, dec!(50), None);
        let json = serde_json::to_string(&rec).unwrap();
        let parsed: Recommendation = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.status, BetStatus::Pending);
        assert_eq!(parsed.selection, "home");
    }

    // -- PredictionResult --

    #[test]
    fn test_prediction_result_fallback_marker() {
        let ok = PredictionResult {
            prediction: "home".into(),
            confidence: 0.7,
            probability: 0.6,
            expected_value: 0.2,
            votes: Vec::new(),
            error: None,
        };
        let fallback = PredictionResult {
            prediction: "unknown".into(),
            confidence: 0.0,
            probability: 0.5,
            expected_value: 0.0,
            votes: Vec::new(),
            error: Some("no valid predictions available".into()),
        };
        assert!(!ok.is_fallback());
        assert!(fallback.is_fallback());
    }

    // -- LedgerSummary --

    #[test]
    fn test_ledger_summary_display() {
        let summary = LedgerSummary {
            total_bets: 10,
            won: 4,
            lost: 3,
            pending: 2,
            void: 1,
            win_rate: 57.14,
            total_staked: dec!(700),
            total_returned: dec!(820),
            net_profit: dec!(120),
            roi: 17.14,
            streak: Streak { kind: StreakKind::Won, count: 2 },
        };
        let s = format!("{summary}");
        assert!(s.contains("W4/L3/P2/V1"));
        assert!(s.contains("streak=2xwon"));
    }
}
