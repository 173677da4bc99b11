//! Market feature derivation.
//!
//! Collapses an event's current odds lines into a per-selection market
//! snapshot (mean odds, dispersion, fair probabilities) and the
//! strongly-typed `MatchFeatures` the prediction sources consume. Every
//! proxy is computed from bookmaker prices alone.

use crate::models::MatchFeatures;
use crate::types::{Event, OddsLine};

/// Venue advantage proxy, in probability points.
const HOME_EDGE: f64 = 0.035;

/// Notional number of past meetings the h2h proxy is split over.
const H2H_MEETINGS: f64 = 10.0;

/// Fallback odds when a market is missing a selection outright.
const DEFAULT_ODDS: f64 = 2.0;

// ---------------------------------------------------------------------------
// Selection roles
// ---------------------------------------------------------------------------

/// How a line's selection label relates to the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionRole {
    Home,
    Draw,
    /// Away team or any other named selection.
    Away,
}

/// Classify a selection label against the event's teams.
///
/// "home"/"away"/"draw" keywords and exact team names are recognized;
/// anything else is treated as the non-home side, which is what the
/// probability mapping requires.
pub fn classify_selection(selection: &str, event: &Event) -> SelectionRole {
    let sel = selection.trim().to_lowercase();
    if sel == "draw" {
        SelectionRole::Draw
    } else if sel == "home" || sel == event.home_team.to_lowercase() {
        SelectionRole::Home
    } else {
        SelectionRole::Away
    }
}

// ---------------------------------------------------------------------------
// Market snapshot
// ---------------------------------------------------------------------------

/// Aggregated market view of one selection across bookmakers.
#[derive(Debug, Clone)]
pub struct SelectionOdds {
    pub selection: String,
    pub role: SelectionRole,
    /// Mean decimal odds across current lines.
    pub mean_odds: f64,
    /// Population std-dev of the odds across bookmakers.
    pub dispersion: f64,
    /// Raw implied probability, `1 / mean_odds`.
    pub raw_implied: f64,
    /// Implied probability after vig removal (set to sum to 1).
    pub fair_probability: f64,
}

/// Per-selection aggregation of an event's current odds.
#[derive(Debug, Clone)]
pub struct MarketSnapshot {
    pub selections: Vec<SelectionOdds>,
    pub bookmaker_count: u32,
}

impl MarketSnapshot {
    /// Build a snapshot from current odds lines. Returns None when there is
    /// nothing usable (no lines, or no positive prices).
    pub fn from_lines(event: &Event, lines: &[OddsLine]) -> Option<Self> {
        let usable: Vec<&OddsLine> = lines
            .iter()
            .filter(|l| l.is_current && l.decimal_odds > 1.0)
            .collect();
        if usable.is_empty() {
            return None;
        }

        // Group prices by selection label, preserving first-seen order.
        let mut groups: Vec<(String, Vec<f64>)> = Vec::new();
        for line in &usable {
            let key = line.selection.trim().to_lowercase();
            match groups.iter_mut().find(|(sel, _)| *sel == key) {
                Some((_, prices)) => prices.push(line.decimal_odds),
                None => groups.push((key, vec![line.decimal_odds])),
            }
        }

        let mut selections: Vec<SelectionOdds> = groups
            .into_iter()
            .map(|(selection, prices)| {
                let mean = prices.iter().sum::<f64>() / prices.len() as f64;
                let variance = prices
                    .iter()
                    .map(|p| (p - mean).powi(2))
                    .sum::<f64>()
                    / prices.len() as f64;
                let role = classify_selection(&selection, event);
                SelectionOdds {
                    selection,
                    role,
                    mean_odds: mean,
                    dispersion: variance.sqrt(),
                    raw_implied: 1.0 / mean,
                    fair_probability: 0.0, // normalized below
                }
            })
            .collect();

        // Vig removal: renormalize implied probabilities to sum to 1.
        let total_implied: f64 = selections.iter().map(|s| s.raw_implied).sum();
        if total_implied <= 0.0 {
            return None;
        }
        for s in &mut selections {
            s.fair_probability = s.raw_implied / total_implied;
        }

        let bookmaker_count = {
            let mut names: Vec<&str> = usable.iter().map(|l| l.bookmaker.as_str()).collect();
            names.sort_unstable();
            names.dedup();
            names.len() as u32
        };

        Some(Self { selections, bookmaker_count })
    }

    fn by_role(&self, role: SelectionRole) -> Option<&SelectionOdds> {
        self.selections.iter().find(|s| s.role == role)
    }

    pub fn home(&self) -> Option<&SelectionOdds> {
        self.by_role(SelectionRole::Home)
    }

    pub fn away(&self) -> Option<&SelectionOdds> {
        self.by_role(SelectionRole::Away)
    }

    pub fn draw(&self) -> Option<&SelectionOdds> {
        self.by_role(SelectionRole::Draw)
    }

    /// Fair implied probability of the draw, 0.0 for two-outcome markets.
    pub fn fair_draw_probability(&self) -> f64 {
        self.draw().map(|s| s.fair_probability).unwrap_or(0.0)
    }
}

// ---------------------------------------------------------------------------
// Feature derivation
// ---------------------------------------------------------------------------

/// Derive the model feature vector from a market snapshot.
///
/// Proxies: implied win rates are the fair probabilities themselves; form
/// skews around 0.5 with relative strength; the h2h split distributes a
/// notional ten meetings by fair probabilities; rankings spread around 50
/// (lower = stronger); venue advantage is a flat home-edge prior.
pub fn derive_features(snapshot: &MarketSnapshot) -> MatchFeatures {
    let home_fair = snapshot.home().map(|s| s.fair_probability).unwrap_or(0.5);
    let away_fair = snapshot.away().map(|s| s.fair_probability).unwrap_or(0.5);
    let draw_fair = snapshot.fair_draw_probability();

    let home_odds = snapshot.home().map(|s| s.mean_odds).unwrap_or(DEFAULT_ODDS);
    let away_odds = snapshot.away().map(|s| s.mean_odds).unwrap_or(DEFAULT_ODDS);
    let draw_odds = snapshot.draw().map(|s| s.mean_odds);

    let strength_gap = home_fair - away_fair;

    // h2h proxy: draws first, remainder split by relative strength.
    let draws = (draw_fair * H2H_MEETINGS).round();
    let contested = H2H_MEETINGS - draws;
    let h2h_home = if home_fair + away_fair > 0.0 {
        (contested * home_fair / (home_fair + away_fair)).round()
    } else {
        contested / 2.0
    };
    let h2h_away = contested - h2h_home;

    let home_ranking = 50.0 - strength_gap * 40.0;
    let away_ranking = 50.0 + strength_gap * 40.0;

    MatchFeatures {
        home_odds,
        away_odds,
        draw_odds,
        home_implied: home_fair,
        away_implied: away_fair,
        draw_implied: draw_fair,
        home_win_rate: home_fair,
        away_win_rate: away_fair,
        home_recent_form: (0.5 + strength_gap * 0.5).clamp(0.0, 1.0),
        away_recent_form: (0.5 - strength_gap * 0.5).clamp(0.0, 1.0),
        h2h_home_wins: h2h_home.max(0.0) as u32,
        h2h_away_wins: h2h_away.max(0.0) as u32,
        h2h_draws: draws.max(0.0) as u32,
        home_ranking,
        away_ranking,
        ranking_difference: home_ranking - away_ranking,
        venue_advantage: HOME_EDGE,
        home_odds_dispersion: snapshot.home().map(|s| s.dispersion).unwrap_or(0.0),
        away_odds_dispersion: snapshot.away().map(|s| s.dispersion).unwrap_or(0.0),
        bookmaker_count: snapshot.bookmaker_count,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
