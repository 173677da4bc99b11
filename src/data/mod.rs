//! External market-data collaborators.
//!
//! Defines the `OddsFeed` and `ScoreProvider` traits the ingestion and
//! grading paths depend on, plus the shared feed error type. The concrete
//! client for The Odds API lives in `odds_api`.

pub mod odds_api;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[cfg(test)]
use mockall::automock;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures from odds/score feeds.
///
/// `CreditsExhausted` is deliberately distinct from generic request
/// failures: it means the API quota is gone, so callers should abandon the
/// remaining requests for the cycle instead of retrying league by league.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("odds feed usage credits exhausted")]
    CreditsExhausted,

    #[error("odds feed request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("odds feed returned {status}: {message}")]
    Api { status: u16, message: String },
}

// ---------------------------------------------------------------------------
// Feed payloads
// ---------------------------------------------------------------------------

/// An upcoming fixture with its bookmaker prices, as delivered by the feed.
#[derive(Debug, Clone)]
pub struct FeedEvent {
    pub external_id: String,
    pub sport_key: String,
    pub sport_title: String,
    pub home_team: String,
    pub away_team: String,
    pub commence_time: DateTime<Utc>,
    pub bookmakers: Vec<FeedBookmaker>,
}

#[derive(Debug, Clone)]
pub struct FeedBookmaker {
    pub name: String,
    pub markets: Vec<FeedMarket>,
}

#[derive(Debug, Clone)]
pub struct FeedMarket {
    /// Market key, e.g. "h2h".
    pub key: String,
    pub outcomes: Vec<FeedOutcome>,
}

#[derive(Debug, Clone)]
pub struct FeedOutcome {
    /// Selection label (team name or "Draw").
    pub name: String,
    /// Decimal odds.
    pub price: f64,
}

/// A possibly-completed fixture from the scores endpoint.
///
/// Scores arrive as strings because that is what the wire format carries;
/// grading parses and treats malformed values as no-winner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventScore {
    pub external_id: String,
    pub completed: bool,
    pub scores: Vec<TeamScore>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamScore {
    pub name: String,
    pub score: String,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Source of upcoming events and current bookmaker odds.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait OddsFeed: Send + Sync {
    /// Fetch upcoming events with h2h prices for one sport key, covering
    /// fixtures starting within the next `window_days` days.
    async fn fetch_odds(&self, sport_key: &str, window_days: i64)
        -> Result<Vec<FeedEvent>, FeedError>;
}

/// Source of final scores for completed events.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ScoreProvider: Send + Sync {
    /// Completed (and recently started) events for a league, looking back
    /// `days_from` days.
    async fn completed_events(
        &self,
        league_key: &str,
        days_from: u8,
    ) -> Result<Vec<EventScore>, FeedError>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
