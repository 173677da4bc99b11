//! The Odds API client — real-time sports odds and scores.
//!
//! API: `https://api.the-odds-api.com/v4` (decimal odds, ISO dates).
//! Auth: `apiKey` query parameter. Every odds/scores request costs usage
//! credits; the remaining quota is reported via response headers and an
//! exhausted quota is surfaced as `FeedError::CreditsExhausted` so the
//! scheduler can stop burning requests for the cycle.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{
    EventScore, FeedBookmaker, FeedError, FeedEvent, FeedMarket, FeedOutcome, OddsFeed,
    ScoreProvider, TeamScore,
};

const DEFAULT_BASE_URL: &str = "https://api.the-odds-api.com/v4";

/// Regions whose bookmakers are aggregated.
const REGIONS: &str = "us,uk,eu,au";

/// Markets requested from the feed. Head-to-head only — the selector's
/// probability mapping is defined over h2h selections.
const MARKETS: &str = "h2h";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ApiEvent {
    id: String,
    sport_key: String,
    sport_title: String,
    commence_time: DateTime<Utc>,
    home_team: String,
    away_team: String,
    #[serde(default)]
    bookmakers: Vec<ApiBookmaker>,
}

#[derive(Debug, Deserialize)]
struct ApiBookmaker {
    key: String,
    #[serde(default)]
    markets: Vec<ApiMarket>,
}

#[derive(Debug, Deserialize)]
struct ApiMarket {
    key: String,
    #[serde(default)]
    outcomes: Vec<ApiOutcome>,
}

#[derive(Debug, Deserialize)]
struct ApiOutcome {
    name: String,
    price: f64,
}

#[derive(Debug, Deserialize)]
struct ApiScoreEvent {
    id: String,
    #[serde(default)]
    completed: bool,
    #[serde(default)]
    scores: Option<Vec<ApiTeamScore>>,
}

#[derive(Debug, Deserialize)]
struct ApiTeamScore {
    name: String,
    #[serde(default)]
    score: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct TheOddsApiClient {
    http: Client,
    api_key: String,
    base_url: String,
}

impl TheOddsApiClient {
    pub fn new(api_key: String) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("TIPSTER/0.1.0")
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build odds HTTP client: {e}"))?;
        Ok(Self {
            http,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Override the base URL (local stub servers in tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Map a non-success response to a feed error, distinguishing quota
    /// exhaustion from everything else.
    async fn error_from_response(resp: reqwest::Response) -> FeedError {
        let status = resp.status().as_u16();
        let message = resp.text().await.unwrap_or_default();
        if is_quota_exhausted(status, &message) {
            FeedError::CreditsExhausted
        } else {
            FeedError::Api { status, message }
        }
    }

    fn log_quota(headers: &reqwest::header::HeaderMap, endpoint: &str) {
        let used = headers
            .get("x-requests-used")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("?");
        let remaining = headers
            .get("x-requests-remaining")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("?");
        debug!(endpoint, used, remaining, "Odds API quota");
    }
}

/// Quota exhaustion shows up as HTTP 429, or as a 401 carrying the
/// OUT_OF_USAGE_CREDITS error code in the body.
fn is_quota_exhausted(status: u16, body: &str) -> bool {
    status == 429 || (status == 401 && body.contains("OUT_OF_USAGE_CREDITS"))
}

#[async_trait]
impl OddsFeed for TheOddsApiClient {
    async fn fetch_odds(
        &self,
        sport_key: &str,
        window_days: i64,
    ) -> Result<Vec<FeedEvent>, FeedError> {
        let from = Utc::now();
        let to = from + Duration::days(window_days);
        let from_param = from.format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let to_param = to.format("%Y-%m-%dT%H:%M:%SZ").to_string();

        let url = format!(
            "{}/sports/{}/odds",
            self.base_url,
            urlencoding::encode(sport_key),
        );

        let resp = self
            .http
            .get(&url)
            .query(&[
                ("apiKey", self.api_key.as_str()),
                ("regions", REGIONS),
                ("markets", MARKETS),
                ("oddsFormat", "decimal"),
                ("dateFormat", "iso"),
                ("commenceTimeFrom", from_param.as_str()),
                ("commenceTimeTo", to_param.as_str()),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(Self::error_from_response(resp).await);
        }

        Self::log_quota(resp.headers(), "odds");
        let events: Vec<ApiEvent> = resp.json().await?;
        info!(sport_key, count = events.len(), "Fetched odds events");

        Ok(events.into_iter().map(feed_event_from_api).collect())
    }
}

#[async_trait]
impl ScoreProvider for TheOddsApiClient {
    async fn completed_events(
        &self,
        league_key: &str,
        days_from: u8,
    ) -> Result<Vec<EventScore>, FeedError> {
        let url = format!(
            "{}/sports/{}/scores",
            self.base_url,
            urlencoding::encode(league_key),
        );
        let days_param = days_from.to_string();

        let resp = self
            .http
            .get(&url)
            .query(&[
                ("apiKey", self.api_key.as_str()),
                ("daysFrom", days_param.as_str()),
                ("dateFormat", "iso"),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(Self::error_from_response(resp).await);
        }

        Self::log_quota(resp.headers(), "scores");
        let events: Vec<ApiScoreEvent> = resp.json().await?;

        let scored: Vec<EventScore> = events.into_iter().map(event_score_from_api).collect();
        let completed = scored.iter().filter(|s| s.completed).count();
        if completed == 0 {
            warn!(league_key, "No completed events in scores response");
        } else {
            info!(league_key, completed, "Fetched scores");
        }

        Ok(scored)
    }
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

fn feed_event_from_api(ev: ApiEvent) -> FeedEvent {
    FeedEvent {
        external_id: ev.id,
        sport_key: ev.sport_key,
        sport_title: ev.sport_title,
        home_team: ev.home_team,
        away_team: ev.away_team,
        commence_time: ev.commence_time,
        bookmakers: ev
            .bookmakers
            .into_iter()
            .map(|b| FeedBookmaker {
                name: b.key,
                markets: b
                    .markets
                    .into_iter()
                    .map(|m| FeedMarket {
                        key: m.key,
                        outcomes: m
                            .outcomes
                            .into_iter()
                            .map(|o| FeedOutcome { name: o.name, price: o.price })
                            .collect(),
                    })
                    .collect(),
            })
            .collect(),
    }
}

fn event_score_from_api(ev: ApiScoreEvent) -> EventScore {
    EventScore {
        external_id: ev.id,
        completed: ev.completed,
        scores: ev
            .scores
            .unwrap_or_default()
            .into_iter()
            .map(|s| TeamScore {
                name: s.name,
                score: s.score.unwrap_or_default(),
            })
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
