//! Persistence layer.
//!
//! SQLite via sqlx: events, odds lines, and the recommendation ledger.
//! Multi-statement units of work (odds replacement, pick batches, grading)
//! run inside scoped transactions; money round-trips as TEXT-encoded
//! `Decimal` so no float drift reaches the ledger.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::types::{
    BetStatus, Candidate, Event, EventStatus, NewEvent, NewOddsLine, OddsLine, Recommendation,
};

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (and create if missing) the database at `url`,
    /// e.g. `sqlite://tipster.db?mode=rwc`.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .with_context(|| format!("Failed to open database: {url}"))?;

        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    /// Fresh in-memory database. A single connection keeps every caller on
    /// the same memory instance.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory database")?;

        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                external_id TEXT NOT NULL UNIQUE,
                sport_key TEXT NOT NULL,
                sport_title TEXT NOT NULL,
                name TEXT NOT NULL,
                home_team TEXT NOT NULL,
                away_team TEXT NOT NULL,
                start_time TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'upcoming',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_events_status_start ON events(status, start_time)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS odds_lines (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_id INTEGER NOT NULL REFERENCES events(id),
                bookmaker TEXT NOT NULL,
                market TEXT NOT NULL,
                selection TEXT NOT NULL,
                decimal_odds REAL NOT NULL,
                fetched_at TEXT NOT NULL,
                is_current INTEGER NOT NULL DEFAULT 1
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_odds_event_current ON odds_lines(event_id, is_current)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS recommendations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_id INTEGER NOT NULL REFERENCES events(id),
                selection TEXT NOT NULL,
                market TEXT NOT NULL,
                bookmaker TEXT NOT NULL,
                recommended_odds REAL NOT NULL,
                recommended_stake TEXT NOT NULL,
                stake_pct REAL NOT NULL,
                confidence REAL NOT NULL,
                expected_value REAL NOT NULL,
                risk_score REAL NOT NULL,
                units REAL NOT NULL,
                rationale TEXT NOT NULL,
                model_breakdown TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                actual_outcome TEXT,
                actual_return TEXT,
                created_at TEXT NOT NULL,
                settled_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_recs_status ON recommendations(status)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_recs_dedup ON recommendations(event_id, selection, created_at)",
        )
        .execute(&self.pool)
        .await?;

        info!("Database schema initialized");
        Ok(())
    }

    // -- Events --------------------------------------------------------------

    /// Insert or refresh an event keyed by its provider id. Returns the row
    /// id either way. Start times drift as providers reschedule, so updates
    /// take the fresh value; status is never touched here.
    pub async fn upsert_event(&self, event: &NewEvent) -> Result<i64> {
        let now = Utc::now();
        let row = sqlx::query(
            r#"
            INSERT INTO events (external_id, sport_key, sport_title, name,
                                home_team, away_team, start_time, status,
                                created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'upcoming', ?8, ?8)
            ON CONFLICT (external_id) DO UPDATE SET
                start_time = excluded.start_time,
                updated_at = excluded.updated_at
            RETURNING id
            "#,
        )
        .bind(&event.external_id)
        .bind(&event.sport_key)
        .bind(&event.sport_title)
        .bind(event.name())
        .bind(&event.home_team)
        .bind(&event.away_team)
        .bind(event.start_time)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .context("Failed to upsert event")?;

        Ok(row.get("id"))
    }

    pub async fn event_by_id(&self, id: i64) -> Result<Option<Event>> {
        let row = sqlx::query("SELECT * FROM events WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| event_from_row(&r)).transpose()
    }

    /// Upcoming events starting within the next `window_hours`, optionally
    /// restricted to one sport key.
    pub async fn upcoming_events(
        &self,
        window_hours: i64,
        sport_key: Option<&str>,
    ) -> Result<Vec<Event>> {
        let now = Utc::now();
        let end = now + Duration::hours(window_hours);

        let rows = match sport_key {
            Some(sport) => {
                sqlx::query(
                    r#"
                    SELECT * FROM events
                    WHERE status = 'upcoming'
                      AND start_time >= ?1 AND start_time <= ?2
                      AND sport_key = ?3
                    ORDER BY start_time ASC
                    "#,
                )
                .bind(now)
                .bind(end)
                .bind(sport)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT * FROM events
                    WHERE status = 'upcoming'
                      AND start_time >= ?1 AND start_time <= ?2
                    ORDER BY start_time ASC
                    "#,
                )
                .bind(now)
                .bind(end)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(event_from_row).collect()
    }

    // -- Odds ----------------------------------------------------------------

    /// Replace an event's current odds with a fresh batch, atomically:
    /// existing current lines are superseded (never deleted), then the new
    /// lines are inserted as current.
    pub async fn replace_current_odds(
        &self,
        event_id: i64,
        lines: &[NewOddsLine],
    ) -> Result<usize> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE odds_lines SET is_current = 0 WHERE event_id = ?1 AND is_current = 1")
            .bind(event_id)
            .execute(&mut *tx)
            .await?;

        for line in lines {
            sqlx::query(
                r#"
                INSERT INTO odds_lines (event_id, bookmaker, market, selection,
                                        decimal_odds, fetched_at, is_current)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1)
                "#,
            )
            .bind(event_id)
            .bind(&line.bookmaker)
            .bind(&line.market)
            .bind(&line.selection)
            .bind(line.decimal_odds)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(event_id, count = lines.len(), "Current odds replaced");
        Ok(lines.len())
    }

    pub async fn current_odds(&self, event_id: i64) -> Result<Vec<OddsLine>> {
        let rows = sqlx::query(
            "SELECT * FROM odds_lines WHERE event_id = ?1 AND is_current = 1 ORDER BY bookmaker, selection",
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(odds_line_from_row).collect()
    }

    // -- Recommendations -----------------------------------------------------

    /// Persist a batch of selected candidates as pending ledger entries in
    /// one transaction. Returns the new row ids in batch order.
    pub async fn insert_recommendations(&self, picks: &[Candidate]) -> Result<Vec<i64>> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(picks.len());

        for pick in picks {
            let row = sqlx::query(
                r#"
                INSERT INTO recommendations (event_id, selection, market, bookmaker,
                                             recommended_odds, recommended_stake, stake_pct,
                                             confidence, expected_value, risk_score, units,
                                             rationale, model_breakdown, status, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, 'pending', ?14)
                RETURNING id
                "#,
            )
            .bind(pick.event_id)
            .bind(&pick.selection)
            .bind(&pick.market)
            .bind(&pick.bookmaker)
            .bind(pick.recommended_odds)
            .bind(pick.recommended_stake.to_string())
            .bind(pick.stake_pct)
            .bind(pick.confidence * 100.0)
            .bind(pick.expected_value)
            .bind(pick.risk_score)
            .bind(pick.units)
            .bind(pick.rationale.to_string())
            .bind(pick.model_breakdown.to_string())
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;
            ids.push(row.get("id"));
        }

        tx.commit().await?;
        Ok(ids)
    }

    /// Dedup check: has this (event, selection) been recorded within the
    /// last `within_hours`, regardless of status?
    pub async fn has_recent_recommendation(
        &self,
        event_id: i64,
        selection: &str,
        within_hours: i64,
    ) -> Result<bool> {
        let cutoff = Utc::now() - Duration::hours(within_hours);
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS n FROM recommendations
            WHERE event_id = ?1 AND selection = ?2 AND created_at >= ?3
            "#,
        )
        .bind(event_id)
        .bind(selection)
        .bind(cutoff)
        .fetch_one(&self.pool)
        .await?;

        let n: i64 = row.get("n");
        Ok(n > 0)
    }

    pub async fn pending_recommendations(&self) -> Result<Vec<Recommendation>> {
        let rows = sqlx::query(
            "SELECT * FROM recommendations WHERE status = 'pending' ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(recommendation_from_row).collect()
    }

    /// Grade a pending recommendation and finish its event, atomically.
    ///
    /// The `status = 'pending'` guard makes grading monotonic: an entry
    /// that already left pending is never rewritten. Returns whether the
    /// entry was actually transitioned.
    pub async fn settle_recommendation(
        &self,
        rec_id: i64,
        event_id: i64,
        status: BetStatus,
        outcome: &str,
        actual_return: Decimal,
    ) -> Result<bool> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE recommendations
            SET status = ?1, actual_outcome = ?2, actual_return = ?3, settled_at = ?4
            WHERE id = ?5 AND status = 'pending'
            "#,
        )
        .bind(status.as_str())
        .bind(outcome)
        .bind(actual_return.to_string())
        .bind(now)
        .bind(rec_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated > 0 {
            sqlx::query("UPDATE events SET status = 'finished', updated_at = ?1 WHERE id = ?2")
                .bind(now)
                .bind(event_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(updated > 0)
    }

    /// Full ledger, newest first, optionally filtered by status.
    pub async fn ledger(
        &self,
        limit: i64,
        status: Option<BetStatus>,
    ) -> Result<Vec<Recommendation>> {
        let rows = match status {
            Some(s) => {
                sqlx::query(
                    "SELECT * FROM recommendations WHERE status = ?1 ORDER BY created_at DESC LIMIT ?2",
                )
                .bind(s.as_str())
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT * FROM recommendations ORDER BY created_at DESC LIMIT ?1")
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.iter().map(recommendation_from_row).collect()
    }

    pub async fn all_recommendations(&self) -> Result<Vec<Recommendation>> {
        let rows = sqlx::query("SELECT * FROM recommendations ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(recommendation_from_row).collect()
    }

    /// Graded (won/lost) entries, most recently settled first.
    pub async fn graded_recommendations(&self) -> Result<Vec<Recommendation>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM recommendations
            WHERE status IN ('won', 'lost')
            ORDER BY settled_at DESC, created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(recommendation_from_row).collect()
    }

    /// Recent graded outcomes as win/loss booleans, oldest first — the
    /// shape `scoring::streak_adjustment` expects.
    pub async fn recent_results(&self, limit: i64) -> Result<Vec<bool>> {
        let rows = sqlx::query(
            r#"
            SELECT status FROM recommendations
            WHERE status IN ('won', 'lost')
            ORDER BY settled_at DESC, created_at DESC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut results: Vec<bool> = rows
            .iter()
            .map(|r| r.get::<String, _>("status") == "won")
            .collect();
        results.reverse();
        Ok(results)
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn event_from_row(row: &SqliteRow) -> Result<Event> {
    let status: String = row.get("status");
    Ok(Event {
        id: row.get("id"),
        external_id: row.get("external_id"),
        sport_key: row.get("sport_key"),
        sport_title: row.get("sport_title"),
        name: row.get("name"),
        home_team: row.get("home_team"),
        away_team: row.get("away_team"),
        start_time: row.get("start_time"),
        status: status.parse::<EventStatus>()?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn odds_line_from_row(row: &SqliteRow) -> Result<OddsLine> {
    Ok(OddsLine {
        id: row.get("id"),
        event_id: row.get("event_id"),
        bookmaker: row.get("bookmaker"),
        market: row.get("market"),
        selection: row.get("selection"),
        decimal_odds: row.get("decimal_odds"),
        fetched_at: row.get("fetched_at"),
        is_current: row.get("is_current"),
    })
}

fn recommendation_from_row(row: &SqliteRow) -> Result<Recommendation> {
    let status: String = row.get("status");
    let stake: String = row.get("recommended_stake");
    let actual_return: Option<String> = row.get("actual_return");
    let rationale: String = row.get("rationale");
    let breakdown: String = row.get("model_breakdown");
    let settled_at: Option<DateTime<Utc>> = row.get("settled_at");

    Ok(Recommendation {
        id: row.get("id"),
        event_id: row.get("event_id"),
        selection: row.get("selection"),
        market: row.get("market"),
        bookmaker: row.get("bookmaker"),
        recommended_odds: row.get("recommended_odds"),
        recommended_stake: Decimal::from_str_exact(&stake)
            .with_context(|| format!("Bad stake in ledger row: {stake}"))?,
        stake_pct: row.get("stake_pct"),
        confidence: row.get("confidence"),
        expected_value: row.get("expected_value"),
        risk_score: row.get("risk_score"),
        units: row.get("units"),
        rationale: serde_json::from_str(&rationale).unwrap_or(serde_json::Value::Null),
        model_breakdown: serde_json::from_str(&breakdown).unwrap_or(serde_json::Value::Null),
        status: status.parse::<BetStatus>()?,
        actual_outcome: row.get("actual_outcome"),
        actual_return: actual_return
            .map(|s| Decimal::from_str_exact(&s))
            .transpose()
            .context("Bad actual_return in ledger row")?,
        created_at: row.get("created_at"),
        settled_at,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
