//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys) are referenced by env-var name in the config and
//! resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

use crate::ingest::IngestConfig;
use crate::ledger::SchedulerConfig;
use crate::scoring::{FilterThresholds, ScoreWeights, DEFAULT_MAX_UNITS, DEFAULT_VIG_RATE};
use crate::selector::{SelectorConfig, StakeConfig};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub database: DatabaseConfig,
    pub scheduler: SchedulerSection,
    pub selection: SelectionConfig,
    pub scoring: ScoringConfig,
    pub stake: StakeSection,
    pub models: ModelsConfig,
    pub odds_feed: OddsFeedConfig,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerSection {
    pub tick_secs: u64,
    pub record_interval_secs: u64,
    pub grade_interval_secs: u64,
    pub odds_refresh_interval_secs: u64,
    pub max_score_leagues_per_cycle: usize,
    pub score_days_from: u8,
    pub result_expiry_hours: f64,
    pub score_leagues: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SelectionConfig {
    pub time_window_hours: i64,
    pub max_picks: usize,
    pub dedup_hours: i64,
    pub min_confidence: f64,
    pub min_expected_value: f64,
    pub max_risk_score: f64,
    #[serde(default)]
    pub demo_mode: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScoringConfig {
    pub confidence_weight: f64,
    pub expected_value_weight: f64,
    pub risk_adjusted_weight: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StakeSection {
    pub bankroll: f64,
    pub max_stake_percentage: f64,
    pub min_stake_amount: f64,
    pub max_stake_amount: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelsConfig {
    pub market_weight: f64,
    pub form_weight: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OddsFeedConfig {
    pub api_key_env: String,
    pub tracked_sports: Vec<String>,
    pub window_days: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    // -- Conversions into module configs -------------------------------------

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            tick_secs: self.scheduler.tick_secs,
            record_interval_secs: self.scheduler.record_interval_secs,
            grade_interval_secs: self.scheduler.grade_interval_secs,
            odds_refresh_interval_secs: self.scheduler.odds_refresh_interval_secs,
            score_leagues: self.scheduler.score_leagues.clone(),
            max_score_leagues_per_cycle: self.scheduler.max_score_leagues_per_cycle,
            score_days_from: self.scheduler.score_days_from,
            result_expiry_hours: self.scheduler.result_expiry_hours,
        }
    }

    pub fn selector_config(&self) -> SelectorConfig {
        SelectorConfig {
            time_window_hours: self.selection.time_window_hours,
            max_picks: self.selection.max_picks,
            dedup_hours: self.selection.dedup_hours,
            thresholds: FilterThresholds {
                min_confidence: self.selection.min_confidence,
                min_ev: self.selection.min_expected_value,
                max_risk: self.selection.max_risk_score,
            },
            weights: ScoreWeights {
                confidence: self.scoring.confidence_weight,
                ev: self.scoring.expected_value_weight,
                risk_adjusted: self.scoring.risk_adjusted_weight,
            },
            stake: StakeConfig {
                bankroll: self.stake.bankroll,
                max_stake_pct: self.stake.max_stake_percentage,
                min_stake: self.stake.min_stake_amount,
                max_stake: self.stake.max_stake_amount,
            },
            demo_mode: self.selection.demo_mode,
            vig_rate: DEFAULT_VIG_RATE,
            max_units: DEFAULT_MAX_UNITS,
        }
    }

    pub fn ingest_config(&self) -> IngestConfig {
        IngestConfig {
            tracked_sports: self.odds_feed.tracked_sports.clone(),
            window_days: self.odds_feed.window_days,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [agent]
        name = "TIPSTER-001"

        [database]
        url = "sqlite://tipster.db?mode=rwc"

        [scheduler]
        tick_secs = 30
        record_interval_secs = 300
        grade_interval_secs = 600
        odds_refresh_interval_secs = 900
        max_score_leagues_per_cycle = 4
        score_days_from = 3
        result_expiry_hours = 48.0
        score_leagues = ["basketball_nba", "soccer_epl"]

        [selection]
        time_window_hours = 24
        max_picks = 3
        dedup_hours = 12
        min_confidence = 0.65
        min_expected_value = 1.05
        max_risk_score = 0.7
        demo_mode = false

        [scoring]
        confidence_weight = 0.40
        expected_value_weight = 0.35
        risk_adjusted_weight = 0.25

        [stake]
        bankroll = 10000.0
        max_stake_percentage = 0.05
        min_stake_amount = 10.0
        max_stake_amount = 1000.0

        [models]
        market_weight = 0.6
        form_weight = 0.4

        [odds_feed]
        api_key_env = "ODDS_API_KEY"
        tracked_sports = ["soccer_epl", "basketball_nba"]
        window_days = 7

        [dashboard]
        enabled = true
        port = 8787
    "#;

    #[test]
    fn test_parse_sample_config() {
        let cfg = AppConfig::parse(SAMPLE).unwrap();
        assert_eq!(cfg.agent.name, "TIPSTER-001");
        assert_eq!(cfg.scheduler.record_interval_secs, 300);
        assert_eq!(cfg.scheduler.score_leagues.len(), 2);
        assert_eq!(cfg.selection.max_picks, 3);
        assert!(!cfg.selection.demo_mode);
        assert_eq!(cfg.dashboard.port, 8787);
    }

    #[test]
    fn test_scheduler_config_conversion() {
        let cfg = AppConfig::parse(SAMPLE).unwrap();
        let sched = cfg.scheduler_config();
        assert_eq!(sched.tick_secs, 30);
        assert_eq!(sched.max_score_leagues_per_cycle, 4);
        assert_eq!(sched.result_expiry_hours, 48.0);
    }

    #[test]
    fn test_selector_config_conversion() {
        let cfg = AppConfig::parse(SAMPLE).unwrap();
        let sel = cfg.selector_config();
        assert_eq!(sel.time_window_hours, 24);
        assert!((sel.thresholds.min_ev - 1.05).abs() < 1e-10);
        assert!((sel.weights.confidence - 0.40).abs() < 1e-10);
        assert!((sel.stake.bankroll - 10_000.0).abs() < 1e-10);
    }

    #[test]
    fn test_demo_mode_defaults_off() {
        let without = SAMPLE.replace("demo_mode = false\n", "");
        let cfg = AppConfig::parse(&without).unwrap();
        assert!(!cfg.selection.demo_mode);
    }

    #[test]
    fn test_missing_section_is_an_error() {
        let broken = SAMPLE.replace("[stake]", "[stakes]");
        assert!(AppConfig::parse(&broken).is_err());
    }

    #[test]
    fn test_load_repo_config() {
        // The checked-in config must stay parseable.
        if let Ok(cfg) = AppConfig::load("config.toml") {
            assert_eq!(cfg.agent.name, "TIPSTER-001");
            assert!(cfg.scheduler.tick_secs > 0);
            assert!(cfg.selection.max_picks > 0);
        }
        // Missing file is acceptable in some test environments.
    }
}
