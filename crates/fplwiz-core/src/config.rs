// Configuration loading and parsing (league.toml, strategy.toml).

use crate::model::Position;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub league: LeagueConfig,
    pub strategy: StrategyConfig,
    pub sources: SourcesConfig,
}

/// One value per playing position. Field names match the TOML keys.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[allow(non_snake_case)]
pub struct PerPosition<T> {
    pub GK: T,
    pub DEF: T,
    pub MID: T,
    pub FWD: T,
}

impl<T: Copy> PerPosition<T> {
    pub fn get(&self, position: Position) -> T {
        match position {
            Position::Goalkeeper => self.GK,
            Position::Defender => self.DEF,
            Position::Midfielder => self.MID,
            Position::Forward => self.FWD,
        }
    }
}

// ---------------------------------------------------------------------------
// league.toml structs
// ---------------------------------------------------------------------------

/// Wrapper for the top-level `[league]` table in league.toml.
#[derive(Debug, Clone, Deserialize)]
struct LeagueFile {
    league: LeagueConfig,
}

/// Squad and lineup rules of the game. Prices are in tenths of a million.
#[derive(Debug, Clone, Deserialize)]
pub struct LeagueConfig {
    pub name: String,
    pub budget: u32,
    pub squad_size: usize,
    pub max_per_team: usize,
    pub transfer_hit_cost: f64,
    pub squad: PerPosition<usize>,
    pub formation: FormationLimits,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FormationLimits {
    pub starters: usize,
    pub min: PerPosition<usize>,
    pub max: PerPosition<usize>,
}

impl Default for LeagueConfig {
    fn default() -> Self {
        LeagueConfig {
            name: "Fantasy Premier League".into(),
            budget: 1000,
            squad_size: 15,
            max_per_team: 3,
            transfer_hit_cost: 4.0,
            squad: PerPosition { GK: 2, DEF: 5, MID: 5, FWD: 3 },
            formation: FormationLimits {
                starters: 11,
                min: PerPosition { GK: 1, DEF: 3, MID: 2, FWD: 1 },
                max: PerPosition { GK: 1, DEF: 5, MID: 5, FWD: 3 },
            },
        }
    }
}

// ---------------------------------------------------------------------------
// strategy.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire strategy.toml file.
#[derive(Debug, Clone, Deserialize)]
struct StrategyFile {
    #[serde(default)]
    scoring: ScoringParams,
    #[serde(default)]
    fixtures: FixtureParams,
    #[serde(default)]
    transfers: TransferParams,
    #[serde(default)]
    captaincy: CaptaincyParams,
    #[serde(default)]
    history: HistoryParams,
    #[serde(default)]
    solver: SolverParams,
    #[serde(default)]
    sources: SourcesConfig,
}

/// The public strategy config assembled from the strategy.toml sections.
#[derive(Debug, Clone, Default)]
pub struct StrategyConfig {
    pub scoring: ScoringParams,
    pub fixtures: FixtureParams,
    pub transfers: TransferParams,
    pub captaincy: CaptaincyParams,
    pub history: HistoryParams,
    pub solver: SolverParams,
}

/// Weights of the expected-points model and the selection score.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringParams {
    /// Number of recent matches feeding form, minutes and variance.
    pub form_window: usize,
    /// Weight multiplier applied per match of age (most recent = 1).
    pub form_decay: f64,
    /// Share of the base component in the base/form blend.
    pub base_blend: f64,
    pub goal_value: PerPosition<f64>,
    pub assist_value: f64,
    pub ppg_weight: f64,
    pub ict_weight: f64,
    pub position_multiplier: PerPosition<f64>,
    pub double_gameweek_multiplier: f64,
    pub availability_low: f64,
    pub availability_high: f64,
    pub doubtful_factor: f64,
    pub first_penalty_bonus: f64,
    pub second_penalty_bonus: f64,
    pub venue_weight: f64,
    pub venue_window: usize,
    pub max_predicted: f64,
    pub trend_threshold: f64,
    pub risk_low: f64,
    pub risk_high: f64,
    pub selection: SelectionWeights,
}

impl Default for ScoringParams {
    fn default() -> Self {
        ScoringParams {
            form_window: 5,
            form_decay: 0.75,
            base_blend: 0.6,
            goal_value: PerPosition { GK: 0.0, DEF: 6.0, MID: 5.0, FWD: 4.0 },
            assist_value: 3.0,
            ppg_weight: 0.6,
            ict_weight: 0.4,
            position_multiplier: PerPosition { GK: 0.9, DEF: 0.95, MID: 1.0, FWD: 1.05 },
            double_gameweek_multiplier: 1.45,
            availability_low: 0.5,
            availability_high: 0.75,
            doubtful_factor: 0.75,
            first_penalty_bonus: 0.6,
            second_penalty_bonus: 0.25,
            venue_weight: 0.05,
            venue_window: 3,
            max_predicted: 25.0,
            trend_threshold: 1.0,
            risk_low: 4.0,
            risk_high: 12.0,
            selection: SelectionWeights::default(),
        }
    }
}

/// Weights of the lineup selection score.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SelectionWeights {
    pub predicted: f64,
    pub shot_quality: f64,
    pub form: f64,
    pub fixture: f64,
    pub low_availability_factor: f64,
    pub double_gameweek_multiplier: f64,
}

impl Default for SelectionWeights {
    fn default() -> Self {
        SelectionWeights {
            predicted: 0.4,
            shot_quality: 0.3,
            form: 0.15,
            fixture: 0.2,
            low_availability_factor: 0.2,
            double_gameweek_multiplier: 1.3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FixtureParams {
    pub lookahead: u32,
    pub season_length: u32,
    /// Gameweeks in each half of the swing comparison.
    pub swing_window: usize,
    /// Minimum rank change before a team is IMPROVING or WORSENING.
    pub swing_threshold: i64,
    pub rotation_budget: u32,
    pub rotation_limit: usize,
}

impl Default for FixtureParams {
    fn default() -> Self {
        FixtureParams {
            lookahead: 6,
            season_length: 38,
            swing_window: 3,
            swing_threshold: 4,
            rotation_budget: 90,
            rotation_limit: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransferParams {
    pub candidates_per_out: usize,
    pub min_incoming_availability: f64,
    pub free_threshold: f64,
    pub hits_threshold: f64,
    pub wildcard_threshold: f64,
    pub max_hit_transfers: usize,
    pub roi_horizon: u32,
    pub home_boost: f64,
    pub away_factor: f64,
    pub unavailable_sale_bonus: f64,
    pub doubtful_sale_bonus: f64,
    pub markdown_rate: f64,
    pub max_markdown: u32,
}

impl Default for TransferParams {
    fn default() -> Self {
        TransferParams {
            candidates_per_out: 5,
            min_incoming_availability: 0.75,
            free_threshold: -0.1,
            hits_threshold: -2.0,
            wildcard_threshold: 0.0,
            max_hit_transfers: 5,
            roi_horizon: 3,
            home_boost: 1.1,
            away_factor: 0.95,
            unavailable_sale_bonus: 2.0,
            doubtful_sale_bonus: 1.0,
            markdown_rate: 0.05,
            max_markdown: 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptaincyParams {
    pub multiplier: f64,
    pub risk_discount: f64,
    pub differential_weight: f64,
}

impl Default for CaptaincyParams {
    fn default() -> Self {
        CaptaincyParams {
            multiplier: 2.0,
            risk_discount: 0.2,
            differential_weight: 0.3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HistoryParams {
    pub workers: usize,
    /// Players outside the squad whose history is fetched, by ownership.
    pub top_owned: usize,
}

impl Default for HistoryParams {
    fn default() -> Self {
        HistoryParams {
            workers: 20,
            top_owned: 250,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SolverParams {
    pub node_limit: u64,
}

impl Default for SolverParams {
    fn default() -> Self {
        SolverParams {
            node_limit: 2_000_000,
        }
    }
}

/// Where upstream data comes from and how long it is cached.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub base_url: String,
    pub cache_ttl_secs: u64,
    pub request_timeout_secs: u64,
    pub shot_quality_csv: Option<String>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        SourcesConfig {
            base_url: "https://fantasy.premierleague.com/api".into(),
            cache_ttl_secs: 300,
            request_timeout_secs: 20,
            shot_quality_csv: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/league.toml` and
/// `config/strategy.toml`, both relative to the given `base_dir`.
///
/// This is the lower-level loading primitive that does not auto-copy defaults.
/// Prefer `load_config()` which handles default initialization automatically.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    // --- league.toml (required) ---
    let league_path = config_dir.join("league.toml");
    let league_text = read_file(&league_path)?;
    let league_file: LeagueFile =
        toml::from_str(&league_text).map_err(|e| ConfigError::ParseError {
            path: league_path.clone(),
            source: e,
        })?;

    // --- strategy.toml (required) ---
    let strategy_path = config_dir.join("strategy.toml");
    let strategy_text = read_file(&strategy_path)?;
    let strategy_file: StrategyFile =
        toml::from_str(&strategy_text).map_err(|e| ConfigError::ParseError {
            path: strategy_path.clone(),
            source: e,
        })?;

    let config = Config {
        league: league_file.league,
        strategy: StrategyConfig {
            scoring: strategy_file.scoring,
            fixtures: strategy_file.fixtures,
            transfers: strategy_file.transfers,
            captaincy: strategy_file.captaincy,
            history: strategy_file.history,
            solver: strategy_file.solver,
        },
        sources: strategy_file.sources,
    };

    validate(&config)?;

    Ok(config)
}

/// Ensure all config files exist by copying missing ones from `defaults/`.
/// Returns the list of files that were copied. Skips `.example` files.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither defaults/ nor config/ directory found in {}",
                    base_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let entries = std::fs::read_dir(&defaults_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to read defaults directory: {e}"),
    })?;

    let mut copied = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to read defaults entry: {e}"),
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };
        if file_name.to_str().is_some_and(|n| n.ends_with(".example")) {
            continue;
        }
        let target = config_dir.join(file_name);

        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
        {
            Ok(mut dest) => {
                let content = std::fs::read(&path).map_err(|e| ConfigError::DefaultsCopyError {
                    message: format!("failed to read {}: {e}", path.display()),
                })?;
                std::io::Write::write_all(&mut dest, &content).map_err(|e| {
                    ConfigError::DefaultsCopyError {
                        message: format!("failed to write {}: {e}", target.display()),
                    }
                })?;
                copied.push(target);
            }
            // Never overwrite a user's edited config.
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(ConfigError::DefaultsCopyError {
                    message: format!("failed to create {}: {e}", target.display()),
                });
            }
        }
    }

    Ok(copied)
}

/// Convenience wrapper: loads config relative to `base_dir`, copying the
/// default files first.
pub fn load_config(base_dir: &Path) -> Result<Config, ConfigError> {
    ensure_config_files(base_dir)?;
    load_config_from(base_dir)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.into(),
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

pub fn validate(config: &Config) -> Result<(), ConfigError> {
    let league = &config.league;

    if league.budget == 0 {
        return Err(invalid("league.budget", "must be greater than 0"));
    }
    if league.max_per_team == 0 {
        return Err(invalid("league.max_per_team", "must be greater than 0"));
    }
    if !league.transfer_hit_cost.is_finite() || league.transfer_hit_cost < 0.0 {
        return Err(invalid(
            "league.transfer_hit_cost",
            format!("must be >= 0, got {}", league.transfer_hit_cost),
        ));
    }

    let composition: usize = Position::ALL.iter().map(|p| league.squad.get(*p)).sum();
    if composition != league.squad_size {
        return Err(invalid(
            "league.squad",
            format!(
                "position counts sum to {composition}, squad_size is {}",
                league.squad_size
            ),
        ));
    }

    let formation = &league.formation;
    for pos in Position::ALL {
        let (lo, hi) = (formation.min.get(pos), formation.max.get(pos));
        if lo > hi {
            return Err(invalid(
                &format!("league.formation.min.{}", pos.display_str()),
                format!("min {lo} exceeds max {hi}"),
            ));
        }
        if hi > league.squad.get(pos) {
            return Err(invalid(
                &format!("league.formation.max.{}", pos.display_str()),
                format!("max {hi} exceeds squad count {}", league.squad.get(pos)),
            ));
        }
    }
    let min_sum: usize = Position::ALL.iter().map(|p| formation.min.get(*p)).sum();
    let max_sum: usize = Position::ALL.iter().map(|p| formation.max.get(*p)).sum();
    if formation.starters < min_sum || formation.starters > max_sum {
        return Err(invalid(
            "league.formation.starters",
            format!(
                "{} is outside the formation bounds {min_sum}..={max_sum}",
                formation.starters
            ),
        ));
    }

    let strategy = &config.strategy;
    let s = &strategy.scoring;
    let weights: &[(&str, f64)] = &[
        ("scoring.form_decay", s.form_decay),
        ("scoring.base_blend", s.base_blend),
        ("scoring.assist_value", s.assist_value),
        ("scoring.ppg_weight", s.ppg_weight),
        ("scoring.ict_weight", s.ict_weight),
        ("scoring.double_gameweek_multiplier", s.double_gameweek_multiplier),
        ("scoring.doubtful_factor", s.doubtful_factor),
        ("scoring.first_penalty_bonus", s.first_penalty_bonus),
        ("scoring.second_penalty_bonus", s.second_penalty_bonus),
        ("scoring.venue_weight", s.venue_weight),
        ("scoring.max_predicted", s.max_predicted),
        ("scoring.selection.predicted", s.selection.predicted),
        ("scoring.selection.shot_quality", s.selection.shot_quality),
        ("scoring.selection.form", s.selection.form),
        ("scoring.selection.fixture", s.selection.fixture),
        ("captaincy.multiplier", strategy.captaincy.multiplier),
        ("captaincy.risk_discount", strategy.captaincy.risk_discount),
        ("captaincy.differential_weight", strategy.captaincy.differential_weight),
    ];
    for (name, val) in weights {
        if !val.is_finite() || *val < 0.0 {
            return Err(invalid(name, format!("must be finite and >= 0, got {val}")));
        }
    }
    for pos in Position::ALL {
        let m = s.position_multiplier.get(pos);
        if !m.is_finite() || m <= 0.0 {
            return Err(invalid(
                &format!("scoring.position_multiplier.{}", pos.display_str()),
                format!("must be > 0, got {m}"),
            ));
        }
    }
    if !(0.0..=1.0).contains(&s.base_blend) {
        return Err(invalid(
            "scoring.base_blend",
            format!("must be between 0.0 and 1.0 inclusive, got {}", s.base_blend),
        ));
    }
    if s.availability_low > s.availability_high {
        return Err(invalid(
            "scoring.availability_low",
            "must not exceed scoring.availability_high",
        ));
    }
    if s.form_window == 0 {
        return Err(invalid("scoring.form_window", "must be > 0"));
    }

    let f = &strategy.fixtures;
    if f.lookahead == 0 {
        return Err(invalid("fixtures.lookahead", "must be > 0"));
    }
    if f.swing_window == 0 {
        return Err(invalid("fixtures.swing_window", "must be > 0"));
    }
    if f.season_length == 0 {
        return Err(invalid("fixtures.season_length", "must be > 0"));
    }

    let t = &strategy.transfers;
    if t.candidates_per_out == 0 {
        return Err(invalid("transfers.candidates_per_out", "must be > 0"));
    }
    if !(0.0..=1.0).contains(&t.markdown_rate) {
        return Err(invalid(
            "transfers.markdown_rate",
            format!("must be between 0.0 and 1.0 inclusive, got {}", t.markdown_rate),
        ));
    }

    if strategy.history.workers == 0 {
        return Err(invalid("history.workers", "must be > 0"));
    }
    if strategy.solver.node_limit == 0 {
        return Err(invalid("solver.node_limit", "must be > 0"));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
