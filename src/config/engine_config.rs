//! Engine Configuration - boost tables, lifecycle rules and batch settings
//!
//! One TOML document describes the whole engine. It is loaded once, validated,
//! and handed to every component constructor by reference. Sections that the
//! trending algorithm depends on are required; a missing one refuses startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::boosts::{
    BaseScoreConfig, GenderBoosts, GrowthConfig, LimitsConfig, LookupTable, PopularityBoosts,
    QualityBoosts, RecencyBoosts, SeriesKeywordsBoosts, StatusBoosts,
};
use super::defaults;
use super::lifecycle_rules::{PeriodsConfig, ScoringConfig, ThresholdsConfig};

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for the trending engine and lifecycle manager.
///
/// Load with `EngineConfig::load()` which searches:
/// 1. `$TRENDWATCH_CONFIG` env var
/// 2. `./trending_config.toml`
///
/// There is no fallback to built-in defaults when neither exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub algorithm: AlgorithmConfig,

    pub base_score: BaseScoreConfig,
    pub gender_boosts: GenderBoosts,
    pub popularity_boosts: PopularityBoosts,
    pub status_boosts: StatusBoosts,
    pub recency_boosts: RecencyBoosts,
    pub format_boosts: LookupTable,
    pub role_boosts: LookupTable,
    pub series_keywords_boosts: SeriesKeywordsBoosts,
    #[serde(default)]
    pub quality_boosts: QualityBoosts,
    pub limits: LimitsConfig,
    #[serde(default)]
    pub growth: GrowthConfig,

    pub periods: PeriodsConfig,
    pub thresholds: ThresholdsConfig,
    pub scoring: ScoringConfig,

    #[serde(default)]
    pub aggregation: AggregationConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub batch: BatchConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            algorithm: AlgorithmConfig::default(),
            base_score: BaseScoreConfig::default(),
            gender_boosts: GenderBoosts::default(),
            popularity_boosts: PopularityBoosts::default(),
            status_boosts: StatusBoosts::default(),
            recency_boosts: RecencyBoosts::default(),
            format_boosts: LookupTable::default_formats(),
            role_boosts: LookupTable::default_roles(),
            series_keywords_boosts: SeriesKeywordsBoosts::default(),
            quality_boosts: QualityBoosts::default(),
            limits: LimitsConfig::default(),
            growth: GrowthConfig::default(),
            periods: PeriodsConfig::default(),
            thresholds: ThresholdsConfig::default(),
            scoring: ScoringConfig::default(),
            aggregation: AggregationConfig::default(),
            retention: RetentionConfig::default(),
            batch: BatchConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration using the standard search order:
    /// 1. `$TRENDWATCH_CONFIG` environment variable
    /// 2. `./trending_config.toml` in the current working directory
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var(defaults::CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if !p.exists() {
                return Err(ConfigError::NotFound(format!(
                    "{} points to non-existent file {}",
                    defaults::CONFIG_ENV_VAR,
                    p.display()
                )));
            }
            let config = Self::load_from_file(&p)?;
            info!(path = %p.display(), version = %config.algorithm.version, "Loaded engine config from TRENDWATCH_CONFIG");
            return Ok(config);
        }

        let local = PathBuf::from(defaults::DEFAULT_CONFIG_FILE);
        if local.exists() {
            let config = Self::load_from_file(&local)?;
            info!(version = %config.algorithm.version, "Loaded engine config from ./trending_config.toml");
            return Ok(config);
        }

        Err(ConfigError::NotFound(format!(
            "set {} or create ./{}",
            defaults::CONFIG_ENV_VAR,
            defaults::DEFAULT_CONFIG_FILE
        )))
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::parse_with_origin(&contents, path)
    }

    /// Parse and validate an in-memory TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Self::parse_with_origin(contents, Path::new("<inline>"))
    }

    fn parse_with_origin(contents: &str, origin: &Path) -> Result<Self, ConfigError> {
        // Two-pass: check for unknown keys first (warnings only)
        for w in &super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(contents)
            .map_err(|e| ConfigError::Parse(origin.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validate every section for internal consistency.
    ///
    /// All errors are collected and reported together; warnings are logged.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (errors, warnings) = super::validation::validate_ranges(self);
        for w in &warnings {
            warn!("{}", w);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config I/O error ({path}): {1}", path = .0.display())]
    Io(PathBuf, #[source] std::io::Error),
    #[error("config parse error ({path}): {1}", path = .0.display())]
    Parse(PathBuf, #[source] toml::de::Error),
    #[error("config serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("config validation failed:\n  - {}", .0.join("\n  - "))]
    Validation(Vec<String>),
    #[error("no config file found: {0}")]
    NotFound(String),
}

// ============================================================================
// Algorithm
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmConfig {
    /// Stamped onto every TrendingScore
    #[serde(default = "default_algorithm_version")]
    pub version: String,
}

fn default_algorithm_version() -> String {
    "v3.0".to_string()
}

impl Default for AlgorithmConfig {
    fn default() -> Self {
        Self {
            version: default_algorithm_version(),
        }
    }
}

// ============================================================================
// Aggregation
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Growth rates within +/- this band classify as stable
    #[serde(default = "default_trend_stable_band")]
    pub trend_stable_band: f64,
}

fn default_trend_stable_band() -> f64 { 0.05 }

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            trend_stable_band: default_trend_stable_band(),
        }
    }
}

// ============================================================================
// Retention
// ============================================================================

/// How long aggregates of each period type are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_daily_days")]
    pub daily_days: u32,
    #[serde(default = "default_weekly_weeks")]
    pub weekly_weeks: u32,
    #[serde(default = "default_monthly_months")]
    pub monthly_months: u32,
    #[serde(default = "default_yearly_years")]
    pub yearly_years: u32,
}

fn default_daily_days() -> u32 { 30 }
fn default_weekly_weeks() -> u32 { 52 }
fn default_monthly_months() -> u32 { 24 }
fn default_yearly_years() -> u32 { 5 }

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            daily_days: default_daily_days(),
            weekly_weeks: default_weekly_weeks(),
            monthly_months: default_monthly_months(),
            yearly_years: default_yearly_years(),
        }
    }
}

// ============================================================================
// Batch
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Worker threads for per-entity evaluation
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Holds the sled database and the process lock file
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

fn default_max_concurrency() -> usize { 8 }
fn default_data_dir() -> String {
    defaults::DEFAULT_DATA_DIR.to_string()
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            data_dir: default_data_dir(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
