//! Scoring configuration: base score, boost tables, multiplier limits, growth
//!
//! The sections named by the trending algorithm are required in the TOML
//! document; only `growth` and `quality_boosts` carry built-in defaults.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Base Score
// ============================================================================

/// `base = log10(max(favourites, min_favourites) + 1) * multiplier`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseScoreConfig {
    /// Favourites floor; must be >= 1 so the base score is never zero
    pub min_favourites: u64,
    pub multiplier: f64,
}

impl Default for BaseScoreConfig {
    fn default() -> Self {
        Self {
            min_favourites: 1,
            multiplier: 100.0,
        }
    }
}

// ============================================================================
// Gender
// ============================================================================

/// Gender multipliers keyed by gender (`FEMALE`, `Non-binary`, ...).
///
/// Keys and looked-up values are compared after `normalise_key`, so `Female`
/// and `FEMALE` name the same entry. A missing or unlisted gender uses
/// `unknown`, which is deliberately not 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenderBoosts {
    pub unknown: f64,
    #[serde(flatten)]
    pub values: BTreeMap<String, f64>,
}

impl GenderBoosts {
    pub fn lookup(&self, gender: Option<&str>) -> f64 {
        gender
            .and_then(|g| lookup_normalised(&self.values, g))
            .unwrap_or(self.unknown)
    }

    /// Pairs of keys that collapse onto the same normalised key.
    pub fn colliding_keys(&self) -> Vec<(String, String)> {
        colliding_keys(&self.values)
    }
}

impl Default for GenderBoosts {
    fn default() -> Self {
        let values = [("FEMALE", 1.4), ("MALE", 1.0), ("NON_BINARY", 1.2)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        Self {
            unknown: 0.95,
            values,
        }
    }
}

/// `"Non-binary"` -> `"NON_BINARY"`
pub fn normalise_key(raw: &str) -> String {
    normalised_chars(raw).collect()
}

fn normalised_chars(raw: &str) -> impl Iterator<Item = char> + '_ {
    raw.trim()
        .chars()
        .map(|c| if c == '-' || c == ' ' { '_' } else { c.to_ascii_uppercase() })
}

/// Table keys are kept as written in the file; match on the normalised form.
fn lookup_normalised(values: &BTreeMap<String, f64>, raw: &str) -> Option<f64> {
    let wanted = normalise_key(raw);
    values
        .iter()
        .find(|(k, _)| normalised_chars(k).eq(wanted.chars()))
        .map(|(_, v)| *v)
}

fn colliding_keys(values: &BTreeMap<String, f64>) -> Vec<(String, String)> {
    let mut seen: BTreeMap<String, &String> = BTreeMap::new();
    let mut out = Vec::new();
    for k in values.keys() {
        if let Some(first) = seen.insert(normalise_key(k), k) {
            out.push((first.clone(), k.clone()));
        }
    }
    out
}

// ============================================================================
// Popularity Tiers
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopularityTier {
    pub min_favourites: u64,
    pub boost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopularityBoosts {
    pub tiers: Vec<PopularityTier>,
}

impl Default for PopularityBoosts {
    fn default() -> Self {
        Self {
            tiers: vec![
                PopularityTier { min_favourites: 30_000, boost: 1.15 },
                PopularityTier { min_favourites: 20_000, boost: 1.10 },
                PopularityTier { min_favourites: 10_000, boost: 1.05 },
            ],
        }
    }
}

// ============================================================================
// Status
// ============================================================================

/// RELEASING multipliers by days elapsed since the start date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleasingBoosts {
    pub new_days: i64,
    pub new: f64,
    pub current_days: i64,
    pub current: f64,
    pub long_running: f64,
}

/// FINISHED multipliers by days elapsed since the end date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinishedBoosts {
    pub recent_days: i64,
    pub recent: f64,
    pub semi_recent_days: i64,
    pub semi_recent: f64,
    pub old: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusBoosts {
    #[serde(rename = "NOT_YET_RELEASED")]
    pub not_yet_released: f64,
    #[serde(rename = "CANCELLED")]
    pub cancelled: f64,
    #[serde(rename = "HIATUS")]
    pub hiatus: f64,
    #[serde(rename = "RELEASING")]
    pub releasing: ReleasingBoosts,
    #[serde(rename = "FINISHED")]
    pub finished: FinishedBoosts,
}

impl Default for StatusBoosts {
    fn default() -> Self {
        Self {
            not_yet_released: 1.3,
            cancelled: 0.7,
            hiatus: 0.7,
            releasing: ReleasingBoosts {
                new_days: 30,
                new: 2.5,
                current_days: 365,
                current: 1.8,
                long_running: 1.2,
            },
            finished: FinishedBoosts {
                recent_days: 90,
                recent: 1.5,
                semi_recent_days: 365,
                semi_recent: 1.1,
                old: 0.9,
            },
        }
    }
}

// ============================================================================
// Recency
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecencyTier {
    pub max_years_ago: i32,
    pub boost: f64,
}

/// Tiers are evaluated in file order; the first `years_ago <= max_years_ago` wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecencyBoosts {
    /// Pinned reference year; absent means the year of the evaluation instant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_year: Option<i32>,
    pub tiers: Vec<RecencyTier>,
}

impl Default for RecencyBoosts {
    fn default() -> Self {
        Self {
            current_year: None,
            tiers: vec![
                RecencyTier { max_years_ago: 0, boost: 1.3 },
                RecencyTier { max_years_ago: 1, boost: 1.15 },
                RecencyTier { max_years_ago: 3, boost: 1.05 },
            ],
        }
    }
}

// ============================================================================
// Format / Role Tables
// ============================================================================

/// Free-form lookup table with a configured fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupTable {
    pub default: f64,
    #[serde(flatten)]
    pub values: BTreeMap<String, f64>,
}

impl LookupTable {
    pub fn lookup(&self, key: Option<&str>) -> f64 {
        key.and_then(|k| lookup_normalised(&self.values, k))
            .unwrap_or(self.default)
    }

    pub fn colliding_keys(&self) -> Vec<(String, String)> {
        colliding_keys(&self.values)
    }

    fn from_pairs(default: f64, pairs: &[(&str, f64)]) -> Self {
        Self {
            default,
            values: pairs.iter().map(|(k, v)| ((*k).to_string(), *v)).collect(),
        }
    }

    pub fn default_formats() -> Self {
        Self::from_pairs(
            1.0,
            &[("TV", 1.1), ("TV_SHORT", 1.0), ("MOVIE", 1.0), ("ONA", 1.0), ("OVA", 0.95), ("SPECIAL", 0.9)],
        )
    }

    pub fn default_roles() -> Self {
        Self::from_pairs(1.0, &[("MAIN", 1.0), ("SUPPORTING", 1.3), ("BACKGROUND", 1.5)])
    }
}

// ============================================================================
// Series Keywords
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordGroup {
    pub keywords: Vec<String>,
    pub boost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesKeywordsBoosts {
    pub default_boost: f64,
    pub trending_keywords: Vec<KeywordGroup>,
}

impl Default for SeriesKeywordsBoosts {
    fn default() -> Self {
        Self {
            default_boost: 1.0,
            trending_keywords: vec![KeywordGroup {
                keywords: vec![
                    "jujutsu".to_string(),
                    "one piece".to_string(),
                    "demon slayer".to_string(),
                ],
                boost: 1.1,
            }],
        }
    }
}

// ============================================================================
// Quality (optional)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityTier {
    pub min_average_score: f64,
    pub boost: f64,
}

/// Tiered boost on `average_score`. Empty tiers make the boost neutral.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityBoosts {
    #[serde(default)]
    pub tiers: Vec<QualityTier>,
}

// ============================================================================
// Limits
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitsConfig {
    pub min_total_multiplier: f64,
    pub max_total_multiplier: f64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            min_total_multiplier: 0.5,
            max_total_multiplier: 5.0,
        }
    }
}

impl LimitsConfig {
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min_total_multiplier, self.max_total_multiplier)
    }
}

// ============================================================================
// Growth (optional)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lookback {
    pub days: u32,
    pub weight: f64,
}

/// Momentum term: weighted favourites growth at fixed lookback points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthConfig {
    #[serde(default = "default_growth_min")]
    pub min_multiplier: f64,
    #[serde(default = "default_growth_max")]
    pub max_multiplier: f64,
    #[serde(default = "default_lookbacks")]
    pub lookbacks: Vec<Lookback>,
}

fn default_growth_min() -> f64 { 0.1 }
fn default_growth_max() -> f64 { 5.0 }
fn default_lookbacks() -> Vec<Lookback> {
    vec![
        Lookback { days: 7, weight: 0.5 },
        Lookback { days: 30, weight: 0.3 },
        Lookback { days: 90, weight: 0.2 },
    ]
}

impl Default for GrowthConfig {
    fn default() -> Self {
        Self {
            min_multiplier: default_growth_min(),
            max_multiplier: default_growth_max(),
            lookbacks: default_lookbacks(),
        }
    }
}
