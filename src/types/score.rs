//! Output types: BoostCategory, BoostBreakdown, EvaluationFault, TrendingScore

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::{EntityKey, EntityType};

// ============================================================================
// Boost Categories
// ============================================================================

/// Named multiplier categories applied by the boost pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoostCategory {
    Gender,
    Popularity,
    Status,
    Recency,
    Format,
    Role,
    Keyword,
    Quality,
}

impl BoostCategory {
    pub const ALL: [BoostCategory; 8] = [
        BoostCategory::Gender,
        BoostCategory::Popularity,
        BoostCategory::Status,
        BoostCategory::Recency,
        BoostCategory::Format,
        BoostCategory::Role,
        BoostCategory::Keyword,
        BoostCategory::Quality,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BoostCategory::Gender => "gender",
            BoostCategory::Popularity => "popularity",
            BoostCategory::Status => "status",
            BoostCategory::Recency => "recency",
            BoostCategory::Format => "format",
            BoostCategory::Role => "role",
            BoostCategory::Keyword => "keyword",
            BoostCategory::Quality => "quality",
        }
    }
}

impl fmt::Display for BoostCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-category multipliers plus the unclamped and clamped pipeline totals.
///
/// Every category defaults to the neutral 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoostBreakdown {
    pub gender: f64,
    pub popularity: f64,
    pub status: f64,
    pub recency: f64,
    pub format: f64,
    pub role: f64,
    pub keyword: f64,
    pub quality: f64,
    /// Product of every category multiplier, before limits
    pub raw_total: f64,
    /// `raw_total` clamped to the configured multiplier limits
    pub capped_total: f64,
}

impl Default for BoostBreakdown {
    fn default() -> Self {
        Self {
            gender: 1.0,
            popularity: 1.0,
            status: 1.0,
            recency: 1.0,
            format: 1.0,
            role: 1.0,
            keyword: 1.0,
            quality: 1.0,
            raw_total: 1.0,
            capped_total: 1.0,
        }
    }
}

impl BoostBreakdown {
    pub fn get(&self, category: BoostCategory) -> f64 {
        match category {
            BoostCategory::Gender => self.gender,
            BoostCategory::Popularity => self.popularity,
            BoostCategory::Status => self.status,
            BoostCategory::Recency => self.recency,
            BoostCategory::Format => self.format,
            BoostCategory::Role => self.role,
            BoostCategory::Keyword => self.keyword,
            BoostCategory::Quality => self.quality,
        }
    }

    pub fn set(&mut self, category: BoostCategory, value: f64) {
        let slot = match category {
            BoostCategory::Gender => &mut self.gender,
            BoostCategory::Popularity => &mut self.popularity,
            BoostCategory::Status => &mut self.status,
            BoostCategory::Recency => &mut self.recency,
            BoostCategory::Format => &mut self.format,
            BoostCategory::Role => &mut self.role,
            BoostCategory::Keyword => &mut self.keyword,
            BoostCategory::Quality => &mut self.quality,
        };
        *slot = value;
    }
}

// ============================================================================
// Evaluation Faults
// ============================================================================

/// Where a recovered per-entity fault originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "category")]
pub enum FaultSource {
    Boost(BoostCategory),
    Growth,
}

impl fmt::Display for FaultSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultSource::Boost(c) => write!(f, "boost:{c}"),
            FaultSource::Growth => f.write_str("growth"),
        }
    }
}

/// A boost or growth computation that failed for one entity.
///
/// Never propagated: the neutral multiplier is substituted and the fault is
/// recorded on the score's metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationFault {
    pub source: FaultSource,
    pub message: String,
}

impl fmt::Display for EvaluationFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.message)
    }
}

// ============================================================================
// Trending Score
// ============================================================================

/// Growth computation detail for one lookback window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LookbackGrowth {
    pub days: u32,
    pub weight: f64,
    /// Favourites at the lookback point, absent on a history gap
    pub historical: Option<u64>,
    pub growth: f64,
}

/// Open-ended score metadata. Nothing in here drives control flow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreMetadata {
    #[serde(default)]
    pub faults: Vec<EvaluationFault>,
    #[serde(default)]
    pub growth: Vec<LookbackGrowth>,
    /// 1 = highest final score in the evaluation pass
    #[serde(default)]
    pub popularity_rank: Option<u32>,
    #[serde(default)]
    pub debug: BTreeMap<String, serde_json::Value>,
}

/// One evaluation result for one entity. Append-only, never mutated.
///
/// Invariant: `final_score == base_score * total_multiplier`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendingScore {
    pub entity_id: u64,
    pub entity_type: EntityType,
    /// Wall-clock time the row was produced
    pub timestamp: DateTime<Utc>,
    /// Evaluation instant; all time-dependent boosts and history lookups use it
    pub as_of: DateTime<Utc>,
    pub favourites: u64,
    pub base_score: f64,
    pub boosts: BoostBreakdown,
    pub growth_multiplier: f64,
    pub total_multiplier: f64,
    pub final_score: f64,
    pub algorithm_version: String,
    #[serde(default)]
    pub metadata: ScoreMetadata,
}

impl TrendingScore {
    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.entity_type, self.entity_id)
    }

    pub fn has_faults(&self) -> bool {
        !self.metadata.faults.is_empty()
    }
}
