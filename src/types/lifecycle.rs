//! Series lifecycle types: LifecycleStage, LifecycleRecord, SeriesMetrics,
//! LifecycleAction, LifecycleDecision

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ReleaseStatus;

// ============================================================================
// Stage
// ============================================================================

/// Tracking stage of a series. Exactly one per series at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleStage {
    Upcoming,
    GracePeriod,
    ExtendedGrace,
    ActiveTracking,
    Archived,
    ReadyForDeletion,
}

impl LifecycleStage {
    pub const ALL: [LifecycleStage; 6] = [
        LifecycleStage::Upcoming,
        LifecycleStage::GracePeriod,
        LifecycleStage::ExtendedGrace,
        LifecycleStage::ActiveTracking,
        LifecycleStage::Archived,
        LifecycleStage::ReadyForDeletion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleStage::Upcoming => "UPCOMING",
            LifecycleStage::GracePeriod => "GRACE_PERIOD",
            LifecycleStage::ExtendedGrace => "EXTENDED_GRACE",
            LifecycleStage::ActiveTracking => "ACTIVE_TRACKING",
            LifecycleStage::Archived => "ARCHIVED",
            LifecycleStage::ReadyForDeletion => "READY_FOR_DELETION",
        }
    }

    /// Grace stages wait for their timer before any decision is applied.
    pub fn is_grace(&self) -> bool {
        matches!(self, LifecycleStage::GracePeriod | LifecycleStage::ExtendedGrace)
    }
}

impl fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LifecycleStage::ALL
            .into_iter()
            .find(|stage| stage.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| s.to_string())
    }
}

// ============================================================================
// Record
// ============================================================================

/// Persisted lifecycle state of one series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleRecord {
    pub series_id: u64,
    pub stage: LifecycleStage,
    /// Set on every entry into GRACE_PERIOD or EXTENDED_GRACE
    pub grace_period_start: Option<DateTime<Utc>>,
    /// Set on entry into ARCHIVED
    pub archived_at: Option<DateTime<Utc>>,
    pub evaluation_score: Option<f64>,
    pub last_evaluation_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl LifecycleRecord {
    /// A newly tracked series.
    pub fn upcoming(series_id: u64) -> Self {
        Self {
            series_id,
            stage: LifecycleStage::Upcoming,
            grace_period_start: None,
            archived_at: None,
            evaluation_score: None,
            last_evaluation_at: None,
            notes: None,
        }
    }
}

// ============================================================================
// Decision Inputs / Outputs
// ============================================================================

/// Current metrics of a series plus summaries of its characters' trending scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesMetrics {
    pub series_id: u64,
    #[serde(default)]
    pub popularity: u64,
    #[serde(default)]
    pub favourites: u64,
    /// The series' own trending score
    #[serde(default)]
    pub trending: f64,
    #[serde(default)]
    pub character_count: u32,
    #[serde(default)]
    pub avg_character_trending: f64,
    #[serde(default)]
    pub max_character_trending: f64,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub status: Option<ReleaseStatus>,
}

impl SeriesMetrics {
    pub fn new(series_id: u64) -> Self {
        Self {
            series_id,
            popularity: 0,
            favourites: 0,
            trending: 0.0,
            character_count: 0,
            avg_character_trending: 0.0,
            max_character_trending: 0.0,
            start_date: None,
            status: None,
        }
    }

    /// Fill the character summary fields from the characters' final scores.
    pub fn with_character_scores(mut self, scores: &[f64]) -> Self {
        self.character_count = u32::try_from(scores.len()).unwrap_or(u32::MAX);
        if scores.is_empty() {
            self.avg_character_trending = 0.0;
            self.max_character_trending = 0.0;
        } else {
            self.avg_character_trending = scores.iter().sum::<f64>() / scores.len() as f64;
            self.max_character_trending = scores.iter().copied().fold(f64::MIN, f64::max);
        }
        self
    }
}

/// One entry of a lifecycle batch: the series' metrics plus its characters.
///
/// Stored snapshots for the series and for `character_ids` take precedence
/// over the trending fields supplied in `metrics`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesInput {
    #[serde(flatten)]
    pub metrics: SeriesMetrics,
    #[serde(default)]
    pub character_ids: Vec<u64>,
}

impl From<SeriesMetrics> for SeriesInput {
    fn from(metrics: SeriesMetrics) -> Self {
        Self {
            metrics,
            character_ids: Vec::new(),
        }
    }
}

/// Lifecycle verdict for one series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleAction {
    KeepActive,
    ExtendGrace,
    Archive,
}

impl fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LifecycleAction::KeepActive => "KEEP_ACTIVE",
            LifecycleAction::ExtendGrace => "EXTEND_GRACE",
            LifecycleAction::Archive => "ARCHIVE",
        })
    }
}

/// Weighted contributions and bonuses behind a composite score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CompositeFactors {
    pub popularity: f64,
    pub favourites: f64,
    pub trending: f64,
    pub character_count: f64,
    pub avg_character_trending: f64,
    pub max_character_trending: f64,
    pub weighted_sum: f64,
    pub high_engagement_bonus: bool,
    pub seasonal_bonus: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleDecision {
    pub action: LifecycleAction,
    pub reason: String,
    pub composite_score: f64,
    pub factors: CompositeFactors,
}
