//! Lifecycle configuration: periods, decision thresholds, composite scoring

use serde::{Deserialize, Serialize};

// ============================================================================
// Periods
// ============================================================================

/// Stage timers, in days.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodsConfig {
    /// Wait after release before the first decision
    pub grace_period_days: u32,
    /// Wait after an EXTEND_GRACE verdict before the next decision
    pub extended_grace_days: u32,
    /// Time in ARCHIVED before a series becomes READY_FOR_DELETION
    pub cleanup_days: u32,
}

impl Default for PeriodsConfig {
    fn default() -> Self {
        Self {
            grace_period_days: 42,
            extended_grace_days: 28,
            cleanup_days: 90,
        }
    }
}

// ============================================================================
// Thresholds
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeepActiveThresholds {
    pub min_composite_score: f64,
    pub min_popularity: f64,
    pub min_favourites: f64,
    pub min_character_trending: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtendGraceThresholds {
    /// Fraction of `keep_active.min_composite_score`, in (0, 1]
    pub min_composite_score_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdsConfig {
    pub keep_active: KeepActiveThresholds,
    pub extend_grace: ExtendGraceThresholds,
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            keep_active: KeepActiveThresholds {
                min_composite_score: 50.0,
                min_popularity: 30.0,
                min_favourites: 100.0,
                min_character_trending: 70.0,
            },
            extend_grace: ExtendGraceThresholds {
                min_composite_score_ratio: 0.7,
            },
        }
    }
}

impl ThresholdsConfig {
    /// Minimum composite score for EXTEND_GRACE.
    pub fn extend_grace_score(&self) -> f64 {
        self.keep_active.min_composite_score * self.extend_grace.min_composite_score_ratio
    }
}

// ============================================================================
// Composite Scoring
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub popularity: f64,
    pub favourites: f64,
    pub trending: f64,
    /// Per-character contribution; excluded from the weight-sum check
    pub character_count_multiplier: f64,
    pub avg_character_trending: f64,
    pub max_character_trending: f64,
}

impl ScoringWeights {
    /// Sum of the fractional weights.
    pub fn fractional_sum(&self) -> f64 {
        self.popularity
            + self.favourites
            + self.trending
            + self.avg_character_trending
            + self.max_character_trending
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighEngagementBonus {
    #[serde(default = "default_engagement_threshold")]
    pub min_max_character_trending: f64,
    pub bonus_multiplier: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalBonus {
    /// Start dates within this many days of the evaluation date qualify
    #[serde(default = "default_seasonal_window")]
    pub window_days: u32,
    pub bonus_multiplier: f64,
}

fn default_engagement_threshold() -> f64 { 80.0 }
fn default_seasonal_window() -> u32 { 90 }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BonusConditions {
    pub high_character_engagement: HighEngagementBonus,
    pub seasonal_relevance: SeasonalBonus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub weights: ScoringWeights,
    pub bonus_conditions: BonusConditions,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: ScoringWeights {
                popularity: 0.3,
                favourites: 0.2,
                trending: 0.2,
                character_count_multiplier: 5.0,
                avg_character_trending: 0.2,
                max_character_trending: 0.1,
            },
            bonus_conditions: BonusConditions {
                high_character_engagement: HighEngagementBonus {
                    min_max_character_trending: default_engagement_threshold(),
                    bonus_multiplier: 1.2,
                },
                seasonal_relevance: SeasonalBonus {
                    window_days: default_seasonal_window(),
                    bonus_multiplier: 1.1,
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_weights_sum_to_one() {
        let s = ScoringConfig::default();
        assert!((s.weights.fractional_sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_extend_grace_score() {
        let t = ThresholdsConfig::default();
        assert!((t.extend_grace_score() - 35.0).abs() < 1e-9);
    }

    #[test]
    fn test_bonus_threshold_defaults_when_omitted() {
        let toml_str = r#"
[weights]
popularity = 0.3
favourites = 0.2
trending = 0.2
character_count_multiplier = 5
avg_character_trending = 0.2
max_character_trending = 0.1

[bonus_conditions.high_character_engagement]
bonus_multiplier = 1.3

[bonus_conditions.seasonal_relevance]
bonus_multiplier = 1.05
"#;
        let s: ScoringConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(s.bonus_conditions.high_character_engagement.min_max_character_trending, 80.0);
        assert_eq!(s.bonus_conditions.seasonal_relevance.window_days, 90);
        assert_eq!(s.weights.character_count_multiplier, 5.0);
    }
}
