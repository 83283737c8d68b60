//! Lifecycle decision: composite score and KEEP_ACTIVE / EXTEND_GRACE / ARCHIVE
//!
//! Pure function of the series metrics, the rules and the evaluation date.
//! Nothing here reads or writes stored state.

use chrono::{Duration, NaiveDate};
use tracing::debug;

use super::rules::LifecycleRulesManager;
use crate::types::{CompositeFactors, LifecycleAction, LifecycleDecision, SeriesMetrics};

pub struct LifecycleDecisionMaker {
    rules: LifecycleRulesManager,
}

impl LifecycleDecisionMaker {
    pub fn new(rules: LifecycleRulesManager) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &LifecycleRulesManager {
        &self.rules
    }

    /// Weighted sum of the series metrics with bonus multipliers applied,
    /// rounded to two decimals.
    pub fn composite(&self, m: &SeriesMetrics, today: NaiveDate) -> CompositeFactors {
        let w = self.rules.weights();
        let b = self.rules.bonuses();

        let mut f = CompositeFactors {
            popularity: m.popularity as f64 * w.popularity,
            favourites: m.favourites as f64 * w.favourites,
            trending: m.trending * w.trending,
            character_count: f64::from(m.character_count) * w.character_count_multiplier,
            avg_character_trending: m.avg_character_trending * w.avg_character_trending,
            max_character_trending: m.max_character_trending * w.max_character_trending,
            ..CompositeFactors::default()
        };
        let mut score = f.popularity
            + f.favourites
            + f.trending
            + f.character_count
            + f.avg_character_trending
            + f.max_character_trending;

        if m.max_character_trending >= b.high_character_engagement.min_max_character_trending {
            score *= b.high_character_engagement.bonus_multiplier;
            f.high_engagement_bonus = true;
        }
        if let Some(start) = m.start_date {
            let window_start = today - Duration::days(i64::from(b.seasonal_relevance.window_days));
            if start >= window_start {
                score *= b.seasonal_relevance.bonus_multiplier;
                f.seasonal_bonus = true;
            }
        }

        f.weighted_sum = round2(score);
        f
    }

    pub fn decide(&self, m: &SeriesMetrics, today: NaiveDate) -> LifecycleDecision {
        let factors = self.composite(m, today);
        let score = factors.weighted_sum;
        let t = self.rules.thresholds();
        let ka = &t.keep_active;

        let popularity = m.popularity as f64;
        let favourites = m.favourites as f64;

        let (action, reason) = if score >= ka.min_composite_score
            && (popularity >= ka.min_popularity
                || favourites >= ka.min_favourites
                || m.max_character_trending >= ka.min_character_trending)
        {
            (
                LifecycleAction::KeepActive,
                format!(
                    "high performance: score={score}, pop={}, fav={}, char_trending={}",
                    m.popularity, m.favourites, m.max_character_trending
                ),
            )
        } else if score >= t.extend_grace_score()
            && (m.popularity > 0
                || m.trending > 0.0
                || m.character_count > 0
                || m.max_character_trending > 0.0)
        {
            (
                LifecycleAction::ExtendGrace,
                format!("moderate performance with activity, extending grace: score={score}"),
            )
        } else {
            (
                LifecycleAction::Archive,
                format!(
                    "insufficient performance: score={score} < {:.2}",
                    t.extend_grace_score()
                ),
            )
        };

        debug!(series_id = m.series_id, action = %action, composite = score, "Lifecycle decision");

        LifecycleDecision {
            action,
            reason,
            composite_score: score,
            factors,
        }
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
