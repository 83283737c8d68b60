//! Trend analysis over raw snapshots: rising entities and score velocity.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use statrs::statistics::Statistics;
use std::collections::BTreeMap;

use crate::config::defaults::VELOCITY_FULL_CONFIDENCE_POINTS;
use crate::types::{EntityKey, TrendingScore};

/// An entity whose recent mean score beat its older mean.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RisingEntity {
    pub key: EntityKey,
    pub recent_mean: f64,
    pub previous_mean: f64,
    pub improvement: f64,
    pub improvement_pct: f64,
    pub data_points: usize,
}

/// Entities whose mean `final_score` since `now - lookback_days` improved by
/// at least `min_improvement_pct` percent over their earlier mean.
///
/// Entities need snapshots on both sides of the cutoff. Sorted by
/// improvement, largest first.
pub fn rising_entities(
    scores: &[TrendingScore],
    now: DateTime<Utc>,
    lookback_days: u32,
    min_improvement_pct: f64,
) -> Vec<RisingEntity> {
    let cutoff = now - Duration::days(i64::from(lookback_days));
    let mut by_entity: BTreeMap<EntityKey, (Vec<f64>, Vec<f64>)> = BTreeMap::new();
    for s in scores {
        let (recent, older) = by_entity.entry(s.key()).or_default();
        if s.as_of >= cutoff {
            recent.push(s.final_score);
        } else {
            older.push(s.final_score);
        }
    }

    let mut rising: Vec<RisingEntity> = by_entity
        .into_iter()
        .filter(|(_, (recent, older))| !recent.is_empty() && !older.is_empty())
        .filter_map(|(key, (recent, older))| {
            let data_points = recent.len() + older.len();
            let recent_mean = recent.iter().mean();
            let previous_mean = older.iter().mean();
            if previous_mean <= 0.0 {
                return None;
            }
            let improvement = recent_mean - previous_mean;
            let improvement_pct = improvement / previous_mean * 100.0;
            (improvement_pct >= min_improvement_pct).then_some(RisingEntity {
                key,
                recent_mean,
                previous_mean,
                improvement,
                improvement_pct,
                data_points,
            })
        })
        .collect();

    rising.sort_by(|a, b| {
        b.improvement_pct
            .total_cmp(&a.improvement_pct)
            .then(a.key.cmp(&b.key))
    });
    rising
}

/// Rate of change of one entity's score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VelocityReport {
    /// Mean score change per hour between consecutive snapshots
    pub velocity: f64,
    /// Mean change between consecutive velocities
    pub acceleration: f64,
    /// 0..=1; grows with data points, damped by inconsistent velocities
    pub confidence: f64,
    pub data_points: usize,
}

impl VelocityReport {
    fn flat(data_points: usize) -> Self {
        Self {
            velocity: 0.0,
            acceleration: 0.0,
            confidence: 0.0,
            data_points,
        }
    }
}

/// Velocity over one entity's snapshots, in any order.
pub fn velocity(history: &[TrendingScore]) -> VelocityReport {
    if history.len() < 2 {
        return VelocityReport::flat(history.len());
    }
    let mut sorted: Vec<&TrendingScore> = history.iter().collect();
    sorted.sort_by_key(|s| s.as_of);

    let velocities: Vec<f64> = sorted
        .windows(2)
        .map(|w| {
            let hours = (w[1].as_of - w[0].as_of).num_seconds() as f64 / 3600.0;
            if hours > 0.0 {
                (w[1].final_score - w[0].final_score) / hours
            } else {
                0.0
            }
        })
        .collect();

    let mean_velocity = velocities.iter().mean();
    let acceleration = if velocities.len() >= 2 {
        velocities.windows(2).map(|w| w[1] - w[0]).collect::<Vec<_>>().iter().mean()
    } else {
        0.0
    };

    let mut confidence =
        (sorted.len() as f64 / VELOCITY_FULL_CONFIDENCE_POINTS as f64).min(1.0);
    let spread = if velocities.len() > 1 {
        velocities.iter().std_dev()
    } else {
        0.0
    };
    if spread > 0.0 {
        confidence *= if mean_velocity != 0.0 {
            (1.0 - spread / mean_velocity.abs()).max(0.1)
        } else {
            0.5
        };
    }

    VelocityReport {
        velocity: mean_velocity,
        acceleration,
        confidence,
        data_points: sorted.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoostBreakdown, EntityType, ScoreMetadata};
    use chrono::TimeZone;

    fn snap(id: u64, at: DateTime<Utc>, final_score: f64) -> TrendingScore {
        TrendingScore {
            entity_id: id,
            entity_type: EntityType::Media,
            timestamp: at,
            as_of: at,
            favourites: 0,
            base_score: final_score,
            boosts: BoostBreakdown::default(),
            growth_multiplier: 1.0,
            total_multiplier: 1.0,
            final_score,
            algorithm_version: "test".to_string(),
            metadata: ScoreMetadata::default(),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 30, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_rising_entities_sorted_and_filtered() {
        let rows = vec![
            snap(1, now() - Duration::days(20), 100.0),
            snap(1, now() - Duration::days(1), 150.0),
            snap(2, now() - Duration::days(20), 100.0),
            snap(2, now() - Duration::days(2), 300.0),
            snap(3, now() - Duration::days(20), 100.0),
            snap(3, now() - Duration::days(2), 105.0),
            // only recent data
            snap(4, now() - Duration::days(1), 500.0),
        ];
        let rising = rising_entities(&rows, now(), 7, 20.0);
        let ids: Vec<u64> = rising.iter().map(|r| r.key.entity_id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert_eq!(rising[0].improvement_pct, 200.0);
        assert_eq!(rising[1].data_points, 2);
    }

    #[test]
    fn test_velocity_needs_two_points() {
        let r = velocity(&[snap(1, now(), 5.0)]);
        assert_eq!(r, VelocityReport::flat(1));
    }

    #[test]
    fn test_steady_velocity() {
        let rows: Vec<TrendingScore> = (0..5)
            .map(|h| snap(1, now() + Duration::hours(h), 10.0 + 2.0 * h as f64))
            .collect();
        let r = velocity(&rows);
        assert!((r.velocity - 2.0).abs() < 1e-12);
        assert_eq!(r.acceleration, 0.0);
        assert!((r.confidence - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_erratic_velocity_is_damped() {
        let rows = vec![
            snap(1, now(), 10.0),
            snap(1, now() + Duration::hours(1), 30.0),
            snap(1, now() + Duration::hours(2), 10.0),
            snap(1, now() + Duration::hours(3), 40.0),
        ];
        let r = velocity(&rows);
        // velocities 20, -20, 30: spread far above the mean, floor of 0.1 applies
        assert!((r.confidence - 0.04).abs() < 1e-12);
        assert!((r.acceleration - 5.0).abs() < 1e-12);
    }
}
