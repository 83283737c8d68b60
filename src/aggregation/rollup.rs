//! Period rollup of trending score snapshots
//!
//! Snapshots are grouped by entity and by the period-aligned bucket of their
//! `as_of` date. Output is sorted by (entity, bucket) and depends only on the
//! input rows, so re-running over the same window yields the same aggregates.

use chrono::NaiveDate;
use statrs::statistics::Statistics;
use std::collections::BTreeMap;
use tracing::debug;

use crate::config::EngineConfig;
use crate::types::{EntityKey, HistoricalAggregate, PeriodType, TrendDirection, TrendingScore};

pub struct AggregationRollup {
    trend_stable_band: f64,
}

impl AggregationRollup {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            trend_stable_band: config.aggregation.trend_stable_band,
        }
    }

    pub fn trend_stable_band(&self) -> f64 {
        self.trend_stable_band
    }

    /// One aggregate per (entity, bucket) covered by `snapshots`.
    pub fn rollup(&self, snapshots: &[TrendingScore], period: PeriodType) -> Vec<HistoricalAggregate> {
        let mut buckets: BTreeMap<(EntityKey, NaiveDate), Vec<&TrendingScore>> = BTreeMap::new();
        for s in snapshots {
            let start = period.bucket_start(s.as_of.date_naive());
            buckets.entry((s.key(), start)).or_default().push(s);
        }

        let aggregates: Vec<HistoricalAggregate> = buckets
            .into_iter()
            .map(|((key, start), mut rows)| {
                rows.sort_by(|a, b| a.as_of.cmp(&b.as_of).then(a.timestamp.cmp(&b.timestamp)));
                let scores: Vec<f64> = rows.iter().map(|r| r.final_score).collect();
                self.summarise(key, period, start, &scores)
            })
            .collect();

        debug!(
            period = %period,
            snapshots = snapshots.len(),
            aggregates = aggregates.len(),
            "Rolled up snapshots"
        );
        aggregates
    }

    /// `scores` must be in chronological order and non-empty.
    fn summarise(
        &self,
        key: EntityKey,
        period: PeriodType,
        start: NaiveDate,
        scores: &[f64],
    ) -> HistoricalAggregate {
        let first = scores.first().copied().unwrap_or(0.0);
        let last = scores.last().copied().unwrap_or(0.0);
        let growth_rate = growth_rate(first, last);

        HistoricalAggregate {
            entity_id: key.entity_id,
            entity_type: key.entity_type,
            period_type: period,
            period_start: start,
            period_end: period.bucket_end(start),
            avg_score: scores.iter().sum::<f64>() / scores.len().max(1) as f64,
            min_score: scores.iter().copied().fold(f64::INFINITY, f64::min),
            max_score: scores.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            data_points: u32::try_from(scores.len()).unwrap_or(u32::MAX),
            growth_rate,
            volatility: coefficient_of_variation(scores),
            trend_direction: TrendDirection::from_growth(growth_rate, self.trend_stable_band),
        }
    }

    /// Combine finer aggregates into `target` buckets, for history whose raw
    /// snapshots have already been pruned.
    ///
    /// Averages are weighted by `data_points`. Inputs that are not strictly
    /// finer than `target` are ignored.
    pub fn fold_aggregates(
        &self,
        finer: &[HistoricalAggregate],
        target: PeriodType,
    ) -> Vec<HistoricalAggregate> {
        let mut buckets: BTreeMap<(EntityKey, NaiveDate), Vec<&HistoricalAggregate>> = BTreeMap::new();
        for a in finer.iter().filter(|a| a.period_type < target) {
            let start = target.bucket_start(a.period_start);
            buckets.entry((a.key(), start)).or_default().push(a);
        }

        buckets
            .into_iter()
            .map(|((key, start), mut parts)| {
                parts.sort_by_key(|p| p.period_start);
                let points: u32 = parts.iter().map(|p| p.data_points).sum();
                let weighted: f64 = parts
                    .iter()
                    .map(|p| p.avg_score * f64::from(p.data_points))
                    .sum();
                let avg_score = if points > 0 {
                    weighted / f64::from(points)
                } else {
                    0.0
                };
                let avgs: Vec<f64> = parts.iter().map(|p| p.avg_score).collect();
                let first = avgs.first().copied().unwrap_or(0.0);
                let last = avgs.last().copied().unwrap_or(0.0);
                let growth_rate = growth_rate(first, last);

                HistoricalAggregate {
                    entity_id: key.entity_id,
                    entity_type: key.entity_type,
                    period_type: target,
                    period_start: start,
                    period_end: target.bucket_end(start),
                    avg_score,
                    min_score: parts.iter().map(|p| p.min_score).fold(f64::INFINITY, f64::min),
                    max_score: parts.iter().map(|p| p.max_score).fold(f64::NEG_INFINITY, f64::max),
                    data_points: points,
                    growth_rate,
                    volatility: coefficient_of_variation(&avgs),
                    trend_direction: TrendDirection::from_growth(growth_rate, self.trend_stable_band),
                }
            })
            .collect()
    }
}

/// `(last - first) / first`, 0 when `first` is 0.
fn growth_rate(first: f64, last: f64) -> f64 {
    if first == 0.0 {
        0.0
    } else {
        (last - first) / first
    }
}

/// Sample standard deviation over mean; 0 below two points or at zero mean.
pub fn coefficient_of_variation(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().mean();
    if mean == 0.0 || !mean.is_finite() {
        return 0.0;
    }
    let cv = values.iter().std_dev() / mean.abs();
    if cv.is_finite() {
        cv
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoostBreakdown, EntityType, ScoreMetadata};
    use chrono::{DateTime, TimeZone, Utc};

    fn snap(id: u64, at: DateTime<Utc>, final_score: f64) -> TrendingScore {
        TrendingScore {
            entity_id: id,
            entity_type: EntityType::Character,
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

    fn at(m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, m, d, h, 0, 0).unwrap()
    }

    fn rollup() -> AggregationRollup {
        AggregationRollup::new(&EngineConfig::default())
    }

    #[test]
    fn test_weekly_bucket_summary() {
        // 2024-03-11 is a Monday; 03-17 the Sunday of the same week
        let rows = vec![
            snap(1, at(3, 13, 0), 20.0),
            snap(1, at(3, 11, 0), 10.0),
            snap(1, at(3, 17, 23), 30.0),
            snap(1, at(3, 18, 0), 99.0),
        ];
        let out = rollup().rollup(&rows, PeriodType::Weekly);
        assert_eq!(out.len(), 2);
        let first = &out[0];
        assert_eq!(first.period_start, NaiveDate::from_ymd_opt(2024, 3, 11).unwrap());
        assert_eq!(first.period_end, NaiveDate::from_ymd_opt(2024, 3, 17).unwrap());
        assert_eq!(first.data_points, 3);
        assert_eq!(first.avg_score, 20.0);
        assert_eq!(first.min_score, 10.0);
        assert_eq!(first.max_score, 30.0);
        assert_eq!(first.growth_rate, 2.0);
        assert_eq!(first.trend_direction, TrendDirection::Rising);
        assert!((first.volatility - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_single_point_bucket() {
        let out = rollup().rollup(&[snap(2, at(5, 2, 0), 7.0)], PeriodType::Monthly);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].volatility, 0.0);
        assert_eq!(out[0].growth_rate, 0.0);
        assert_eq!(out[0].trend_direction, TrendDirection::Stable);
        assert_eq!(out[0].period_end, NaiveDate::from_ymd_opt(2024, 5, 31).unwrap());
    }

    #[test]
    fn test_zero_earliest_gives_zero_growth() {
        let rows = vec![snap(1, at(1, 1, 0), 0.0), snap(1, at(1, 1, 5), 10.0)];
        let out = rollup().rollup(&rows, PeriodType::Daily);
        assert_eq!(out[0].growth_rate, 0.0);
    }

    #[test]
    fn test_rollup_is_idempotent() {
        let rows = vec![
            snap(1, at(2, 1, 0), 3.0),
            snap(2, at(2, 1, 0), 4.0),
            snap(1, at(2, 3, 0), 5.0),
        ];
        let r = rollup();
        assert_eq!(r.rollup(&rows, PeriodType::Yearly), r.rollup(&rows, PeriodType::Yearly));
    }

    #[test]
    fn test_fold_weights_by_data_points() {
        let r = rollup();
        let daily = r.rollup(
            &[
                snap(1, at(3, 4, 0), 10.0),
                snap(1, at(3, 5, 0), 20.0),
                snap(1, at(3, 5, 6), 20.0),
            ],
            PeriodType::Daily,
        );
        assert_eq!(daily.len(), 2);
        let weekly = r.fold_aggregates(&daily, PeriodType::Weekly);
        assert_eq!(weekly.len(), 1);
        assert_eq!(weekly[0].data_points, 3);
        assert!((weekly[0].avg_score - 50.0 / 3.0).abs() < 1e-12);
        assert_eq!(weekly[0].min_score, 10.0);
        assert_eq!(weekly[0].max_score, 20.0);
        assert!(r.fold_aggregates(&weekly, PeriodType::Daily).is_empty());
    }

    #[test]
    fn test_coefficient_of_variation() {
        assert_eq!(coefficient_of_variation(&[]), 0.0);
        assert_eq!(coefficient_of_variation(&[5.0]), 0.0);
        assert_eq!(coefficient_of_variation(&[-1.0, 1.0]), 0.0);
        assert!((coefficient_of_variation(&[10.0, 20.0, 30.0]) - 0.5).abs() < 1e-12);
    }
}
