//! Lifecycle statistics over every tracked series.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::defaults::{STATS_EVALUATED_HOURS, STATS_RECENT_DAYS};
use crate::types::{LifecycleRecord, LifecycleStage};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LifecycleStats {
    pub total: usize,
    pub by_stage: BTreeMap<LifecycleStage, usize>,
    /// Grace period started within the last 7 days
    pub entered_grace_recently: usize,
    /// Archived within the last 7 days
    pub archived_recently: usize,
    /// Evaluated within the last 24 hours
    pub evaluated_recently: usize,
    pub avg_evaluation_score: Option<f64>,
    pub oldest_grace_period: Option<DateTime<Utc>>,
    pub most_recent_archive: Option<DateTime<Utc>>,
}

impl LifecycleStats {
    pub fn from_records(records: &[LifecycleRecord], now: DateTime<Utc>) -> Self {
        let recent = now - Duration::days(STATS_RECENT_DAYS);
        let evaluated_since = now - Duration::hours(STATS_EVALUATED_HOURS);

        let mut stats = Self {
            total: records.len(),
            by_stage: LifecycleStage::ALL.iter().map(|s| (*s, 0)).collect(),
            ..Self::default()
        };
        let mut score_sum = 0.0;
        let mut scored = 0usize;

        for r in records {
            *stats.by_stage.entry(r.stage).or_insert(0) += 1;

            if let Some(start) = r.grace_period_start {
                if start > recent {
                    stats.entered_grace_recently += 1;
                }
                if stats.oldest_grace_period.map_or(true, |o| start < o) {
                    stats.oldest_grace_period = Some(start);
                }
            }
            if let Some(at) = r.archived_at {
                if at > recent {
                    stats.archived_recently += 1;
                }
                if stats.most_recent_archive.map_or(true, |m| at > m) {
                    stats.most_recent_archive = Some(at);
                }
            }
            if r.last_evaluation_at.is_some_and(|t| t > evaluated_since) {
                stats.evaluated_recently += 1;
            }
            if let Some(score) = r.evaluation_score {
                score_sum += score;
                scored += 1;
            }
        }

        if scored > 0 {
            stats.avg_evaluation_score = Some(score_sum / scored as f64);
        }
        stats
    }

    pub fn count(&self, stage: LifecycleStage) -> usize {
        self.by_stage.get(&stage).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_counts_and_windows() {
        let now = Utc.with_ymd_and_hms(2024, 6, 30, 12, 0, 0).unwrap();
        let mut grace = LifecycleRecord::upcoming(1);
        grace.stage = LifecycleStage::GracePeriod;
        grace.grace_period_start = Some(now - Duration::days(2));
        grace.last_evaluation_at = Some(now - Duration::hours(1));
        grace.evaluation_score = Some(40.0);

        let mut archived = LifecycleRecord::upcoming(2);
        archived.stage = LifecycleStage::Archived;
        archived.grace_period_start = Some(now - Duration::days(60));
        archived.archived_at = Some(now - Duration::days(10));
        archived.last_evaluation_at = Some(now - Duration::days(10));
        archived.evaluation_score = Some(10.0);

        let stats = LifecycleStats::from_records(
            &[grace, archived, LifecycleRecord::upcoming(3)],
            now,
        );
        assert_eq!(stats.total, 3);
        assert_eq!(stats.count(LifecycleStage::Upcoming), 1);
        assert_eq!(stats.count(LifecycleStage::ReadyForDeletion), 0);
        assert_eq!(stats.entered_grace_recently, 1);
        assert_eq!(stats.archived_recently, 0);
        assert_eq!(stats.evaluated_recently, 1);
        assert_eq!(stats.avg_evaluation_score, Some(25.0));
        assert_eq!(stats.oldest_grace_period, Some(now - Duration::days(60)));
        assert_eq!(stats.most_recent_archive, Some(now - Duration::days(10)));
    }

    #[test]
    fn test_empty() {
        let stats = LifecycleStats::from_records(&[], Utc::now());
        assert_eq!(stats.total, 0);
        assert_eq!(stats.by_stage.len(), LifecycleStage::ALL.len());
        assert!(stats.avg_evaluation_score.is_none());
    }
}
