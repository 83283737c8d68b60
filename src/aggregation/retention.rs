//! Retention pruning of aggregates
//!
//! Each period type has its own window. The most recent aggregate of every
//! entity is kept regardless of age so no entity is left without history.

use chrono::{Duration, Months, NaiveDate};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

use crate::config::RetentionConfig;
use crate::storage::{AggregateStore, StorageError};
use crate::types::{EntityKey, HistoricalAggregate, PeriodType};

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct PruneReport {
    pub removed: BTreeMap<PeriodType, usize>,
    /// Expired aggregates retained because they were an entity's latest
    pub kept_latest: usize,
}

impl PruneReport {
    pub fn total_removed(&self) -> usize {
        self.removed.values().sum()
    }
}

#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    config: RetentionConfig,
}

impl RetentionPolicy {
    pub fn new(config: &RetentionConfig) -> Self {
        Self { config: config.clone() }
    }

    /// Aggregates ending before this date are expired.
    pub fn cutoff(&self, period: PeriodType, today: NaiveDate) -> NaiveDate {
        let c = &self.config;
        let cutoff = match period {
            PeriodType::Daily => today.checked_sub_signed(Duration::days(i64::from(c.daily_days))),
            PeriodType::Weekly => {
                today.checked_sub_signed(Duration::weeks(i64::from(c.weekly_weeks)))
            }
            PeriodType::Monthly => today.checked_sub_months(Months::new(c.monthly_months)),
            PeriodType::Yearly => {
                today.checked_sub_months(Months::new(c.yearly_years.saturating_mul(12)))
            }
        };
        cutoff.unwrap_or(NaiveDate::MIN)
    }

    /// Expired aggregates of one period type, excluding each entity's latest.
    pub fn expired<'a>(
        &self,
        aggregates: &'a [HistoricalAggregate],
        period: PeriodType,
        today: NaiveDate,
    ) -> (Vec<&'a HistoricalAggregate>, usize) {
        let cutoff = self.cutoff(period, today);
        let mut latest: HashMap<EntityKey, NaiveDate> = HashMap::new();
        for a in aggregates.iter().filter(|a| a.period_type == period) {
            let entry = latest.entry(a.key()).or_insert(a.period_start);
            if a.period_start > *entry {
                *entry = a.period_start;
            }
        }

        let mut kept_latest = 0;
        let expired = aggregates
            .iter()
            .filter(|a| a.period_type == period && a.period_end < cutoff)
            .filter(|a| {
                let is_latest = latest.get(&a.key()) == Some(&a.period_start);
                if is_latest {
                    kept_latest += 1;
                }
                !is_latest
            })
            .collect();
        (expired, kept_latest)
    }

    /// Remove expired aggregates of every period type from `store`.
    pub fn prune(&self, store: &dyn AggregateStore, today: NaiveDate) -> Result<PruneReport, StorageError> {
        let mut report = PruneReport::default();
        for period in PeriodType::ALL {
            let aggregates = store.list_period(period)?;
            let (expired, kept) = self.expired(&aggregates, period, today);
            let mut removed = 0;
            for a in expired {
                if store.remove(a.key(), period, a.period_start)? {
                    removed += 1;
                }
            }
            debug!(period = %period, removed, kept_latest = kept, "Pruned aggregates");
            report.removed.insert(period, removed);
            report.kept_latest += kept;
        }
        info!(
            removed = report.total_removed(),
            kept_latest = report.kept_latest,
            "Retention pruning complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;
    use crate::types::{EntityType, TrendDirection};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn agg(id: u64, period: PeriodType, start: NaiveDate) -> HistoricalAggregate {
        HistoricalAggregate {
            entity_id: id,
            entity_type: EntityType::Media,
            period_type: period,
            period_start: start,
            period_end: period.bucket_end(start),
            avg_score: 1.0,
            min_score: 1.0,
            max_score: 1.0,
            data_points: 1,
            growth_rate: 0.0,
            volatility: 0.0,
            trend_direction: TrendDirection::Stable,
        }
    }

    fn policy() -> RetentionPolicy {
        RetentionPolicy::new(&RetentionConfig::default())
    }

    #[test]
    fn test_cutoffs() {
        let today = d(2024, 6, 30);
        let p = policy();
        assert_eq!(p.cutoff(PeriodType::Daily, today), d(2024, 5, 31));
        assert_eq!(p.cutoff(PeriodType::Weekly, today), d(2023, 7, 2));
        assert_eq!(p.cutoff(PeriodType::Monthly, today), d(2022, 6, 30));
        assert_eq!(p.cutoff(PeriodType::Yearly, today), d(2019, 6, 30));
    }

    #[test]
    fn test_prune_removes_expired_but_keeps_latest() {
        let store = InMemoryStore::new();
        let today = d(2024, 6, 30);
        // entity 1: old + recent daily rows; entity 2: only old rows
        store.upsert(&agg(1, PeriodType::Daily, d(2024, 1, 1))).unwrap();
        store.upsert(&agg(1, PeriodType::Daily, d(2024, 6, 29))).unwrap();
        store.upsert(&agg(2, PeriodType::Daily, d(2024, 1, 1))).unwrap();
        store.upsert(&agg(2, PeriodType::Daily, d(2024, 1, 2))).unwrap();

        let report = policy().prune(&store, today).unwrap();
        assert_eq!(report.removed[&PeriodType::Daily], 2);
        assert_eq!(report.kept_latest, 1);

        let e1 = store.list(EntityKey::media(1), PeriodType::Daily).unwrap();
        assert_eq!(e1.len(), 1);
        assert_eq!(e1[0].period_start, d(2024, 6, 29));
        let e2 = store.list(EntityKey::media(2), PeriodType::Daily).unwrap();
        assert_eq!(e2.len(), 1);
        assert_eq!(e2[0].period_start, d(2024, 1, 2));
    }

    #[test]
    fn test_prune_is_per_period_type() {
        let store = InMemoryStore::new();
        store.upsert(&agg(1, PeriodType::Daily, d(2023, 1, 1))).unwrap();
        store.upsert(&agg(1, PeriodType::Monthly, d(2023, 1, 1))).unwrap();
        store.upsert(&agg(1, PeriodType::Monthly, d(2023, 2, 1))).unwrap();
        let report = policy().prune(&store, d(2024, 6, 30)).unwrap();
        assert_eq!(report.total_removed(), 0);
        assert_eq!(store.list(EntityKey::media(1), PeriodType::Monthly).unwrap().len(), 2);
    }
}
