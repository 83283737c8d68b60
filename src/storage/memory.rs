//! InMemoryStore: non-durable backend for tests and dry runs
//!
//! Thread-safe via `RwLock`. Data is lost when the process exits.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::sync::RwLock;

use super::keys::timestamp_nanos;
use super::{AggregateStore, LifecycleStore, SnapshotStore, StorageError};
use crate::types::{
    EntityKey, HistoricalAggregate, LifecycleRecord, LifecycleStage, PeriodType, TrendingScore,
};

type AggregateKey = (PeriodType, EntityKey, NaiveDate);

/// In-memory implementation of every storage contract.
#[derive(Default)]
pub struct InMemoryStore {
    snapshots: RwLock<BTreeMap<(EntityKey, i64), TrendingScore>>,
    aggregates: RwLock<BTreeMap<AggregateKey, HistoricalAggregate>>,
    lifecycle: RwLock<BTreeMap<u64, LifecycleRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Database(e.to_string())
}

impl SnapshotStore for InMemoryStore {
    fn append(&self, score: &TrendingScore) -> Result<(), StorageError> {
        let mut store = self.snapshots.write().map_err(poisoned)?;
        store.insert((score.key(), timestamp_nanos(score.as_of)), score.clone());
        Ok(())
    }

    fn latest_at_or_before(
        &self,
        key: EntityKey,
        at: DateTime<Utc>,
    ) -> Result<Option<TrendingScore>, StorageError> {
        let store = self.snapshots.read().map_err(poisoned)?;
        Ok(store
            .range((key, i64::MIN)..=(key, timestamp_nanos(at)))
            .next_back()
            .map(|(_, s)| s.clone()))
    }

    fn history(
        &self,
        key: EntityKey,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<TrendingScore>, StorageError> {
        let (lo, hi) = (timestamp_nanos(from), timestamp_nanos(to));
        if lo > hi {
            return Ok(Vec::new());
        }
        let store = self.snapshots.read().map_err(poisoned)?;
        Ok(store
            .range((key, lo)..=(key, hi))
            .map(|(_, s)| s.clone())
            .collect())
    }

    fn window(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<TrendingScore>, StorageError> {
        let store = self.snapshots.read().map_err(poisoned)?;
        Ok(store
            .values()
            .filter(|s| s.as_of >= from && s.as_of <= to)
            .cloned()
            .collect())
    }

    fn count(&self) -> Result<usize, StorageError> {
        Ok(self.snapshots.read().map_err(poisoned)?.len())
    }

    fn backend_name(&self) -> &'static str {
        "InMemory"
    }
}

impl AggregateStore for InMemoryStore {
    fn upsert(&self, aggregate: &HistoricalAggregate) -> Result<(), StorageError> {
        let mut store = self.aggregates.write().map_err(poisoned)?;
        store.insert(
            (aggregate.period_type, aggregate.key(), aggregate.period_start),
            aggregate.clone(),
        );
        Ok(())
    }

    fn list(&self, key: EntityKey, period: PeriodType) -> Result<Vec<HistoricalAggregate>, StorageError> {
        let store = self.aggregates.read().map_err(poisoned)?;
        Ok(store
            .range((period, key, NaiveDate::MIN)..=(period, key, NaiveDate::MAX))
            .map(|(_, a)| a.clone())
            .collect())
    }

    fn list_period(&self, period: PeriodType) -> Result<Vec<HistoricalAggregate>, StorageError> {
        let store = self.aggregates.read().map_err(poisoned)?;
        Ok(store
            .iter()
            .filter(|((p, _, _), _)| *p == period)
            .map(|(_, a)| a.clone())
            .collect())
    }

    fn remove(
        &self,
        key: EntityKey,
        period: PeriodType,
        period_start: NaiveDate,
    ) -> Result<bool, StorageError> {
        let mut store = self.aggregates.write().map_err(poisoned)?;
        Ok(store.remove(&(period, key, period_start)).is_some())
    }
}

impl LifecycleStore for InMemoryStore {
    fn get(&self, series_id: u64) -> Result<Option<LifecycleRecord>, StorageError> {
        Ok(self.lifecycle.read().map_err(poisoned)?.get(&series_id).cloned())
    }

    fn insert_new(&self, record: &LifecycleRecord) -> Result<(), StorageError> {
        let mut store = self.lifecycle.write().map_err(poisoned)?;
        if store.contains_key(&record.series_id) {
            return Err(StorageError::Conflict {
                key: format!("series:{}", record.series_id),
                detail: "series is already tracked".to_string(),
            });
        }
        store.insert(record.series_id, record.clone());
        Ok(())
    }

    fn compare_and_set(
        &self,
        series_id: u64,
        expected: LifecycleStage,
        new: &LifecycleRecord,
    ) -> Result<(), StorageError> {
        let mut store = self.lifecycle.write().map_err(poisoned)?;
        let current = store
            .get(&series_id)
            .ok_or_else(|| StorageError::NotFound(format!("series:{series_id}")))?;
        if current.stage != expected {
            return Err(StorageError::StageMismatch {
                series_id,
                expected,
                found: current.stage,
            });
        }
        store.insert(series_id, new.clone());
        Ok(())
    }

    fn list_by_stage(&self, stage: LifecycleStage) -> Result<Vec<LifecycleRecord>, StorageError> {
        let store = self.lifecycle.read().map_err(poisoned)?;
        Ok(store.values().filter(|r| r.stage == stage).cloned().collect())
    }

    fn all(&self) -> Result<Vec<LifecycleRecord>, StorageError> {
        Ok(self.lifecycle.read().map_err(poisoned)?.values().cloned().collect())
    }
}
