//! Sled-backed storage
//!
//! One database, four trees. Values are JSON; keys follow `keys.rs` so
//! range scans come back in chronological order per entity.
//!
//! `snapshots_by_time` holds an empty value per snapshot keyed by `as_of`
//! first, so a rollup window is one range scan rather than a full pass over
//! the ledger. Both entries are written in one transaction.

use chrono::{DateTime, NaiveDate, Utc};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Transactional;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use super::keys::{
    aggregate_key, aggregate_prefix, entity_prefix, lifecycle_key, snapshot_key,
    snapshot_key_for_time_key, snapshot_time_key, time_index_bounds, time_key_for_snapshot_key,
};
use super::{AggregateStore, LifecycleStore, SnapshotStore, StorageError};
use crate::config::defaults::{
    AGGREGATES_TREE, DB_DIR_NAME, LIFECYCLE_TREE, SNAPSHOTS_TREE, SNAPSHOT_TIME_INDEX_TREE,
};
use crate::types::{
    EntityKey, HistoricalAggregate, LifecycleRecord, LifecycleStage, PeriodType, TrendingScore,
};

/// Persistent store for snapshots, aggregates and lifecycle records.
#[derive(Clone)]
pub struct SledStore {
    db: Arc<sled::Db>,
    snapshots: sled::Tree,
    snapshot_index: sled::Tree,
    aggregates: sled::Tree,
    lifecycle: sled::Tree,
}

/// Counts and on-disk size, reported by `trendwatch stats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct StorageStats {
    pub snapshot_count: usize,
    pub aggregate_count: usize,
    pub series_count: usize,
    pub size_bytes: u64,
}

impl StorageStats {
    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / (1024.0 * 1024.0)
    }
}

impl SledStore {
    /// Open or create the database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        let store = Self {
            snapshots: db.open_tree(SNAPSHOTS_TREE)?,
            snapshot_index: db.open_tree(SNAPSHOT_TIME_INDEX_TREE)?,
            aggregates: db.open_tree(AGGREGATES_TREE)?,
            lifecycle: db.open_tree(LIFECYCLE_TREE)?,
            db: Arc::new(db),
        };
        if store.snapshot_index.is_empty() && !store.snapshots.is_empty() {
            store.rebuild_time_index()?;
        }
        Ok(store)
    }

    /// Recreate the time index from the snapshot ledger.
    fn rebuild_time_index(&self) -> Result<usize, StorageError> {
        self.snapshot_index.clear()?;
        let mut indexed = 0;
        for item in self.snapshots.iter() {
            let (key, _) = item?;
            match time_key_for_snapshot_key(&key) {
                Some(time_key) => {
                    self.snapshot_index.insert(time_key, &[] as &[u8])?;
                    indexed += 1;
                }
                None => warn!(key_len = key.len(), "Skipping malformed snapshot key"),
            }
        }
        info!(snapshots = indexed, "Snapshot time index rebuilt");
        Ok(indexed)
    }

    /// Open `<data_dir>/trendwatch.db`.
    pub fn open_in<P: AsRef<Path>>(data_dir: P) -> Result<Self, StorageError> {
        Self::open(data_dir.as_ref().join(DB_DIR_NAME))
    }

    /// Sled flushes in the background; call before exit to bound loss.
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }

    pub fn stats(&self) -> StorageStats {
        StorageStats {
            snapshot_count: self.snapshots.len(),
            aggregate_count: self.aggregates.len(),
            series_count: self.lifecycle.len(),
            size_bytes: self.db.size_on_disk().unwrap_or(0),
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    Ok(serde_json::from_slice(bytes)?)
}

impl SnapshotStore for SledStore {
    fn append(&self, score: &TrendingScore) -> Result<(), StorageError> {
        let key = snapshot_key(score.key(), score.as_of);
        let time_key = snapshot_time_key(score.key(), score.as_of);
        let value = serde_json::to_vec(score)?;
        (&self.snapshots, &self.snapshot_index)
            .transaction(|(snapshots, index)| {
                snapshots.insert(key.as_slice(), value.as_slice())?;
                index.insert(time_key.as_slice(), &[] as &[u8])?;
                Ok::<(), ConflictableTransactionError<()>>(())
            })
            .map_err(|e| match e {
                TransactionError::Storage(e) => StorageError::from(e),
                TransactionError::Abort(()) => StorageError::Conflict {
                    key: score.key().to_string(),
                    detail: "snapshot append aborted".to_string(),
                },
            })
    }

    fn latest_at_or_before(
        &self,
        key: EntityKey,
        at: DateTime<Utc>,
    ) -> Result<Option<TrendingScore>, StorageError> {
        let start = entity_prefix(key);
        let end = snapshot_key(key, at);
        match self.snapshots.range(start..=end).next_back() {
            Some(item) => {
                let (_, value) = item?;
                Ok(Some(decode(&value)?))
            }
            None => Ok(None),
        }
    }

    fn history(
        &self,
        key: EntityKey,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<TrendingScore>, StorageError> {
        if from > to {
            return Ok(Vec::new());
        }
        self.snapshots
            .range(snapshot_key(key, from)..=snapshot_key(key, to))
            .map(|item| {
                let (_, value) = item?;
                decode(&value)
            })
            .collect()
    }

    fn window(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<TrendingScore>, StorageError> {
        if from > to {
            return Ok(Vec::new());
        }
        let (lo, hi) = time_index_bounds(from, to);
        let mut out = Vec::new();
        for item in self.snapshot_index.range(lo..=hi) {
            let (time_key, _) = item?;
            let Some(key) = snapshot_key_for_time_key(&time_key) else {
                continue;
            };
            if let Some(value) = self.snapshots.get(key)? {
                out.push(decode(&value)?);
            }
        }
        Ok(out)
    }

    fn count(&self) -> Result<usize, StorageError> {
        Ok(self.snapshots.len())
    }

    fn backend_name(&self) -> &'static str {
        "Sled"
    }
}

impl AggregateStore for SledStore {
    fn upsert(&self, aggregate: &HistoricalAggregate) -> Result<(), StorageError> {
        let key = aggregate_key(aggregate.key(), aggregate.period_type, aggregate.period_start);
        self.aggregates.insert(key, serde_json::to_vec(aggregate)?)?;
        Ok(())
    }

    fn list(&self, key: EntityKey, period: PeriodType) -> Result<Vec<HistoricalAggregate>, StorageError> {
        self.aggregates
            .scan_prefix(aggregate_prefix(key, period))
            .map(|item| {
                let (_, value) = item?;
                decode(&value)
            })
            .collect()
    }

    fn list_period(&self, period: PeriodType) -> Result<Vec<HistoricalAggregate>, StorageError> {
        self.aggregates
            .scan_prefix([period.tag()])
            .map(|item| {
                let (_, value) = item?;
                decode(&value)
            })
            .collect()
    }

    fn remove(
        &self,
        key: EntityKey,
        period: PeriodType,
        period_start: NaiveDate,
    ) -> Result<bool, StorageError> {
        Ok(self
            .aggregates
            .remove(aggregate_key(key, period, period_start))?
            .is_some())
    }
}

impl LifecycleStore for SledStore {
    fn get(&self, series_id: u64) -> Result<Option<LifecycleRecord>, StorageError> {
        match self.lifecycle.get(lifecycle_key(series_id))? {
            Some(value) => Ok(Some(decode(&value)?)),
            None => Ok(None),
        }
    }

    fn insert_new(&self, record: &LifecycleRecord) -> Result<(), StorageError> {
        let value = serde_json::to_vec(record)?;
        self.lifecycle
            .compare_and_swap(lifecycle_key(record.series_id), None as Option<&[u8]>, Some(value))?
            .map_err(|_| StorageError::Conflict {
                key: format!("series:{}", record.series_id),
                detail: "series is already tracked".to_string(),
            })
    }

    fn compare_and_set(
        &self,
        series_id: u64,
        expected: LifecycleStage,
        new: &LifecycleRecord,
    ) -> Result<(), StorageError> {
        let key = lifecycle_key(series_id);
        let current_bytes = self
            .lifecycle
            .get(key)?
            .ok_or_else(|| StorageError::NotFound(format!("series:{series_id}")))?;
        let current: LifecycleRecord = decode(&current_bytes)?;
        if current.stage != expected {
            return Err(StorageError::StageMismatch {
                series_id,
                expected,
                found: current.stage,
            });
        }

        // Swap against the exact bytes read so a concurrent writer in between loses.
        let value = serde_json::to_vec(new)?;
        self.lifecycle
            .compare_and_swap(key, Some(current_bytes), Some(value))?
            .map_err(|_| StorageError::Conflict {
                key: format!("series:{series_id}"),
                detail: "record changed between read and write".to_string(),
            })
    }

    fn list_by_stage(&self, stage: LifecycleStage) -> Result<Vec<LifecycleRecord>, StorageError> {
        Ok(self.all()?.into_iter().filter(|r| r.stage == stage).collect())
    }

    fn all(&self) -> Result<Vec<LifecycleRecord>, StorageError> {
        self.lifecycle
            .iter()
            .map(|item| {
                let (_, value) = item?;
                decode(&value)
            })
            .collect()
    }
}
