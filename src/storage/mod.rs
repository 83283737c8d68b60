//! Score, Aggregate and Lifecycle Storage
//!
//! Storage contracts for the three persisted record kinds, with two backends:
//! - `InMemoryStore`: `RwLock`-guarded maps for tests and dry runs
//! - `SledStore`: one sled database with `snapshots`, `aggregates` and
//!   `lifecycle` trees, JSON-encoded values
//!
//! Writes are keyed per entity so concurrent writers for different entities
//! never touch the same key. Lifecycle stage changes go through
//! `compare_and_set`, which is atomic per series.

pub mod keys;
pub mod lockfile;
pub mod memory;
pub mod sled_store;

pub use lockfile::ProcessLock;
pub use memory::InMemoryStore;
pub use sled_store::{SledStore, StorageStats};

use chrono::{DateTime, NaiveDate, Utc};

use crate::types::{
    EntityKey, HistoricalAggregate, LifecycleRecord, LifecycleStage, PeriodType, TrendingScore,
};

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("conflict on {key}: {detail}")]
    Conflict { key: String, detail: String },
    #[error("stage conflict on series {series_id}: expected {expected}, found {found}")]
    StageMismatch {
        series_id: u64,
        expected: LifecycleStage,
        found: LifecycleStage,
    },
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        StorageError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

// ============================================================================
// Storage Contracts
// ============================================================================

/// Append-only ledger of trending scores, keyed by entity and evaluation instant.
pub trait SnapshotStore: Send + Sync {
    /// Append a score. Re-appending the same entity and `as_of` overwrites.
    fn append(&self, score: &TrendingScore) -> Result<(), StorageError>;

    /// Most recent score for `key` evaluated at or before `at`.
    fn latest_at_or_before(
        &self,
        key: EntityKey,
        at: DateTime<Utc>,
    ) -> Result<Option<TrendingScore>, StorageError>;

    /// Scores for `key` with `from <= as_of <= to`, oldest first.
    fn history(
        &self,
        key: EntityKey,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<TrendingScore>, StorageError>;

    /// Scores of every entity with `from <= as_of <= to`, grouped by entity.
    fn window(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<TrendingScore>, StorageError>;

    fn count(&self) -> Result<usize, StorageError>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

/// Derived per-period aggregates, keyed by (entity, period type, period start).
pub trait AggregateStore: Send + Sync {
    /// Insert or overwrite the aggregate for its key.
    fn upsert(&self, aggregate: &HistoricalAggregate) -> Result<(), StorageError>;

    /// Aggregates for one entity and period type, oldest first.
    fn list(&self, key: EntityKey, period: PeriodType) -> Result<Vec<HistoricalAggregate>, StorageError>;

    /// Every aggregate of one period type.
    fn list_period(&self, period: PeriodType) -> Result<Vec<HistoricalAggregate>, StorageError>;

    /// Returns whether an aggregate was removed.
    fn remove(
        &self,
        key: EntityKey,
        period: PeriodType,
        period_start: NaiveDate,
    ) -> Result<bool, StorageError>;
}

/// One lifecycle record per series.
pub trait LifecycleStore: Send + Sync {
    fn get(&self, series_id: u64) -> Result<Option<LifecycleRecord>, StorageError>;

    /// Fails with `Conflict` if the series is already tracked.
    fn insert_new(&self, record: &LifecycleRecord) -> Result<(), StorageError>;

    /// Atomically replace the record if its stored stage is still `expected`.
    fn compare_and_set(
        &self,
        series_id: u64,
        expected: LifecycleStage,
        new: &LifecycleRecord,
    ) -> Result<(), StorageError>;

    fn list_by_stage(&self, stage: LifecycleStage) -> Result<Vec<LifecycleRecord>, StorageError>;

    fn all(&self) -> Result<Vec<LifecycleRecord>, StorageError>;
}
