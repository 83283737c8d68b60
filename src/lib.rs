//! trendwatch: trending scores and series lifecycle tracking
//!
//! ## Architecture
//!
//! - **Scoring**: base score from favourites, eight configurable boosts and a
//!   history-based growth multiplier, clamped into one final score
//! - **Aggregation**: daily / weekly / monthly / yearly rollups with retention
//! - **Lifecycle**: grace-period state machine deciding which series stay tracked
//! - **Storage**: append-only snapshot ledger, aggregates and lifecycle records
//!   behind traits, backed by sled or in-memory maps
//! - **Pipeline**: parallel batch passes tying the above together

pub mod aggregation;
pub mod config;
pub mod lifecycle;
pub mod pipeline;
pub mod scoring;
pub mod storage;
pub mod types;

// Re-export configuration
pub use config::{ConfigError, EngineConfig};

// Re-export commonly used types
pub use types::{
    EntityKey, EntityMetrics, EntityType, HistoricalAggregate, LifecycleAction,
    LifecycleDecision, LifecycleRecord, LifecycleStage, PeriodType, SeriesMetrics,
    TrendDirection, TrendingScore,
};

// Re-export engines
pub use aggregation::{AggregationRollup, RetentionPolicy};
pub use lifecycle::{LifecycleDecisionMaker, LifecycleRulesManager, LifecycleStateMachine};
pub use scoring::{HistoryWindow, TrendingScoreEngine};

// Re-export storage
pub use storage::{InMemoryStore, SledStore, StorageError, StorageStats};

// Re-export the batch runner
pub use pipeline::{BatchError, BatchRunner};
