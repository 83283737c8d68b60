//! Shared data structures for trending scores and series lifecycle tracking
//!
//! This module defines the records that flow through the engine:
//! - `EntityMetrics`: raw popularity metrics supplied by fetchers (input)
//! - `TrendingScore`: one append-only evaluation result per entity per pass
//! - `HistoricalAggregate`: derived per-period rollups of trending scores
//! - `LifecycleRecord` / `SeriesMetrics`: series stage and decision inputs

mod metrics;
mod score;
mod aggregate;
mod lifecycle;

pub use metrics::*;
pub use score::*;
pub use aggregate::*;
pub use lifecycle::*;
