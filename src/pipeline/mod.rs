//! Batch Pipeline
//!
//! ```text
//! evaluate:  metrics ──> history lookup ──> score ──> rank ──> append snapshots
//! rollup:    snapshots ──> per-period aggregates ──> retention prune
//! lifecycle: series metrics ──> track / promote / advance ──> cleanup
//! ```
//!
//! Each pass is independent and idempotent. The binary runs one pass per
//! invocation; an external scheduler decides the cadence.

pub mod batch;
pub mod report;

pub use batch::{assign_popularity_ranks, BatchError, BatchRunner};
pub use report::{BatchReport, LifecycleReport, PromoteReport, RollupReport};
