//! Snapshot aggregation
//!
//! - `rollup`: snapshots into DAILY/WEEKLY/MONTHLY/YEARLY aggregates
//! - `retention`: per-period pruning that never empties an entity's history
//! - `trends`: rising-entity detection and score velocity

pub mod retention;
pub mod rollup;
pub mod trends;

pub use retention::{PruneReport, RetentionPolicy};
pub use rollup::{coefficient_of_variation, AggregationRollup};
pub use trends::{rising_entities, velocity, RisingEntity, VelocityReport};
