//! Trending score computation
//!
//! - `base`: log-scaled base score from favourites
//! - `boosts`: the independent multiplier pipeline
//! - `growth`: momentum from stored history at fixed lookbacks
//! - `engine`: orchestration into one `TrendingScore`

pub mod base;
pub mod boosts;
pub mod engine;
pub mod growth;

pub use base::BaseScoreCalculator;
pub use boosts::{Boost, BoostContext, BoostFault, BoostPipeline, PipelineOutcome, NEUTRAL};
pub use engine::TrendingScoreEngine;
pub use growth::{GrowthCalculator, GrowthOutcome, HistoryWindow};
