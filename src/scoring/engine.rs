//! Trending Score Engine
//!
//! Orchestrates one evaluation:
//!
//! ```text
//! base     = BaseScoreCalculator(favourites)
//! boosts   = BoostPipeline(metrics)          -> raw_total, capped_total
//! growth   = GrowthCalculator(favourites, history)
//! total    = clamp(capped_total * growth, min_total, max_total)
//! final    = base * total
//! ```
//!
//! Given the same metrics, history window and `as_of`, every field except
//! `timestamp` is reproduced exactly.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::base::BaseScoreCalculator;
use super::boosts::{BoostContext, BoostPipeline};
use super::growth::{GrowthCalculator, HistoryWindow};
use crate::config::{ConfigError, EngineConfig, LimitsConfig, Lookback};
use crate::storage::{SnapshotStore, StorageError};
use crate::types::{EntityMetrics, ScoreMetadata, TrendingScore};

pub struct TrendingScoreEngine {
    base: BaseScoreCalculator,
    pipeline: BoostPipeline,
    growth: GrowthCalculator,
    limits: LimitsConfig,
    version: String,
}

impl TrendingScoreEngine {
    /// Build the engine with the standard boost set.
    ///
    /// Fails if the configuration does not validate; this is the only fatal
    /// error the engine has.
    pub fn new(config: &EngineConfig) -> Result<Self, ConfigError> {
        Self::with_pipeline(config, BoostPipeline::standard(config))
    }

    /// Build the engine around a caller-supplied boost pipeline.
    pub fn with_pipeline(config: &EngineConfig, pipeline: BoostPipeline) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            base: BaseScoreCalculator::new(&config.base_score)?,
            pipeline,
            growth: GrowthCalculator::new(&config.growth),
            limits: config.limits.clone(),
            version: config.algorithm.version.clone(),
        })
    }

    pub fn lookbacks(&self) -> &[Lookback] {
        self.growth.lookbacks()
    }

    pub fn algorithm_version(&self) -> &str {
        &self.version
    }

    /// Score one entity. Never fails: boost and growth faults are recorded in
    /// `metadata.faults` with the neutral multiplier substituted.
    pub fn evaluate(
        &self,
        metrics: &EntityMetrics,
        history: &HistoryWindow,
        as_of: DateTime<Utc>,
    ) -> TrendingScore {
        let ctx = BoostContext::new(as_of);
        let base_score = self.base.calculate(metrics.favourites);
        let outcome = self.pipeline.apply(metrics, &ctx);
        let growth = self.growth.compute(metrics.favourites, history);

        let pre_clamp = outcome.breakdown.capped_total * growth.multiplier;
        let total_multiplier = self.limits.clamp(pre_clamp);
        let final_score = base_score * total_multiplier;

        let mut metadata = ScoreMetadata {
            faults: outcome.faults,
            growth: growth.components,
            ..ScoreMetadata::default()
        };
        if let Some(fault) = growth.fault {
            metadata.faults.push(fault);
        }
        metadata
            .debug
            .insert("pre_clamp_total".to_string(), serde_json::json!(pre_clamp));

        for fault in &metadata.faults {
            warn!(
                entity = %metrics.key(),
                source = %fault.source,
                message = %fault.message,
                "Evaluation fault, neutral multiplier substituted"
            );
        }

        debug!(
            entity = %metrics.key(),
            base = base_score,
            raw_total = outcome.breakdown.raw_total,
            growth = growth.multiplier,
            total = total_multiplier,
            final_score,
            "Evaluated entity"
        );

        TrendingScore {
            entity_id: metrics.entity_id,
            entity_type: metrics.entity_type,
            timestamp: Utc::now(),
            as_of,
            favourites: metrics.favourites,
            base_score,
            boosts: outcome.breakdown,
            growth_multiplier: growth.multiplier,
            total_multiplier,
            final_score,
            algorithm_version: self.version.clone(),
            metadata,
        }
    }

    /// Read the history window from `store`, evaluate and append the snapshot.
    pub fn evaluate_and_record(
        &self,
        store: &dyn SnapshotStore,
        metrics: &EntityMetrics,
        as_of: DateTime<Utc>,
    ) -> Result<TrendingScore, StorageError> {
        let history = HistoryWindow::from_store(store, metrics.key(), as_of, self.lookbacks())?;
        let score = self.evaluate(metrics, &history, as_of);
        store.append(&score)?;
        Ok(score)
    }
}
