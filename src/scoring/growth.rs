//! Growth / momentum multiplier
//!
//! Compares current favourites against the stored favourites at each
//! configured lookback point. A missing history point contributes zero
//! growth; it is a gap, not a decline.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

use crate::config::{GrowthConfig, Lookback};
use crate::storage::{SnapshotStore, StorageError};
use crate::types::{EntityKey, EvaluationFault, FaultSource, LookbackGrowth};

/// Historical favourites per lookback (days), `None` where no snapshot exists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryWindow {
    points: BTreeMap<u32, Option<u64>>,
}

impl HistoryWindow {
    /// No history at all; every lookback is a gap.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_point(mut self, days: u32, favourites: Option<u64>) -> Self {
        self.points.insert(days, favourites);
        self
    }

    /// Latest stored snapshot at or before `as_of - days` for every lookback.
    pub fn from_store(
        store: &dyn SnapshotStore,
        key: EntityKey,
        as_of: DateTime<Utc>,
        lookbacks: &[Lookback],
    ) -> Result<Self, StorageError> {
        let mut window = Self::empty();
        for lookback in lookbacks {
            let at = as_of - Duration::days(i64::from(lookback.days));
            let favourites = store.latest_at_or_before(key, at)?.map(|s| s.favourites);
            window.points.insert(lookback.days, favourites);
        }
        Ok(window)
    }

    pub fn get(&self, days: u32) -> Option<u64> {
        self.points.get(&days).copied().flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.points.values().all(Option::is_none)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GrowthOutcome {
    pub multiplier: f64,
    pub components: Vec<LookbackGrowth>,
    pub fault: Option<EvaluationFault>,
}

/// `clamp(1 + Σ weight_d * growth_d, min_multiplier, max_multiplier)`
#[derive(Debug, Clone)]
pub struct GrowthCalculator {
    config: GrowthConfig,
}

impl GrowthCalculator {
    pub fn new(config: &GrowthConfig) -> Self {
        Self { config: config.clone() }
    }

    pub fn lookbacks(&self) -> &[Lookback] {
        &self.config.lookbacks
    }

    pub fn compute(&self, current: u64, window: &HistoryWindow) -> GrowthOutcome {
        let mut components = Vec::with_capacity(self.config.lookbacks.len());
        let mut total_growth = 0.0;

        for lookback in &self.config.lookbacks {
            let historical = window.get(lookback.days);
            let growth = match historical {
                Some(h) if h > 0 => (current as f64 - h as f64) / h as f64,
                _ => 0.0,
            };
            total_growth += lookback.weight * growth;
            components.push(LookbackGrowth {
                days: lookback.days,
                weight: lookback.weight,
                historical,
                growth,
            });
        }

        let raw = 1.0 + total_growth;
        if !raw.is_finite() {
            return GrowthOutcome {
                multiplier: 1.0,
                components,
                fault: Some(EvaluationFault {
                    source: FaultSource::Growth,
                    message: format!("non-finite growth total {total_growth}"),
                }),
            };
        }

        GrowthOutcome {
            multiplier: raw.clamp(self.config.min_multiplier, self.config.max_multiplier),
            components,
            fault: None,
        }
    }
}
