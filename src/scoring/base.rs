//! Log-scaled base score from raw favourites.

use crate::config::{BaseScoreConfig, ConfigError};

/// `base = log10(max(favourites, min_favourites) + 1) * multiplier`
///
/// Monotonic non-decreasing in `favourites` and strictly positive.
#[derive(Debug, Clone)]
pub struct BaseScoreCalculator {
    min_favourites: u64,
    multiplier: f64,
}

impl BaseScoreCalculator {
    /// Fails when the floor or multiplier would allow a zero or negative score.
    pub fn new(config: &BaseScoreConfig) -> Result<Self, ConfigError> {
        let mut errors = Vec::new();
        if !config.multiplier.is_finite() || config.multiplier <= 0.0 {
            errors.push(format!("base_score.multiplier = {} must be > 0", config.multiplier));
        }
        if config.min_favourites < 1 {
            errors.push("base_score.min_favourites must be >= 1".to_string());
        }
        if !errors.is_empty() {
            return Err(ConfigError::Validation(errors));
        }
        Ok(Self {
            min_favourites: config.min_favourites,
            multiplier: config.multiplier,
        })
    }

    pub fn calculate(&self, favourites: u64) -> f64 {
        let adjusted = favourites.max(self.min_favourites) as f64;
        (adjusted + 1.0).log10() * self.multiplier
    }

    /// Score of an entity with no favourites at all.
    pub fn floor(&self) -> f64 {
        self.calculate(0)
    }
}
