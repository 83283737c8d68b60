//! Engine Configuration Module
//!
//! Loads the boost tables, lifecycle thresholds and batch settings from one
//! TOML file into an immutable, validated `EngineConfig`.
//!
//! ## Loading Order
//!
//! 1. `TRENDWATCH_CONFIG` environment variable (path to TOML file)
//! 2. `trending_config.toml` in the current working directory
//!
//! A missing file, missing required key, or failed validation is fatal.
//!
//! ## Usage
//!
//! ```ignore
//! let config = EngineConfig::load()?;
//! let engine = TrendingScoreEngine::new(&config)?;
//! let rules = LifecycleRulesManager::new(&config);
//! ```

mod boosts;
mod engine_config;
mod lifecycle_rules;
pub mod defaults;
pub mod validation;

pub use boosts::*;
pub use engine_config::*;
pub use lifecycle_rules::*;
