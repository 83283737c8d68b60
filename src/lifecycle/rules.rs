//! Lifecycle rules: read-only view of the lifecycle sections of the config.

use serde::Serialize;

use crate::config::validation::validate_ranges;
use crate::config::{
    BonusConditions, EngineConfig, PeriodsConfig, ScoringWeights, ThresholdsConfig,
};

/// Config sections the lifecycle rules are drawn from.
const RULE_SECTIONS: [&str; 3] = ["periods.", "thresholds.", "scoring."];

/// Named rule for `LifecycleRulesManager::explain`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    GracePeriod,
    KeepActive,
    ExtendGrace,
    Cleanup,
}

impl std::str::FromStr for RuleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "grace_period" => Ok(RuleKind::GracePeriod),
            "keep_active" => Ok(RuleKind::KeepActive),
            "extend_grace" => Ok(RuleKind::ExtendGrace),
            "cleanup" => Ok(RuleKind::Cleanup),
            other => Err(format!("unknown rule '{other}'")),
        }
    }
}

/// Outcome of checking the lifecycle rules alone.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RulesReport {
    pub valid: bool,
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct LifecycleRulesManager {
    periods: PeriodsConfig,
    thresholds: ThresholdsConfig,
    weights: ScoringWeights,
    bonuses: BonusConditions,
}

impl LifecycleRulesManager {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            periods: config.periods.clone(),
            thresholds: config.thresholds.clone(),
            weights: config.scoring.weights.clone(),
            bonuses: config.scoring.bonus_conditions.clone(),
        }
    }

    pub fn grace_period_days(&self) -> u32 {
        self.periods.grace_period_days
    }

    pub fn extended_grace_days(&self) -> u32 {
        self.periods.extended_grace_days
    }

    pub fn cleanup_days(&self) -> u32 {
        self.periods.cleanup_days
    }

    pub fn thresholds(&self) -> &ThresholdsConfig {
        &self.thresholds
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    pub fn bonuses(&self) -> &BonusConditions {
        &self.bonuses
    }

    /// One-sentence description of a rule with the configured numbers filled in.
    pub fn explain(&self, rule: RuleKind) -> String {
        match rule {
            RuleKind::GracePeriod => format!(
                "Newly released series stay in grace for {} days before their first evaluation",
                self.grace_period_days()
            ),
            RuleKind::KeepActive => format!(
                "Series are kept active when composite score >= {} and popularity >= {}, favourites >= {} or top character trending >= {}",
                self.thresholds.keep_active.min_composite_score,
                self.thresholds.keep_active.min_popularity,
                self.thresholds.keep_active.min_favourites,
                self.thresholds.keep_active.min_character_trending,
            ),
            RuleKind::ExtendGrace => format!(
                "Grace is extended by {} days when composite score >= {:.1} and there is any activity",
                self.extended_grace_days(),
                self.thresholds.extend_grace_score()
            ),
            RuleKind::Cleanup => format!(
                "Series archived for more than {} days become ready for deletion",
                self.cleanup_days()
            ),
        }
    }

    /// Re-check a config's lifecycle sections, splitting fatal issues from warnings.
    pub fn validate(config: &EngineConfig) -> RulesReport {
        let in_rules = |field: &str| RULE_SECTIONS.iter().any(|s| field.starts_with(s));
        let (errors, warnings) = validate_ranges(config);
        let issues: Vec<String> = errors.into_iter().filter(|e| in_rules(e)).collect();
        let warnings: Vec<String> = warnings
            .into_iter()
            .filter(|w| in_rules(&w.field))
            .map(|w| w.to_string())
            .collect();
        RulesReport {
            valid: issues.is_empty(),
            issues,
            warnings,
        }
    }
}
