//! Boost pipeline: independent multiplier functions over one entity's metrics
//!
//! Each boost is a pure function of `(EntityMetrics, as_of)`. The pipeline
//! multiplies every boost into `raw_total` and clamps it to the configured
//! limits. A boost that errors or returns an invalid multiplier is replaced by
//! the neutral 1.0 and reported as an `EvaluationFault`.

use chrono::{DateTime, Datelike, NaiveDate, Utc};

use crate::config::{
    EngineConfig, FinishedBoosts, GenderBoosts, KeywordGroup, LimitsConfig, LookupTable,
    PopularityTier, QualityTier, RecencyBoosts, ReleasingBoosts, StatusBoosts,
};
use crate::types::{
    BoostBreakdown, BoostCategory, EntityMetrics, EntityType, EvaluationFault, FaultSource,
    ReleaseStatus,
};

/// Neutral multiplier substituted for a faulted or inapplicable boost.
pub const NEUTRAL: f64 = 1.0;

/// A boost that could not produce a multiplier for one entity.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct BoostFault(pub String);

/// Evaluation-time context shared by every boost.
#[derive(Debug, Clone, Copy)]
pub struct BoostContext {
    pub as_of: DateTime<Utc>,
}

impl BoostContext {
    pub fn new(as_of: DateTime<Utc>) -> Self {
        Self { as_of }
    }

    pub fn today(&self) -> NaiveDate {
        self.as_of.date_naive()
    }
}

/// One multiplier function in the pipeline.
pub trait Boost: Send + Sync {
    fn category(&self) -> BoostCategory;

    /// Multiplier >= 0 for this entity.
    fn multiplier(&self, metrics: &EntityMetrics, ctx: &BoostContext) -> Result<f64, BoostFault>;
}

// ============================================================================
// Standard Boosts
// ============================================================================

/// Table lookup by gender; characters only.
pub struct GenderBoost {
    table: GenderBoosts,
}

impl Boost for GenderBoost {
    fn category(&self) -> BoostCategory {
        BoostCategory::Gender
    }

    fn multiplier(&self, m: &EntityMetrics, _ctx: &BoostContext) -> Result<f64, BoostFault> {
        if m.entity_type != EntityType::Character {
            return Ok(NEUTRAL);
        }
        Ok(self.table.lookup(m.gender.as_deref()))
    }
}

/// Highest met favourites tier wins.
pub struct PopularityBoost {
    /// Sorted by `min_favourites` descending
    tiers: Vec<PopularityTier>,
}

impl PopularityBoost {
    pub fn new(mut tiers: Vec<PopularityTier>) -> Self {
        tiers.sort_by(|a, b| b.min_favourites.cmp(&a.min_favourites));
        Self { tiers }
    }
}

impl Boost for PopularityBoost {
    fn category(&self) -> BoostCategory {
        BoostCategory::Popularity
    }

    fn multiplier(&self, m: &EntityMetrics, _ctx: &BoostContext) -> Result<f64, BoostFault> {
        Ok(self
            .tiers
            .iter()
            .find(|t| m.favourites >= t.min_favourites)
            .map_or(NEUTRAL, |t| t.boost))
    }
}

/// Release status, aged by days since start (RELEASING) or end (FINISHED).
pub struct StatusBoost {
    config: StatusBoosts,
}

impl StatusBoost {
    fn releasing(cfg: &ReleasingBoosts, start: Option<NaiveDate>, today: NaiveDate) -> f64 {
        let Some(start) = start else {
            return cfg.current;
        };
        let elapsed = (today - start).num_days();
        if elapsed <= cfg.new_days {
            cfg.new
        } else if elapsed <= cfg.current_days {
            cfg.current
        } else {
            cfg.long_running
        }
    }

    fn finished(cfg: &FinishedBoosts, end: Option<NaiveDate>, today: NaiveDate) -> f64 {
        let Some(end) = end else {
            return cfg.semi_recent;
        };
        let elapsed = (today - end).num_days();
        if elapsed <= cfg.recent_days {
            cfg.recent
        } else if elapsed <= cfg.semi_recent_days {
            cfg.semi_recent
        } else {
            cfg.old
        }
    }
}

impl Boost for StatusBoost {
    fn category(&self) -> BoostCategory {
        BoostCategory::Status
    }

    fn multiplier(&self, m: &EntityMetrics, ctx: &BoostContext) -> Result<f64, BoostFault> {
        let today = ctx.today();
        Ok(match m.status {
            None => NEUTRAL,
            Some(ReleaseStatus::Releasing) => Self::releasing(&self.config.releasing, m.start_date, today),
            Some(ReleaseStatus::Finished) => Self::finished(&self.config.finished, m.end_date, today),
            Some(ReleaseStatus::NotYetReleased) => self.config.not_yet_released,
            Some(ReleaseStatus::Cancelled) => self.config.cancelled,
            Some(ReleaseStatus::Hiatus) => self.config.hiatus,
        })
    }
}

/// Tiered by `current_year - season_year`, first matching tier in file order.
pub struct RecencyBoost {
    config: RecencyBoosts,
}

impl Boost for RecencyBoost {
    fn category(&self) -> BoostCategory {
        BoostCategory::Recency
    }

    fn multiplier(&self, m: &EntityMetrics, ctx: &BoostContext) -> Result<f64, BoostFault> {
        let Some(season_year) = m.season_year else {
            return Ok(NEUTRAL);
        };
        let current_year = self.config.current_year.unwrap_or_else(|| ctx.as_of.year());
        let years_ago = current_year
            .checked_sub(season_year)
            .ok_or_else(|| BoostFault(format!("season_year {season_year} out of range")))?;
        Ok(self
            .config
            .tiers
            .iter()
            .find(|t| years_ago <= t.max_years_ago)
            .map_or(NEUTRAL, |t| t.boost))
    }
}

/// Media format lookup.
pub struct FormatBoost {
    table: LookupTable,
}

impl Boost for FormatBoost {
    fn category(&self) -> BoostCategory {
        BoostCategory::Format
    }

    fn multiplier(&self, m: &EntityMetrics, _ctx: &BoostContext) -> Result<f64, BoostFault> {
        Ok(self.table.lookup(m.format.as_deref()))
    }
}

/// Character role lookup; characters only.
pub struct RoleBoost {
    table: LookupTable,
}

impl Boost for RoleBoost {
    fn category(&self) -> BoostCategory {
        BoostCategory::Role
    }

    fn multiplier(&self, m: &EntityMetrics, _ctx: &BoostContext) -> Result<f64, BoostFault> {
        if m.entity_type != EntityType::Character {
            return Ok(NEUTRAL);
        }
        Ok(self.table.lookup(Some(m.role.as_str())))
    }
}

/// Case-insensitive substring match of the series name; first group wins.
pub struct KeywordBoost {
    /// Keywords pre-lowercased, empty entries dropped
    groups: Vec<KeywordGroup>,
    default_boost: f64,
}

impl KeywordBoost {
    pub fn new(groups: &[KeywordGroup], default_boost: f64) -> Self {
        let groups = groups
            .iter()
            .map(|g| KeywordGroup {
                keywords: g
                    .keywords
                    .iter()
                    .map(|k| k.trim().to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect(),
                boost: g.boost,
            })
            .collect();
        Self { groups, default_boost }
    }
}

impl Boost for KeywordBoost {
    fn category(&self) -> BoostCategory {
        BoostCategory::Keyword
    }

    fn multiplier(&self, m: &EntityMetrics, _ctx: &BoostContext) -> Result<f64, BoostFault> {
        let Some(name) = m.series_name.as_deref() else {
            return Ok(self.default_boost);
        };
        let name = name.to_lowercase();
        Ok(self
            .groups
            .iter()
            .find(|g| g.keywords.iter().any(|k| name.contains(k.as_str())))
            .map_or(self.default_boost, |g| g.boost))
    }
}

/// Tiered boost on `average_score`; neutral when absent or no tier matches.
pub struct QualityBoost {
    /// Sorted by `min_average_score` descending
    tiers: Vec<QualityTier>,
}

impl QualityBoost {
    pub fn new(mut tiers: Vec<QualityTier>) -> Self {
        tiers.sort_by(|a, b| b.min_average_score.total_cmp(&a.min_average_score));
        Self { tiers }
    }
}

impl Boost for QualityBoost {
    fn category(&self) -> BoostCategory {
        BoostCategory::Quality
    }

    fn multiplier(&self, m: &EntityMetrics, _ctx: &BoostContext) -> Result<f64, BoostFault> {
        let Some(score) = m.average_score else {
            return Ok(NEUTRAL);
        };
        if !(0.0..=100.0).contains(&score) {
            return Err(BoostFault(format!("average_score {score} outside 0-100")));
        }
        Ok(self
            .tiers
            .iter()
            .find(|t| score >= t.min_average_score)
            .map_or(NEUTRAL, |t| t.boost))
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Result of running every boost for one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutcome {
    pub breakdown: BoostBreakdown,
    pub faults: Vec<EvaluationFault>,
}

/// Ordered set of independent boosts plus the total multiplier limits.
pub struct BoostPipeline {
    boosts: Vec<Box<dyn Boost>>,
    limits: LimitsConfig,
}

impl BoostPipeline {
    /// The standard boost set built from the loaded configuration.
    pub fn standard(config: &EngineConfig) -> Self {
        let boosts: Vec<Box<dyn Boost>> = vec![
            Box::new(GenderBoost { table: config.gender_boosts.clone() }),
            Box::new(PopularityBoost::new(config.popularity_boosts.tiers.clone())),
            Box::new(StatusBoost { config: config.status_boosts.clone() }),
            Box::new(RecencyBoost { config: config.recency_boosts.clone() }),
            Box::new(FormatBoost { table: config.format_boosts.clone() }),
            Box::new(RoleBoost { table: config.role_boosts.clone() }),
            Box::new(KeywordBoost::new(
                &config.series_keywords_boosts.trending_keywords,
                config.series_keywords_boosts.default_boost,
            )),
            Box::new(QualityBoost::new(config.quality_boosts.tiers.clone())),
        ];
        Self::with_boosts(boosts, config.limits.clone())
    }

    pub fn with_boosts(boosts: Vec<Box<dyn Boost>>, limits: LimitsConfig) -> Self {
        Self { boosts, limits }
    }

    pub fn limits(&self) -> &LimitsConfig {
        &self.limits
    }

    /// Run every boost, substituting the neutral multiplier for faults.
    pub fn apply(&self, metrics: &EntityMetrics, ctx: &BoostContext) -> PipelineOutcome {
        let mut breakdown = BoostBreakdown::default();
        let mut faults = Vec::new();
        let mut raw_total = 1.0;

        for boost in &self.boosts {
            let category = boost.category();
            let value = match boost.multiplier(metrics, ctx) {
                Ok(v) if v.is_finite() && v >= 0.0 => v,
                Ok(v) => {
                    faults.push(EvaluationFault {
                        source: FaultSource::Boost(category),
                        message: format!("invalid multiplier {v}"),
                    });
                    NEUTRAL
                }
                Err(e) => {
                    faults.push(EvaluationFault {
                        source: FaultSource::Boost(category),
                        message: e.to_string(),
                    });
                    NEUTRAL
                }
            };
            breakdown.set(category, value);
            raw_total *= value;
        }

        breakdown.raw_total = raw_total;
        breakdown.capped_total = self.limits.clamp(raw_total);
        PipelineOutcome { breakdown, faults }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CharacterRole;
    use chrono::TimeZone;

    fn ctx() -> BoostContext {
        BoostContext::new(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap())
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn pipeline() -> BoostPipeline {
        BoostPipeline::standard(&EngineConfig::default())
    }

    struct FailingBoost;

    impl Boost for FailingBoost {
        fn category(&self) -> BoostCategory {
            BoostCategory::Keyword
        }
        fn multiplier(&self, _m: &EntityMetrics, _c: &BoostContext) -> Result<f64, BoostFault> {
            Err(BoostFault("lookup table unavailable".to_string()))
        }
    }

    struct NanBoost;

    impl Boost for NanBoost {
        fn category(&self) -> BoostCategory {
            BoostCategory::Format
        }
        fn multiplier(&self, _m: &EntityMetrics, _c: &BoostContext) -> Result<f64, BoostFault> {
            Ok(f64::NAN)
        }
    }

    #[test]
    fn test_unknown_gender_uses_unknown_entry() {
        let out = pipeline().apply(&EntityMetrics::character(1, 0), &ctx());
        assert_eq!(out.breakdown.gender, 0.95);
    }

    #[test]
    fn test_gender_and_role_neutral_for_media() {
        let mut m = EntityMetrics::media(1, 0);
        m.gender = Some("FEMALE".to_string());
        m.role = CharacterRole::Background;
        let out = pipeline().apply(&m, &ctx());
        assert_eq!(out.breakdown.gender, 1.0);
        assert_eq!(out.breakdown.role, 1.0);
    }

    #[test]
    fn test_popularity_highest_tier_first() {
        let p = PopularityBoost::new(EngineConfig::default().popularity_boosts.tiers);
        let c = ctx();
        assert_eq!(p.multiplier(&EntityMetrics::character(1, 50_000), &c).unwrap(), 1.15);
        assert_eq!(p.multiplier(&EntityMetrics::character(1, 20_000), &c).unwrap(), 1.10);
        assert_eq!(p.multiplier(&EntityMetrics::character(1, 12_000), &c).unwrap(), 1.05);
        assert_eq!(p.multiplier(&EntityMetrics::character(1, 9_999), &c).unwrap(), 1.0);
    }

    #[test]
    fn test_status_releasing_tiers() {
        let b = StatusBoost { config: StatusBoosts::default() };
        let c = ctx();
        let mut m = EntityMetrics::media(1, 0);
        m.status = Some(ReleaseStatus::Releasing);

        m.start_date = Some(date(2024, 5, 20));
        assert_eq!(b.multiplier(&m, &c).unwrap(), 2.5);
        m.start_date = Some(date(2024, 1, 1));
        assert_eq!(b.multiplier(&m, &c).unwrap(), 1.8);
        m.start_date = Some(date(2020, 1, 1));
        assert_eq!(b.multiplier(&m, &c).unwrap(), 1.2);
        m.start_date = None;
        assert_eq!(b.multiplier(&m, &c).unwrap(), 1.8);
    }

    #[test]
    fn test_status_finished_tiers() {
        let b = StatusBoost { config: StatusBoosts::default() };
        let c = ctx();
        let mut m = EntityMetrics::media(1, 0);
        m.status = Some(ReleaseStatus::Finished);

        m.end_date = Some(date(2024, 4, 1));
        assert_eq!(b.multiplier(&m, &c).unwrap(), 1.5);
        m.end_date = Some(date(2023, 10, 1));
        assert_eq!(b.multiplier(&m, &c).unwrap(), 1.1);
        m.end_date = Some(date(2019, 1, 1));
        assert_eq!(b.multiplier(&m, &c).unwrap(), 0.9);
        m.end_date = None;
        assert_eq!(b.multiplier(&m, &c).unwrap(), 1.1);
    }

    #[test]
    fn test_status_flat_values_and_missing() {
        let b = StatusBoost { config: StatusBoosts::default() };
        let c = ctx();
        let mut m = EntityMetrics::media(1, 0);
        assert_eq!(b.multiplier(&m, &c).unwrap(), 1.0);
        m.status = Some(ReleaseStatus::Cancelled);
        assert_eq!(b.multiplier(&m, &c).unwrap(), 0.7);
        m.status = Some(ReleaseStatus::NotYetReleased);
        assert_eq!(b.multiplier(&m, &c).unwrap(), 1.3);
    }

    #[test]
    fn test_recency_missing_year_is_neutral() {
        let b = RecencyBoost { config: RecencyBoosts::default() };
        let m = EntityMetrics::media(1, 0);
        assert_eq!(b.multiplier(&m, &ctx()).unwrap(), 1.0);
    }

    #[test]
    fn test_recency_uses_as_of_year_unless_pinned() {
        let mut b = RecencyBoost { config: RecencyBoosts::default() };
        let mut m = EntityMetrics::media(1, 0);
        m.season_year = Some(2023);
        assert_eq!(b.multiplier(&m, &ctx()).unwrap(), 1.15);
        m.season_year = Some(2010);
        assert_eq!(b.multiplier(&m, &ctx()).unwrap(), 1.0);

        b.config.current_year = Some(2023);
        m.season_year = Some(2023);
        assert_eq!(b.multiplier(&m, &ctx()).unwrap(), 1.3);
    }

    #[test]
    fn test_keyword_case_insensitive_first_group_wins() {
        let groups = vec![
            KeywordGroup { keywords: vec!["Jujutsu".to_string()], boost: 1.2 },
            KeywordGroup { keywords: vec!["kaisen".to_string()], boost: 1.5 },
        ];
        let b = KeywordBoost::new(&groups, 0.9);
        let mut m = EntityMetrics::media(1, 0);
        m.series_name = Some("JUJUTSU KAISEN Season 2".to_string());
        assert_eq!(b.multiplier(&m, &ctx()).unwrap(), 1.2);
        m.series_name = Some("Frieren".to_string());
        assert_eq!(b.multiplier(&m, &ctx()).unwrap(), 0.9);
        m.series_name = None;
        assert_eq!(b.multiplier(&m, &ctx()).unwrap(), 0.9);
    }

    #[test]
    fn test_quality_tiers_and_out_of_range() {
        let b = QualityBoost::new(vec![
            QualityTier { min_average_score: 70.0, boost: 1.05 },
            QualityTier { min_average_score: 85.0, boost: 1.1 },
        ]);
        let mut m = EntityMetrics::media(1, 0);
        assert_eq!(b.multiplier(&m, &ctx()).unwrap(), 1.0);
        m.average_score = Some(90.0);
        assert_eq!(b.multiplier(&m, &ctx()).unwrap(), 1.1);
        m.average_score = Some(72.0);
        assert_eq!(b.multiplier(&m, &ctx()).unwrap(), 1.05);
        m.average_score = Some(140.0);
        assert!(b.multiplier(&m, &ctx()).is_err());
    }

    #[test]
    fn test_pipeline_clamps_but_keeps_raw_total() {
        let mut config = EngineConfig::default();
        config.limits.max_total_multiplier = 1.5;
        let mut m = EntityMetrics::character(1, 40_000);
        m.gender = Some("FEMALE".to_string());
        m.role = CharacterRole::Background;
        m.status = Some(ReleaseStatus::Releasing);
        m.start_date = Some(date(2024, 5, 25));
        let out = BoostPipeline::standard(&config).apply(&m, &ctx());
        assert!(out.breakdown.raw_total > 1.5);
        assert_eq!(out.breakdown.capped_total, 1.5);
        assert!(out.faults.is_empty());
    }

    #[test]
    fn test_faulty_boost_substitutes_neutral() {
        let boosts: Vec<Box<dyn Boost>> = vec![Box::new(FailingBoost), Box::new(NanBoost)];
        let p = BoostPipeline::with_boosts(boosts, LimitsConfig::default());
        let out = p.apply(&EntityMetrics::media(1, 10), &ctx());
        assert_eq!(out.breakdown.keyword, 1.0);
        assert_eq!(out.breakdown.format, 1.0);
        assert_eq!(out.breakdown.raw_total, 1.0);
        assert_eq!(out.faults.len(), 2);
        assert_eq!(out.faults[0].source, FaultSource::Boost(BoostCategory::Keyword));
        assert!(out.faults[1].message.contains("invalid multiplier"));
    }
}
