//! Config validation: unknown-key detection with Levenshtein suggestions
//! and range checks over every scoring and lifecycle value.
//!
//! Two-pass parse approach: first deserialize raw TOML into `toml::Value`,
//! walk the key tree, compare against known field names, and emit warnings
//! with "did you mean?" suggestions. Then proceed with strict serde
//! deserialization followed by `validate_ranges`.

use std::collections::{BTreeSet, HashSet};

use super::defaults::{
    LONG_GRACE_PERIOD_DAYS, MIN_GRACE_PERIOD_DAYS, SUGGESTION_MAX_DISTANCE, WEIGHT_SUM_TOLERANCE,
};
use super::EngineConfig;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

impl ValidationWarning {
    fn range(field: &str, message: String) -> Self {
        Self {
            field: field.to_string(),
            message,
            suggestion: None,
        }
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Tables whose keys are operator-chosen lookup values.
const FREE_FORM_TABLES: &[&str] = &["gender_boosts", "format_boosts", "role_boosts"];

/// Returns the complete set of valid dotted key paths for EngineConfig.
///
/// Maintained by hand to match the struct hierarchy in engine_config.rs,
/// boosts.rs and lifecycle_rules.rs. Array-of-table entries (tiers, keyword
/// groups, lookbacks) are not walked.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [algorithm]
        "algorithm",
        "algorithm.version",
        // [base_score]
        "base_score",
        "base_score.min_favourites",
        "base_score.multiplier",
        // free-form lookup tables
        "gender_boosts",
        "format_boosts",
        "role_boosts",
        // [popularity_boosts]
        "popularity_boosts",
        "popularity_boosts.tiers",
        // [status_boosts]
        "status_boosts",
        "status_boosts.NOT_YET_RELEASED",
        "status_boosts.CANCELLED",
        "status_boosts.HIATUS",
        "status_boosts.RELEASING",
        "status_boosts.RELEASING.new_days",
        "status_boosts.RELEASING.new",
        "status_boosts.RELEASING.current_days",
        "status_boosts.RELEASING.current",
        "status_boosts.RELEASING.long_running",
        "status_boosts.FINISHED",
        "status_boosts.FINISHED.recent_days",
        "status_boosts.FINISHED.recent",
        "status_boosts.FINISHED.semi_recent_days",
        "status_boosts.FINISHED.semi_recent",
        "status_boosts.FINISHED.old",
        // [recency_boosts]
        "recency_boosts",
        "recency_boosts.current_year",
        "recency_boosts.tiers",
        // [series_keywords_boosts]
        "series_keywords_boosts",
        "series_keywords_boosts.default_boost",
        "series_keywords_boosts.trending_keywords",
        // [quality_boosts]
        "quality_boosts",
        "quality_boosts.tiers",
        // [limits]
        "limits",
        "limits.min_total_multiplier",
        "limits.max_total_multiplier",
        // [growth]
        "growth",
        "growth.min_multiplier",
        "growth.max_multiplier",
        "growth.lookbacks",
        // [periods]
        "periods",
        "periods.grace_period_days",
        "periods.extended_grace_days",
        "periods.cleanup_days",
        // [thresholds]
        "thresholds",
        "thresholds.keep_active",
        "thresholds.keep_active.min_composite_score",
        "thresholds.keep_active.min_popularity",
        "thresholds.keep_active.min_favourites",
        "thresholds.keep_active.min_character_trending",
        "thresholds.extend_grace",
        "thresholds.extend_grace.min_composite_score_ratio",
        // [scoring]
        "scoring",
        "scoring.weights",
        "scoring.weights.popularity",
        "scoring.weights.favourites",
        "scoring.weights.trending",
        "scoring.weights.character_count_multiplier",
        "scoring.weights.avg_character_trending",
        "scoring.weights.max_character_trending",
        "scoring.bonus_conditions",
        "scoring.bonus_conditions.high_character_engagement",
        "scoring.bonus_conditions.high_character_engagement.min_max_character_trending",
        "scoring.bonus_conditions.high_character_engagement.bonus_multiplier",
        "scoring.bonus_conditions.seasonal_relevance",
        "scoring.bonus_conditions.seasonal_relevance.window_days",
        "scoring.bonus_conditions.seasonal_relevance.bonus_multiplier",
        // [aggregation]
        "aggregation",
        "aggregation.trend_stable_band",
        // [retention]
        "retention",
        "retention.daily_days",
        "retention.weekly_weeks",
        "retention.monthly_months",
        "retention.yearly_years",
        // [batch]
        "batch",
        "batch.max_concurrency",
        "batch.data_dir",
    ];
    keys.iter().copied().collect()
}

fn is_free_form(key: &str) -> bool {
    FREE_FORM_TABLES
        .iter()
        .any(|table| key.strip_prefix(table).is_some_and(|rest| rest.starts_with('.')))
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// For example, a table `{ a = { b = 1, c = 2 } }` yields:
/// `["a", "a.b", "a.c"]`
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
///
/// Ties resolve to the lexicographically smallest key.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    let mut best: Option<(&str, usize)> = None;
    for &k in known {
        let dist = levenshtein(unknown, k);
        if dist > SUGGESTION_MAX_DISTANCE {
            continue;
        }
        best = match best {
            Some((bk, bd)) if bd < dist || (bd == dist && bk <= k) => Some((bk, bd)),
            _ => Some((k, dist)),
        };
    }
    best.map(|(k, _)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
///
/// Never fails: parse errors are reported by the strict serde pass.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(),
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()) && !is_free_form(key))
        .map(|key| {
            let suggestion = suggest_correction(&key, &known);
            ValidationWarning {
                message: format!("Unknown config key '{key}'"),
                field: key,
                suggestion,
            }
        })
        .collect()
}

// ============================================================================
// Range Validation
// ============================================================================

fn check_boost(name: &str, value: f64, errors: &mut Vec<String>) {
    if !value.is_finite() || value < 0.0 {
        errors.push(format!("{name} = {value} must be a finite, non-negative multiplier"));
    }
}

fn check_collisions(table: &str, pairs: Vec<(String, String)>, errors: &mut Vec<String>) {
    for (a, b) in pairs {
        errors.push(format!("{table}.{b} names the same entry as {table}.{a}"));
    }
}

/// Validate ranges on a parsed EngineConfig.
///
/// Returns (errors, warnings). Errors must prevent startup; warnings are
/// suspicious but not fatal.
pub fn validate_ranges(config: &EngineConfig) -> (Vec<String>, Vec<ValidationWarning>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    // Base score
    let base = &config.base_score;
    if !base.multiplier.is_finite() || base.multiplier <= 0.0 {
        errors.push(format!("base_score.multiplier = {} must be > 0", base.multiplier));
    }
    if base.min_favourites < 1 {
        errors.push("base_score.min_favourites must be >= 1 so the base score never collapses to 0".to_string());
    }

    // Boost tables
    check_boost("gender_boosts.unknown", config.gender_boosts.unknown, &mut errors);
    for (k, v) in &config.gender_boosts.values {
        check_boost(&format!("gender_boosts.{k}"), *v, &mut errors);
    }
    check_collisions("gender_boosts", config.gender_boosts.colliding_keys(), &mut errors);

    let mut seen_thresholds = BTreeSet::new();
    for tier in &config.popularity_boosts.tiers {
        check_boost(
            &format!("popularity_boosts.tiers[min_favourites={}].boost", tier.min_favourites),
            tier.boost,
            &mut errors,
        );
        if !seen_thresholds.insert(tier.min_favourites) {
            warnings.push(ValidationWarning::range(
                "popularity_boosts.tiers",
                format!("duplicate popularity tier threshold {}", tier.min_favourites),
            ));
        }
    }

    let s = &config.status_boosts;
    for (name, v) in [
        ("status_boosts.NOT_YET_RELEASED", s.not_yet_released),
        ("status_boosts.CANCELLED", s.cancelled),
        ("status_boosts.HIATUS", s.hiatus),
        ("status_boosts.RELEASING.new", s.releasing.new),
        ("status_boosts.RELEASING.current", s.releasing.current),
        ("status_boosts.RELEASING.long_running", s.releasing.long_running),
        ("status_boosts.FINISHED.recent", s.finished.recent),
        ("status_boosts.FINISHED.semi_recent", s.finished.semi_recent),
        ("status_boosts.FINISHED.old", s.finished.old),
    ] {
        check_boost(name, v, &mut errors);
    }
    if s.releasing.new_days > s.releasing.current_days {
        errors.push(format!(
            "status_boosts.RELEASING.new_days ({}) must be <= current_days ({})",
            s.releasing.new_days, s.releasing.current_days
        ));
    }
    if s.finished.recent_days > s.finished.semi_recent_days {
        errors.push(format!(
            "status_boosts.FINISHED.recent_days ({}) must be <= semi_recent_days ({})",
            s.finished.recent_days, s.finished.semi_recent_days
        ));
    }

    for tier in &config.recency_boosts.tiers {
        check_boost(
            &format!("recency_boosts.tiers[max_years_ago={}].boost", tier.max_years_ago),
            tier.boost,
            &mut errors,
        );
    }
    check_boost("format_boosts.default", config.format_boosts.default, &mut errors);
    for (k, v) in &config.format_boosts.values {
        check_boost(&format!("format_boosts.{k}"), *v, &mut errors);
    }
    check_collisions("format_boosts", config.format_boosts.colliding_keys(), &mut errors);
    check_boost("role_boosts.default", config.role_boosts.default, &mut errors);
    for (k, v) in &config.role_boosts.values {
        check_boost(&format!("role_boosts.{k}"), *v, &mut errors);
    }
    check_collisions("role_boosts", config.role_boosts.colliding_keys(), &mut errors);

    let kw = &config.series_keywords_boosts;
    check_boost("series_keywords_boosts.default_boost", kw.default_boost, &mut errors);
    for (i, group) in kw.trending_keywords.iter().enumerate() {
        check_boost(&format!("series_keywords_boosts.trending_keywords[{i}].boost"), group.boost, &mut errors);
        if group.keywords.iter().all(|k| k.trim().is_empty()) {
            warnings.push(ValidationWarning::range(
                "series_keywords_boosts.trending_keywords",
                format!("keyword group {i} has no keywords and will never match"),
            ));
        }
    }

    for tier in &config.quality_boosts.tiers {
        check_boost(
            &format!("quality_boosts.tiers[min_average_score={}].boost", tier.min_average_score),
            tier.boost,
            &mut errors,
        );
    }

    // Limits
    let l = &config.limits;
    if !l.min_total_multiplier.is_finite() || !l.max_total_multiplier.is_finite() {
        errors.push("limits: multiplier limits must be finite".to_string());
    } else {
        if l.min_total_multiplier <= 0.0 {
            errors.push(format!("limits.min_total_multiplier = {} must be > 0", l.min_total_multiplier));
        }
        if l.min_total_multiplier > l.max_total_multiplier {
            errors.push(format!(
                "limits.min_total_multiplier ({}) must be <= max_total_multiplier ({})",
                l.min_total_multiplier, l.max_total_multiplier
            ));
        }
    }

    // Growth
    let g = &config.growth;
    if !g.min_multiplier.is_finite() || !g.max_multiplier.is_finite() || g.min_multiplier < 0.0 {
        errors.push("growth: multiplier bounds must be finite and non-negative".to_string());
    } else if g.min_multiplier > g.max_multiplier {
        errors.push(format!(
            "growth.min_multiplier ({}) must be <= max_multiplier ({})",
            g.min_multiplier, g.max_multiplier
        ));
    }
    let mut seen_days = BTreeSet::new();
    for lb in &g.lookbacks {
        if lb.days == 0 {
            errors.push("growth.lookbacks: days must be > 0".to_string());
        } else if !seen_days.insert(lb.days) {
            errors.push(format!("growth.lookbacks: duplicate lookback of {} days", lb.days));
        }
        if !lb.weight.is_finite() || lb.weight < 0.0 {
            errors.push(format!("growth.lookbacks[{}d].weight = {} must be >= 0", lb.days, lb.weight));
        }
    }

    // Periods
    let p = &config.periods;
    if p.grace_period_days < MIN_GRACE_PERIOD_DAYS {
        errors.push(format!(
            "periods.grace_period_days = {} is too short (< {MIN_GRACE_PERIOD_DAYS} days)",
            p.grace_period_days
        ));
    } else if p.grace_period_days > LONG_GRACE_PERIOD_DAYS {
        warnings.push(ValidationWarning::range(
            "periods.grace_period_days",
            format!(
                "periods.grace_period_days = {} is very long (> {LONG_GRACE_PERIOD_DAYS} days)",
                p.grace_period_days
            ),
        ));
    }
    if p.extended_grace_days == 0 {
        errors.push("periods.extended_grace_days must be > 0".to_string());
    }
    if p.cleanup_days == 0 {
        errors.push("periods.cleanup_days must be > 0".to_string());
    }

    // Thresholds
    let t = &config.thresholds;
    let ka = &t.keep_active;
    if !ka.min_composite_score.is_finite() || ka.min_composite_score <= 0.0 {
        errors.push(format!(
            "thresholds.keep_active.min_composite_score = {} must be > 0",
            ka.min_composite_score
        ));
    }
    for (name, v) in [
        ("thresholds.keep_active.min_popularity", ka.min_popularity),
        ("thresholds.keep_active.min_favourites", ka.min_favourites),
        ("thresholds.keep_active.min_character_trending", ka.min_character_trending),
    ] {
        if !v.is_finite() || v < 0.0 {
            errors.push(format!("{name} = {v} must be a finite, non-negative number"));
        }
    }
    let ratio = t.extend_grace.min_composite_score_ratio;
    if !(ratio > 0.0 && ratio <= 1.0) {
        errors.push(format!(
            "thresholds.extend_grace.min_composite_score_ratio = {ratio} must be in (0, 1]"
        ));
    }

    // Composite scoring
    let w = &config.scoring.weights;
    for (name, v) in [
        ("scoring.weights.popularity", w.popularity),
        ("scoring.weights.favourites", w.favourites),
        ("scoring.weights.trending", w.trending),
        ("scoring.weights.character_count_multiplier", w.character_count_multiplier),
        ("scoring.weights.avg_character_trending", w.avg_character_trending),
        ("scoring.weights.max_character_trending", w.max_character_trending),
    ] {
        if !v.is_finite() || v < 0.0 {
            errors.push(format!("{name} = {v} must be a finite, non-negative weight"));
        }
    }
    let weight_sum = w.fractional_sum();
    if weight_sum.is_finite() && (weight_sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        warnings.push(ValidationWarning::range(
            "scoring.weights",
            format!("scoring weights sum to {weight_sum:.2}, expected ~1.0"),
        ));
    }
    let b = &config.scoring.bonus_conditions;
    for (name, v) in [
        (
            "scoring.bonus_conditions.high_character_engagement.bonus_multiplier",
            b.high_character_engagement.bonus_multiplier,
        ),
        (
            "scoring.bonus_conditions.seasonal_relevance.bonus_multiplier",
            b.seasonal_relevance.bonus_multiplier,
        ),
    ] {
        if !v.is_finite() || v < 1.0 {
            errors.push(format!("{name} = {v} must be >= 1.0"));
        }
    }

    // Aggregation / retention / batch
    let band = config.aggregation.trend_stable_band;
    if !band.is_finite() || band < 0.0 {
        errors.push(format!("aggregation.trend_stable_band = {band} must be >= 0"));
    }
    let r = &config.retention;
    for (name, v) in [
        ("retention.daily_days", r.daily_days),
        ("retention.weekly_weeks", r.weekly_weeks),
        ("retention.monthly_months", r.monthly_months),
        ("retention.yearly_years", r.yearly_years),
    ] {
        if v == 0 {
            errors.push(format!("{name} must be > 0"));
        }
    }
    if config.batch.max_concurrency == 0 {
        errors.push("batch.max_concurrency must be > 0".to_string());
    }

    (errors, warnings)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_identical() {
        assert_eq!(levenshtein("hello", "hello"), 0);
    }

    #[test]
    fn test_levenshtein_one_edit() {
        assert_eq!(levenshtein("multiplyer", "multiplier"), 1);
    }

    #[test]
    fn test_levenshtein_empty() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
    }

    #[test]
    fn test_walk_toml_keys_nested() {
        let toml: toml::Value = r#"
            [thresholds.keep_active]
            min_popularity = 30.0
        "#
        .parse()
        .unwrap();
        let keys = walk_toml_keys(&toml, "");
        assert!(keys.contains(&"thresholds".to_string()));
        assert!(keys.contains(&"thresholds.keep_active".to_string()));
        assert!(keys.contains(&"thresholds.keep_active.min_popularity".to_string()));
    }

    #[test]
    fn test_typo_key_produces_warning_with_suggestion() {
        let toml_str = r#"
[base_score]
multiplyer = 100.0
"#;
        let warnings = validate_unknown_keys(toml_str);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].field.contains("multiplyer"));
        assert_eq!(warnings[0].suggestion.as_deref(), Some("base_score.multiplier"));
    }

    #[test]
    fn test_free_form_tables_are_exempt() {
        let toml_str = r#"
[gender_boosts]
unknown = 0.95
FEMALE = 1.4
GENDERFLUID = 1.1

[format_boosts]
default = 1.0
MUSIC = 0.8
"#;
        let warnings = validate_unknown_keys(toml_str);
        assert!(warnings.is_empty(), "Expected 0 warnings, got: {warnings:?}");
    }

    #[test]
    fn test_unknown_section_produces_warning() {
        let toml_str = r#"
[scoring.typo_section]
some_field = 42
"#;
        let warnings = validate_unknown_keys(toml_str);
        assert!(warnings.iter().any(|w| w.field.contains("typo_section")));
    }

    #[test]
    fn test_suggest_correction_no_match_for_garbage() {
        let known = known_config_keys();
        assert!(suggest_correction("completely_unrelated_garbage_key_xyz", &known).is_none());
    }

    #[test]
    fn test_defaults_clean() {
        let config = EngineConfig::default();
        let (errors, warnings) = validate_ranges(&config);
        assert!(errors.is_empty(), "Defaults should produce no errors: {errors:?}");
        assert!(warnings.is_empty(), "Defaults should produce no warnings: {warnings:?}");
    }

    #[test]
    fn test_negative_boost_is_error() {
        let mut config = EngineConfig::default();
        config.gender_boosts.values.insert("FEMALE".to_string(), -1.0);
        let (errors, _) = validate_ranges(&config);
        assert!(errors.iter().any(|e| e.contains("gender_boosts.FEMALE")));
    }

    #[test]
    fn test_nan_boost_is_error() {
        let mut config = EngineConfig::default();
        config.status_boosts.hiatus = f64::NAN;
        let (errors, _) = validate_ranges(&config);
        assert!(errors.iter().any(|e| e.contains("status_boosts.HIATUS")));
    }

    #[test]
    fn test_inverted_limits_is_error() {
        let mut config = EngineConfig::default();
        config.limits.min_total_multiplier = 3.0;
        config.limits.max_total_multiplier = 2.0;
        let (errors, _) = validate_ranges(&config);
        assert!(errors.iter().any(|e| e.contains("min_total_multiplier")));
    }

    #[test]
    fn test_long_grace_period_is_warning_only() {
        let mut config = EngineConfig::default();
        config.periods.grace_period_days = 120;
        let (errors, warnings) = validate_ranges(&config);
        assert!(errors.is_empty());
        assert!(warnings.iter().any(|w| w.field == "periods.grace_period_days"));
    }

    #[test]
    fn test_weight_sum_drift_is_warning() {
        let mut config = EngineConfig::default();
        config.scoring.weights.popularity = 0.8;
        let (errors, warnings) = validate_ranges(&config);
        assert!(errors.is_empty());
        assert!(warnings.iter().any(|w| w.field == "scoring.weights"));
    }

    #[test]
    fn test_extend_grace_ratio_bounds() {
        let mut config = EngineConfig::default();
        config.thresholds.extend_grace.min_composite_score_ratio = 1.5;
        let (errors, _) = validate_ranges(&config);
        assert!(errors.iter().any(|e| e.contains("min_composite_score_ratio")));
    }

    #[test]
    fn test_duplicate_lookback_is_error() {
        let mut config = EngineConfig::default();
        config.growth.lookbacks.push(crate::config::Lookback { days: 7, weight: 0.1 });
        let (errors, _) = validate_ranges(&config);
        assert!(errors.iter().any(|e| e.contains("duplicate lookback")));
    }

    #[test]
    fn test_zero_concurrency_is_error() {
        let mut config = EngineConfig::default();
        config.batch.max_concurrency = 0;
        let (errors, _) = validate_ranges(&config);
        assert!(errors.iter().any(|e| e.contains("max_concurrency")));
    }
}
