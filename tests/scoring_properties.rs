//! Property tests over the scoring and aggregation invariants
//!
//! - base score is strictly positive and monotonic in favourites
//! - total multiplier stays within the configured limits for any input
//! - evaluation is deterministic for fixed metrics, history and as-of instant
//! - rollup is idempotent and accounts for every snapshot exactly once
//! - retention pruning never removes an entity's latest aggregate

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use proptest::prelude::*;
use std::collections::BTreeMap;

use trendwatch::aggregation::{AggregationRollup, RetentionPolicy};
use trendwatch::config::EngineConfig;
use trendwatch::scoring::{BaseScoreCalculator, HistoryWindow, TrendingScoreEngine};
use trendwatch::storage::{AggregateStore, InMemoryStore};
use trendwatch::types::{
    BoostBreakdown, CharacterRole, EntityKey, EntityMetrics, EntityType, PeriodType,
    ReleaseStatus, ScoreMetadata, TrendingScore,
};

fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

// ============================================================================
// Strategies
// ============================================================================

fn arb_status() -> impl Strategy<Value = Option<ReleaseStatus>> {
    prop::option::of(prop::sample::select(vec![
        ReleaseStatus::Releasing,
        ReleaseStatus::Finished,
        ReleaseStatus::NotYetReleased,
        ReleaseStatus::Cancelled,
        ReleaseStatus::Hiatus,
    ]))
}

fn arb_metrics() -> impl Strategy<Value = EntityMetrics> {
    (
        (any::<bool>(), 1u64..1_000_000, 0u64..5_000_000),
        prop::option::of(prop::sample::select(vec!["Female", "male", "Non-binary", "???", ""])),
        prop::sample::select(vec![
            CharacterRole::Main,
            CharacterRole::Supporting,
            CharacterRole::Background,
            CharacterRole::Unknown,
        ]),
        arb_status(),
        prop::option::of(prop::sample::select(vec!["TV", "MOVIE", "ova", "MUSIC"])),
        prop::option::of(1950i32..2040),
        prop::option::of(-4000i64..400),
        prop::option::of(-10.0f64..120.0),
        prop::option::of(prop::sample::select(vec!["Jujutsu Kaisen", "Unknown Show", ""])),
    )
        .prop_map(
            |((is_char, id, favourites), gender, role, status, format, year, start, score, name)| {
                let entity_type = if is_char { EntityType::Character } else { EntityType::Media };
                let mut m = EntityMetrics::new(entity_type, id, favourites);
                m.gender = gender.map(str::to_string);
                m.role = role;
                m.status = status;
                m.format = format.map(str::to_string);
                m.season_year = year;
                m.start_date = start.map(|d| epoch().date_naive() + Duration::days(d));
                m.end_date = m.start_date.map(|d| d + Duration::days(90));
                m.average_score = score;
                m.series_name = name.map(str::to_string);
                m
            },
        )
}

fn arb_history() -> impl Strategy<Value = HistoryWindow> {
    (
        prop::option::of(0u64..5_000_000),
        prop::option::of(0u64..5_000_000),
        prop::option::of(0u64..5_000_000),
    )
        .prop_map(|(d7, d30, d90)| {
            HistoryWindow::empty()
                .with_point(7, d7)
                .with_point(30, d30)
                .with_point(90, d90)
        })
}

fn snapshot(entity_id: u64, hours: i64, final_score: f64) -> TrendingScore {
    let as_of = epoch() + Duration::hours(hours);
    TrendingScore {
        entity_id,
        entity_type: EntityType::Character,
        timestamp: as_of,
        as_of,
        favourites: 0,
        base_score: final_score,
        boosts: BoostBreakdown::default(),
        growth_multiplier: 1.0,
        total_multiplier: 1.0,
        final_score,
        algorithm_version: "v3.0".to_string(),
        metadata: ScoreMetadata::default(),
    }
}

fn arb_snapshots() -> impl Strategy<Value = Vec<TrendingScore>> {
    prop::collection::vec((1u64..6, 0i64..(24 * 400), 1.0f64..500.0), 1..80).prop_map(|rows| {
        // One row per (entity, instant), matching the snapshot ledger key
        let mut unique = BTreeMap::new();
        for (id, hours, score) in rows {
            unique.insert((id, hours), score);
        }
        unique
            .into_iter()
            .map(|((id, hours), score)| snapshot(id, hours, score))
            .collect()
    })
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn base_score_positive_and_monotonic(a in 0u64..u64::MAX / 2, b in 0u64..u64::MAX / 2) {
        let calc = BaseScoreCalculator::new(&EngineConfig::default().base_score).unwrap();
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(calc.calculate(lo) > 0.0);
        prop_assert!(calc.calculate(lo) <= calc.calculate(hi));
    }

    #[test]
    fn total_multiplier_within_limits(metrics in arb_metrics(), history in arb_history()) {
        let config = EngineConfig::default();
        let engine = TrendingScoreEngine::new(&config).unwrap();
        let score = engine.evaluate(&metrics, &history, epoch());

        prop_assert!(score.total_multiplier >= config.limits.min_total_multiplier);
        prop_assert!(score.total_multiplier <= config.limits.max_total_multiplier);
        prop_assert!(score.final_score > 0.0);
        prop_assert!(score.final_score.is_finite());
        let expected = score.base_score * score.total_multiplier;
        prop_assert!((score.final_score - expected).abs() <= 1e-9 * expected.abs().max(1.0));
    }

    #[test]
    fn evaluation_is_deterministic(metrics in arb_metrics(), history in arb_history()) {
        let engine = TrendingScoreEngine::new(&EngineConfig::default()).unwrap();
        let first = engine.evaluate(&metrics, &history, epoch());
        let mut second = engine.evaluate(&metrics, &history, epoch());
        // Wall-clock production time is the only field allowed to differ
        second.timestamp = first.timestamp;
        prop_assert_eq!(first, second);
    }

    #[test]
    fn rollup_is_idempotent_and_complete(snapshots in arb_snapshots()) {
        let rollup = AggregationRollup::new(&EngineConfig::default());
        for period in PeriodType::ALL {
            let once = rollup.rollup(&snapshots, period);
            let twice = rollup.rollup(&snapshots, period);
            prop_assert_eq!(&once, &twice);

            let covered: u32 = once.iter().map(|a| a.data_points).sum();
            prop_assert_eq!(covered as usize, snapshots.len());
            for a in &once {
                prop_assert!(a.min_score <= a.avg_score + 1e-9);
                prop_assert!(a.avg_score <= a.max_score + 1e-9);
                prop_assert!(a.period_start <= a.period_end);
                prop_assert!(a.volatility >= 0.0);
            }
        }
    }

    #[test]
    fn prune_keeps_latest_aggregate(snapshots in arb_snapshots(), extra_days in 0i64..3000) {
        let config = EngineConfig::default();
        let rollup = AggregationRollup::new(&config);
        let store = InMemoryStore::new();
        for period in PeriodType::ALL {
            for a in rollup.rollup(&snapshots, period) {
                store.upsert(&a).unwrap();
            }
        }

        let mut latest: BTreeMap<(EntityKey, PeriodType), NaiveDate> = BTreeMap::new();
        for period in PeriodType::ALL {
            for a in store.list_period(period).unwrap() {
                let slot = latest.entry((a.key(), period)).or_insert(a.period_start);
                if a.period_start > *slot {
                    *slot = a.period_start;
                }
            }
        }

        let today = epoch().date_naive() + Duration::days(400 + extra_days);
        RetentionPolicy::new(&config.retention).prune(&store, today).unwrap();

        for ((key, period), start) in latest {
            let remaining = store.list(key, period).unwrap();
            prop_assert!(
                remaining.iter().any(|a| a.period_start == start),
                "latest {} aggregate of {} was pruned", period, key
            );
        }
    }
}
