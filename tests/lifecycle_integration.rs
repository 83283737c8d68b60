//! Lifecycle Integration Tests
//!
//! Drives series through the full stage graph on a sled-backed store:
//! UPCOMING -> GRACE_PERIOD -> {ACTIVE_TRACKING, EXTENDED_GRACE, ARCHIVED}
//! -> READY_FOR_DELETION, plus manual overrides and statistics.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;

use trendwatch::config::EngineConfig;
use trendwatch::lifecycle::{
    AdvanceOutcome, LifecycleDecisionMaker, LifecycleRulesManager, LifecycleStateMachine,
    TransitionError,
};
use trendwatch::storage::{LifecycleStore, SledStore, StorageError};
use trendwatch::types::{LifecycleAction, LifecycleStage, SeriesMetrics};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap()
}

fn machine(store: Arc<SledStore>) -> LifecycleStateMachine {
    let config = EngineConfig::default();
    LifecycleStateMachine::new(
        store,
        LifecycleDecisionMaker::new(LifecycleRulesManager::new(&config)),
    )
}

fn open(dir: &tempfile::TempDir) -> Arc<SledStore> {
    Arc::new(SledStore::open_in(dir.path()).unwrap())
}

/// popularity 500 -> composite 150, well above keep_active
fn strong(id: u64) -> SeriesMetrics {
    SeriesMetrics {
        popularity: 500,
        ..SeriesMetrics::new(id)
    }
}

/// popularity 150 -> composite 45, between 35 (extend) and 50 (keep)
fn moderate(id: u64) -> SeriesMetrics {
    SeriesMetrics {
        popularity: 150,
        ..SeriesMetrics::new(id)
    }
}

/// popularity 10 -> composite 3
fn weak(id: u64) -> SeriesMetrics {
    SeriesMetrics {
        popularity: 10,
        ..SeriesMetrics::new(id)
    }
}

fn stage(sm: &LifecycleStateMachine, id: u64) -> LifecycleStage {
    sm.get(id).unwrap().stage
}

// ============================================================================
// Automatic Transitions
// ============================================================================

#[test]
fn grace_period_resolves_by_composite_score() {
    let dir = tempfile::tempdir().unwrap();
    let sm = machine(open(&dir));

    for id in 1..=3 {
        sm.track(id).unwrap();
        sm.promote(id, t0()).unwrap();
    }

    // One second short of 42 days: nothing moves
    let almost = t0() + Duration::days(42) - Duration::seconds(1);
    for m in [strong(1), moderate(2), weak(3)] {
        let outcome = sm.advance(&m, almost).unwrap();
        assert!(matches!(outcome, AdvanceOutcome::Waiting { stage: LifecycleStage::GracePeriod, .. }));
    }

    let due = t0() + Duration::days(42);
    assert_eq!(sm.advance(&strong(1), due).unwrap().new_stage(), Some(LifecycleStage::ActiveTracking));
    assert_eq!(sm.advance(&moderate(2), due).unwrap().new_stage(), Some(LifecycleStage::ExtendedGrace));
    assert_eq!(sm.advance(&weak(3), due).unwrap().new_stage(), Some(LifecycleStage::Archived));

    let extended = sm.get(2).unwrap();
    assert_eq!(extended.grace_period_start, Some(due), "extension resets the grace timer");
    assert_eq!(extended.evaluation_score, Some(45.0));

    let archived = sm.get(3).unwrap();
    assert_eq!(archived.archived_at, Some(due));
    assert!(archived.notes.unwrap().starts_with("insufficient performance"));
}

#[test]
fn extended_grace_uses_its_own_window() {
    let dir = tempfile::tempdir().unwrap();
    let sm = machine(open(&dir));
    sm.track(7).unwrap();
    sm.promote(7, t0()).unwrap();

    let extended_at = t0() + Duration::days(42);
    sm.advance(&moderate(7), extended_at).unwrap();
    assert_eq!(stage(&sm, 7), LifecycleStage::ExtendedGrace);

    let before = extended_at + Duration::days(27);
    assert!(matches!(sm.advance(&strong(7), before).unwrap(), AdvanceOutcome::Waiting { .. }));

    let after = extended_at + Duration::days(28);
    let outcome = sm.advance(&strong(7), after).unwrap();
    match outcome {
        AdvanceOutcome::Transitioned { from, to, decision } => {
            assert_eq!(from, LifecycleStage::ExtendedGrace);
            assert_eq!(to, LifecycleStage::ActiveTracking);
            assert_eq!(decision.unwrap().action, LifecycleAction::KeepActive);
        }
        other => panic!("expected transition, got {other:?}"),
    }
}

#[test]
fn active_series_archived_then_cleaned_up() {
    let dir = tempfile::tempdir().unwrap();
    let sm = machine(open(&dir));
    sm.track(5).unwrap();
    sm.promote(5, t0()).unwrap();
    let day42 = t0() + Duration::days(42);
    sm.advance(&strong(5), day42).unwrap();

    // Still strong: retained with a fresh score
    let later = day42 + Duration::days(7);
    let outcome = sm.advance(&strong(5), later).unwrap();
    assert!(matches!(outcome, AdvanceOutcome::Retained { stage: LifecycleStage::ActiveTracking, .. }));
    assert_eq!(sm.get(5).unwrap().last_evaluation_at, Some(later));

    // Interest collapses
    let archived_at = later + Duration::days(7);
    assert_eq!(
        sm.advance(&weak(5), archived_at).unwrap().new_stage(),
        Some(LifecycleStage::Archived)
    );

    assert_eq!(sm.cleanup(archived_at + Duration::days(89)).unwrap(), 0);
    assert_eq!(sm.cleanup(archived_at + Duration::days(90)).unwrap(), 1);
    assert_eq!(stage(&sm, 5), LifecycleStage::ReadyForDeletion);

    // Terminal
    let idle = sm.advance(&strong(5), archived_at + Duration::days(365)).unwrap();
    assert_eq!(idle, AdvanceOutcome::Idle { stage: LifecycleStage::ReadyForDeletion });
}

// ============================================================================
// Manual Overrides
// ============================================================================

#[test]
fn force_archive_and_restore() {
    let dir = tempfile::tempdir().unwrap();
    let sm = machine(open(&dir));
    sm.track(9).unwrap();
    sm.promote(9, t0()).unwrap();

    let archived = sm.force_archive(9, "licensing dispute", t0() + Duration::days(1)).unwrap();
    assert_eq!(archived.stage, LifecycleStage::Archived);
    assert!(matches!(
        sm.force_archive(9, "again", t0()),
        Err(TransitionError::InvalidTransition { from: LifecycleStage::Archived, .. })
    ));

    let restored = sm.restore(9, "dispute settled", t0() + Duration::days(2)).unwrap();
    assert_eq!(restored.stage, LifecycleStage::ActiveTracking);
    assert_eq!(restored.archived_at, None);
    assert!(matches!(
        sm.restore(9, "not archived", t0()),
        Err(TransitionError::InvalidTransition { .. })
    ));
}

#[test]
fn transition_to_checks_names_and_edges() {
    let dir = tempfile::tempdir().unwrap();
    let sm = machine(open(&dir));
    sm.track(11).unwrap();

    assert!(matches!(
        sm.transition_to(11, "LIMBO", "typo", t0()),
        Err(TransitionError::UnknownStage(_))
    ));
    assert!(matches!(
        sm.transition_to(11, "ACTIVE_TRACKING", "skip grace", t0()),
        Err(TransitionError::InvalidTransition { .. })
    ));
    let r = sm.transition_to(11, "GRACE_PERIOD", "early release", t0()).unwrap();
    assert_eq!(r.stage, LifecycleStage::GracePeriod);
    assert_eq!(r.grace_period_start, Some(t0()));

    assert!(matches!(
        sm.transition_to(404, "ARCHIVED", "missing", t0()),
        Err(TransitionError::NotFound(404))
    ));
}

// ============================================================================
// Concurrency and Persistence
// ============================================================================

#[test]
fn stale_writer_gets_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir);
    let sm = machine(store.clone());
    sm.track(3).unwrap();

    // Another writer reads UPCOMING, then this machine promotes first
    let stale = store.get(3).unwrap().unwrap();
    sm.promote(3, t0()).unwrap();

    let mut loser = stale.clone();
    loser.stage = LifecycleStage::Archived;
    let err = store
        .compare_and_set(3, stale.stage, &loser)
        .unwrap_err();
    assert!(matches!(
        err,
        StorageError::StageMismatch {
            expected: LifecycleStage::Upcoming,
            found: LifecycleStage::GracePeriod,
            ..
        }
    ));
    assert_eq!(stage(&sm, 3), LifecycleStage::GracePeriod);
}

#[test]
fn records_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = open(&dir);
        let sm = machine(store.clone());
        sm.track(21).unwrap();
        sm.promote(21, t0()).unwrap();
        store.flush().unwrap();
    }

    let sm = machine(open(&dir));
    let record = sm.get(21).unwrap();
    assert_eq!(record.stage, LifecycleStage::GracePeriod);
    assert_eq!(record.grace_period_start, Some(t0()));
}

#[test]
fn stats_reflect_stage_counts() {
    let dir = tempfile::tempdir().unwrap();
    let sm = machine(open(&dir));
    for id in 1..=4 {
        sm.track(id).unwrap();
    }
    sm.promote(1, t0()).unwrap();
    sm.promote(2, t0()).unwrap();
    sm.force_archive(3, "duplicate entry", t0()).unwrap();

    let stats = sm.stats(t0() + Duration::days(1)).unwrap();
    assert_eq!(stats.total, 4);
    assert_eq!(stats.count(LifecycleStage::Upcoming), 1);
    assert_eq!(stats.count(LifecycleStage::GracePeriod), 2);
    assert_eq!(stats.count(LifecycleStage::Archived), 1);
    assert_eq!(stats.entered_grace_recently, 2);
    assert_eq!(stats.archived_recently, 1);
    assert_eq!(stats.evaluated_recently, 3);
}
