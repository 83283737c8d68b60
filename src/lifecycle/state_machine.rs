//! Series lifecycle state machine
//!
//! ```text
//! UPCOMING --promote--> GRACE_PERIOD --(grace elapsed)--+--KEEP_ACTIVE--> ACTIVE_TRACKING
//!                           ^                           +--EXTEND_GRACE-> EXTENDED_GRACE (timer reset)
//!                           |                           +--ARCHIVE------> ARCHIVED
//! ACTIVE_TRACKING --ARCHIVE--> ARCHIVED --(cleanup elapsed)--> READY_FOR_DELETION
//! ARCHIVED --restore (manual)--> ACTIVE_TRACKING
//! ```
//!
//! Every write is a compare-and-set from the observed stage, so two passes
//! racing on one series cannot both apply a decision. The loser gets
//! `TransitionError::Conflict` and the series is retried next pass.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use super::decision::LifecycleDecisionMaker;
use super::stats::LifecycleStats;
use crate::storage::{LifecycleStore, StorageError};
use crate::types::{
    LifecycleAction, LifecycleDecision, LifecycleRecord, LifecycleStage, SeriesMetrics,
};

// ============================================================================
// Errors and Outcomes
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    #[error("series {0} is not tracked")]
    NotFound(u64),
    #[error("series {0} is already tracked")]
    AlreadyTracked(u64),
    #[error("series {series_id} changed concurrently: expected {expected}, found {found:?}")]
    Conflict {
        series_id: u64,
        expected: LifecycleStage,
        /// `None` when the record changed without a stage change
        found: Option<LifecycleStage>,
    },
    #[error("invalid transition {from} -> {to}")]
    InvalidTransition {
        from: LifecycleStage,
        to: LifecycleStage,
    },
    #[error("unknown lifecycle stage '{0}'")]
    UnknownStage(String),
    #[error(transparent)]
    Storage(StorageError),
}

impl TransitionError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, TransitionError::Conflict { .. })
    }
}

/// What `advance` did to one series.
#[derive(Debug, Clone, PartialEq)]
pub enum AdvanceOutcome {
    Transitioned {
        from: LifecycleStage,
        to: LifecycleStage,
        decision: Option<LifecycleDecision>,
    },
    /// Evaluated, stage unchanged (ACTIVE_TRACKING kept)
    Retained {
        stage: LifecycleStage,
        decision: LifecycleDecision,
    },
    /// Timer not yet elapsed
    Waiting {
        stage: LifecycleStage,
        due: DateTime<Utc>,
    },
    /// No automatic transition from this stage
    Idle { stage: LifecycleStage },
}

impl AdvanceOutcome {
    pub fn new_stage(&self) -> Option<LifecycleStage> {
        match self {
            AdvanceOutcome::Transitioned { to, .. } => Some(*to),
            _ => None,
        }
    }
}

/// Edges an operator may request through `transition_to`.
pub fn is_allowed(from: LifecycleStage, to: LifecycleStage) -> bool {
    use LifecycleStage::*;
    matches!(
        (from, to),
        (Upcoming, GracePeriod)
            | (Upcoming, Archived)
            | (GracePeriod, ActiveTracking)
            | (GracePeriod, ExtendedGrace)
            | (GracePeriod, Archived)
            | (ExtendedGrace, ActiveTracking)
            | (ExtendedGrace, ExtendedGrace)
            | (ExtendedGrace, Archived)
            | (ActiveTracking, Archived)
            | (Archived, ActiveTracking)
            | (Archived, ReadyForDeletion)
    )
}

// ============================================================================
// State Machine
// ============================================================================

pub struct LifecycleStateMachine {
    store: Arc<dyn LifecycleStore>,
    decision: LifecycleDecisionMaker,
}

impl LifecycleStateMachine {
    pub fn new(store: Arc<dyn LifecycleStore>, decision: LifecycleDecisionMaker) -> Self {
        Self { store, decision }
    }

    pub fn decision_maker(&self) -> &LifecycleDecisionMaker {
        &self.decision
    }

    pub fn get(&self, series_id: u64) -> Result<LifecycleRecord, TransitionError> {
        self.store
            .get(series_id)
            .map_err(TransitionError::Storage)?
            .ok_or(TransitionError::NotFound(series_id))
    }

    /// Start tracking a series in UPCOMING.
    pub fn track(&self, series_id: u64) -> Result<LifecycleRecord, TransitionError> {
        let record = LifecycleRecord::upcoming(series_id);
        match self.store.insert_new(&record) {
            Ok(()) => {
                info!(series_id, "Tracking new series");
                Ok(record)
            }
            Err(StorageError::Conflict { .. }) => Err(TransitionError::AlreadyTracked(series_id)),
            Err(e) => Err(TransitionError::Storage(e)),
        }
    }

    /// UPCOMING -> GRACE_PERIOD when the series starts releasing.
    pub fn promote(&self, series_id: u64, now: DateTime<Utc>) -> Result<LifecycleRecord, TransitionError> {
        let current = self.get(series_id)?;
        if current.stage != LifecycleStage::Upcoming {
            return Err(TransitionError::InvalidTransition {
                from: current.stage,
                to: LifecycleStage::GracePeriod,
            });
        }
        let next = enter(
            &current,
            LifecycleStage::GracePeriod,
            now,
            None,
            "release started".to_string(),
        );
        self.commit(&current, next)
    }

    /// Apply the automatic rules to one series.
    pub fn advance(&self, metrics: &SeriesMetrics, now: DateTime<Utc>) -> Result<AdvanceOutcome, TransitionError> {
        let current = self.get(metrics.series_id)?;
        let rules = self.decision.rules();

        match current.stage {
            LifecycleStage::Upcoming | LifecycleStage::ReadyForDeletion => {
                Ok(AdvanceOutcome::Idle { stage: current.stage })
            }
            LifecycleStage::GracePeriod | LifecycleStage::ExtendedGrace => {
                let window_days = if current.stage == LifecycleStage::GracePeriod {
                    rules.grace_period_days()
                } else {
                    rules.extended_grace_days()
                };
                if let Some(start) = current.grace_period_start {
                    let due = start + Duration::days(i64::from(window_days));
                    if now < due {
                        return Ok(AdvanceOutcome::Waiting { stage: current.stage, due });
                    }
                }

                let decision = self.decision.decide(metrics, now.date_naive());
                let to = match decision.action {
                    LifecycleAction::KeepActive => LifecycleStage::ActiveTracking,
                    LifecycleAction::ExtendGrace => LifecycleStage::ExtendedGrace,
                    LifecycleAction::Archive => LifecycleStage::Archived,
                };
                let next = enter(
                    &current,
                    to,
                    now,
                    Some(decision.composite_score),
                    decision.reason.clone(),
                );
                self.commit(&current, next)?;
                Ok(AdvanceOutcome::Transitioned {
                    from: current.stage,
                    to,
                    decision: Some(decision),
                })
            }
            LifecycleStage::ActiveTracking => {
                let decision = self.decision.decide(metrics, now.date_naive());
                if decision.action == LifecycleAction::Archive {
                    let next = enter(
                        &current,
                        LifecycleStage::Archived,
                        now,
                        Some(decision.composite_score),
                        decision.reason.clone(),
                    );
                    self.commit(&current, next)?;
                    return Ok(AdvanceOutcome::Transitioned {
                        from: current.stage,
                        to: LifecycleStage::Archived,
                        decision: Some(decision),
                    });
                }
                let mut next = current.clone();
                next.evaluation_score = Some(decision.composite_score);
                next.last_evaluation_at = Some(now);
                self.cas(&current, &next)?;
                Ok(AdvanceOutcome::Retained {
                    stage: current.stage,
                    decision,
                })
            }
            LifecycleStage::Archived => self.cleanup_one(&current, now),
        }
    }

    /// ARCHIVED -> READY_FOR_DELETION for every series past the cleanup window.
    ///
    /// Returns the number of series moved; conflicting series are skipped.
    pub fn cleanup(&self, now: DateTime<Utc>) -> Result<usize, TransitionError> {
        let archived = self
            .store
            .list_by_stage(LifecycleStage::Archived)
            .map_err(TransitionError::Storage)?;
        let mut moved = 0;
        for record in &archived {
            match self.cleanup_one(record, now) {
                Ok(AdvanceOutcome::Transitioned { .. }) => moved += 1,
                Ok(_) => {}
                Err(e) if e.is_conflict() => {
                    warn!(series_id = record.series_id, error = %e, "Cleanup conflict, retrying next pass");
                }
                Err(e) => return Err(e),
            }
        }
        if moved > 0 {
            info!(moved, "Archived series ready for deletion");
        }
        Ok(moved)
    }

    /// Time-only check; a record without `archived_at` is due immediately.
    fn cleanup_one(&self, current: &LifecycleRecord, now: DateTime<Utc>) -> Result<AdvanceOutcome, TransitionError> {
        let window = Duration::days(i64::from(self.decision.rules().cleanup_days()));
        if let Some(at) = current.archived_at {
            let due = at + window;
            if now < due {
                return Ok(AdvanceOutcome::Waiting { stage: current.stage, due });
            }
        }
        let next = enter(
            current,
            LifecycleStage::ReadyForDeletion,
            now,
            None,
            "cleanup window elapsed".to_string(),
        );
        self.commit(current, next)?;
        Ok(AdvanceOutcome::Transitioned {
            from: LifecycleStage::Archived,
            to: LifecycleStage::ReadyForDeletion,
            decision: None,
        })
    }

    /// Manual archive from any stage that is not already archived or deleted.
    pub fn force_archive(
        &self,
        series_id: u64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<LifecycleRecord, TransitionError> {
        let current = self.get(series_id)?;
        if matches!(
            current.stage,
            LifecycleStage::Archived | LifecycleStage::ReadyForDeletion
        ) {
            return Err(TransitionError::InvalidTransition {
                from: current.stage,
                to: LifecycleStage::Archived,
            });
        }
        warn!(series_id, from = %current.stage, reason, "Manual archive");
        let next = enter(
            &current,
            LifecycleStage::Archived,
            now,
            None,
            format!("manual archive: {reason}"),
        );
        self.commit(&current, next)
    }

    /// Manual ARCHIVED -> ACTIVE_TRACKING. Never part of the automatic loop.
    pub fn restore(
        &self,
        series_id: u64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<LifecycleRecord, TransitionError> {
        let current = self.get(series_id)?;
        if current.stage != LifecycleStage::Archived {
            return Err(TransitionError::InvalidTransition {
                from: current.stage,
                to: LifecycleStage::ActiveTracking,
            });
        }
        warn!(series_id, reason, "Manual restore from archive");
        let next = enter(
            &current,
            LifecycleStage::ActiveTracking,
            now,
            None,
            format!("manual restore: {reason}"),
        );
        self.commit(&current, next)
    }

    /// Operator-requested move to a stage given by name.
    ///
    /// Unknown names and edges outside `is_allowed` fail this one request.
    pub fn transition_to(
        &self,
        series_id: u64,
        target: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<LifecycleRecord, TransitionError> {
        let to: LifecycleStage = target
            .parse()
            .map_err(TransitionError::UnknownStage)?;
        let current = self.get(series_id)?;
        if !is_allowed(current.stage, to) {
            return Err(TransitionError::InvalidTransition { from: current.stage, to });
        }
        warn!(series_id, from = %current.stage, to = %to, reason, "Manual stage override");
        let next = enter(&current, to, now, None, format!("manual override: {reason}"));
        self.commit(&current, next)
    }

    pub fn stats(&self, now: DateTime<Utc>) -> Result<LifecycleStats, TransitionError> {
        let records = self.store.all().map_err(TransitionError::Storage)?;
        Ok(LifecycleStats::from_records(&records, now))
    }

    fn commit(&self, current: &LifecycleRecord, next: LifecycleRecord) -> Result<LifecycleRecord, TransitionError> {
        self.cas(current, &next)?;
        info!(
            series_id = next.series_id,
            from = %current.stage,
            to = %next.stage,
            score = ?next.evaluation_score,
            "Lifecycle transition"
        );
        Ok(next)
    }

    fn cas(&self, current: &LifecycleRecord, next: &LifecycleRecord) -> Result<(), TransitionError> {
        self.store
            .compare_and_set(current.series_id, current.stage, next)
            .map_err(|e| match e {
                StorageError::StageMismatch { series_id, expected, found } => TransitionError::Conflict {
                    series_id,
                    expected,
                    found: Some(found),
                },
                StorageError::Conflict { .. } => TransitionError::Conflict {
                    series_id: current.series_id,
                    expected: current.stage,
                    found: None,
                },
                StorageError::NotFound(_) => TransitionError::NotFound(current.series_id),
                other => TransitionError::Storage(other),
            })
    }
}

/// Record after entering `to` at `now`, with the per-stage timestamps set.
fn enter(
    current: &LifecycleRecord,
    to: LifecycleStage,
    now: DateTime<Utc>,
    score: Option<f64>,
    notes: String,
) -> LifecycleRecord {
    let mut next = current.clone();
    next.stage = to;
    if to.is_grace() {
        next.grace_period_start = Some(now);
    }
    match to {
        LifecycleStage::Archived => next.archived_at = Some(now),
        LifecycleStage::ActiveTracking => next.archived_at = None,
        _ => {}
    }
    if score.is_some() {
        next.evaluation_score = score;
    }
    next.last_evaluation_at = Some(now);
    next.notes = Some(notes);
    next
}
