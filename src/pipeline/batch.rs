//! Batch runner: one evaluation, rollup or lifecycle pass over many entities
//!
//! Per-entity work runs on a dedicated rayon pool sized by
//! `batch.max_concurrency`. Failures are counted into the pass report; one bad
//! entity never aborts the batch. Cancellation skips the entities not yet
//! started; every pass is idempotent so the next run picks them up.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::report::{BatchReport, LifecycleReport, PromoteReport, RollupReport};
use crate::aggregation::{AggregationRollup, RetentionPolicy};
use crate::config::{ConfigError, EngineConfig};
use crate::lifecycle::{
    AdvanceOutcome, LifecycleDecisionMaker, LifecycleRulesManager, LifecycleStateMachine,
    TransitionError,
};
use crate::scoring::{HistoryWindow, TrendingScoreEngine};
use crate::storage::{AggregateStore, LifecycleStore, SnapshotStore, StorageError};
use crate::types::{
    EntityKey, EntityMetrics, HistoricalAggregate, LifecycleStage, PeriodType, ReleaseStatus,
    SeriesInput, SeriesMetrics, TrendingScore,
};

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Per-entity result of the evaluation phase.
enum Evaluated {
    Scored(TrendingScore),
    Skipped,
    StorageFailed,
}

pub struct BatchRunner {
    engine: Arc<TrendingScoreEngine>,
    rollup: Arc<AggregationRollup>,
    retention: RetentionPolicy,
    lifecycle: Arc<LifecycleStateMachine>,
    snapshots: Arc<dyn SnapshotStore>,
    aggregates: Arc<dyn AggregateStore>,
    pool: rayon::ThreadPool,
}

impl BatchRunner {
    pub fn new(
        config: &EngineConfig,
        snapshots: Arc<dyn SnapshotStore>,
        aggregates: Arc<dyn AggregateStore>,
        lifecycle_store: Arc<dyn LifecycleStore>,
    ) -> Result<Self, BatchError> {
        let engine = TrendingScoreEngine::new(config)?;
        let decision = LifecycleDecisionMaker::new(LifecycleRulesManager::new(config));
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.batch.max_concurrency)
            .thread_name(|i| format!("trendwatch-worker-{i}"))
            .build()?;

        info!(
            backend = snapshots.backend_name(),
            workers = config.batch.max_concurrency,
            version = engine.algorithm_version(),
            "Batch runner ready"
        );

        Ok(Self {
            engine: Arc::new(engine),
            rollup: Arc::new(AggregationRollup::new(config)),
            retention: RetentionPolicy::new(&config.retention),
            lifecycle: Arc::new(LifecycleStateMachine::new(lifecycle_store, decision)),
            snapshots,
            aggregates,
            pool,
        })
    }

    /// Build from one backend that implements every storage contract.
    pub fn with_store<S>(config: &EngineConfig, store: Arc<S>) -> Result<Self, BatchError>
    where
        S: SnapshotStore + AggregateStore + LifecycleStore + 'static,
    {
        Self::new(config, store.clone(), store.clone(), store)
    }

    pub fn engine(&self) -> &TrendingScoreEngine {
        &self.engine
    }

    pub fn lifecycle(&self) -> &LifecycleStateMachine {
        &self.lifecycle
    }

    // ========================================================================
    // Evaluation
    // ========================================================================

    /// Score every entity as of `as_of` and append the snapshots.
    ///
    /// Returns the report and the persisted scores, each carrying its
    /// popularity rank within this pass.
    pub fn evaluate_pass(
        &self,
        metrics: &[EntityMetrics],
        as_of: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> (BatchReport, Vec<TrendingScore>) {
        let started = Instant::now();
        let lookbacks = self.engine.lookbacks();

        let evaluated: Vec<Evaluated> = self.pool.install(|| {
            metrics
                .par_iter()
                .map(|m| {
                    if cancel.is_cancelled() {
                        return Evaluated::Skipped;
                    }
                    match HistoryWindow::from_store(self.snapshots.as_ref(), m.key(), as_of, lookbacks) {
                        Ok(history) => Evaluated::Scored(self.engine.evaluate(m, &history, as_of)),
                        Err(e) => {
                            error!(entity = %m.key(), error = %e, "History lookup failed");
                            Evaluated::StorageFailed
                        }
                    }
                })
                .collect()
        });

        let mut report = BatchReport::default();
        let mut scores = Vec::with_capacity(evaluated.len());
        for e in evaluated {
            match e {
                Evaluated::Scored(s) => scores.push(s),
                Evaluated::Skipped => report.skipped += 1,
                Evaluated::StorageFailed => report.storage_errors += 1,
            }
        }

        assign_popularity_ranks(&mut scores);

        let persisted: Vec<Option<TrendingScore>> = self.pool.install(|| {
            scores
                .into_par_iter()
                .map(|s| match self.snapshots.append(&s) {
                    Ok(()) => Some(s),
                    Err(e) => {
                        error!(entity = %s.key(), error = %e, "Snapshot append failed");
                        None
                    }
                })
                .collect()
        });

        let mut out = Vec::with_capacity(persisted.len());
        for s in persisted {
            match s {
                Some(s) => {
                    report.evaluated += 1;
                    if s.has_faults() {
                        report.faulted_entities += 1;
                        report.fault_count += s.metadata.faults.len();
                    }
                    out.push(s);
                }
                None => report.storage_errors += 1,
            }
        }
        out.sort_by_key(|s| s.metadata.popularity_rank);

        report.elapsed_ms = elapsed_ms(started);
        info!(
            evaluated = report.evaluated,
            faulted = report.faulted_entities,
            faults = report.fault_count,
            skipped = report.skipped,
            storage_errors = report.storage_errors,
            elapsed_ms = report.elapsed_ms,
            "Evaluation pass complete"
        );
        if report.skipped > 0 {
            warn!(skipped = report.skipped, "Pass cancelled, remaining entities deferred");
        }
        (report, out)
    }

    // ========================================================================
    // Rollup
    // ========================================================================

    /// Aggregate every bucket touching `[from, to]` for each period, then prune.
    ///
    /// The read window is widened to whole buckets so each aggregate always
    /// covers all of its snapshots.
    pub fn rollup_pass(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        periods: &[PeriodType],
        today: NaiveDate,
    ) -> Result<RollupReport, StorageError> {
        let started = Instant::now();
        let mut report = RollupReport::default();

        for &period in periods {
            let window_start = period.bucket_start(from);
            let window_end = period.bucket_end(period.bucket_start(to));
            let snapshots = self
                .snapshots
                .window(start_of_day(window_start), end_of_day(window_end))?;
            report.snapshots_read += snapshots.len();

            let mut aggregates = self.rollup.rollup(&snapshots, period);
            let folded = self.fold_uncovered(&aggregates, period, window_start, window_end)?;
            if !folded.is_empty() {
                report.folded.insert(period, folded.len());
                aggregates.extend(folded);
            }
            for a in &aggregates {
                self.aggregates.upsert(a)?;
            }
            debug!(period = %period, %window_start, %window_end, written = aggregates.len(), "Rollup period written");
            report.written.insert(period, aggregates.len());
        }

        report.pruned = self.retention.prune(self.aggregates.as_ref(), today)?;
        report.elapsed_ms = elapsed_ms(started);
        info!(
            snapshots = report.snapshots_read,
            written = report.total_written(),
            pruned = report.pruned.total_removed(),
            elapsed_ms = report.elapsed_ms,
            "Rollup pass complete"
        );
        Ok(report)
    }

    /// Buckets of `period` in the window that no snapshot covers, built from
    /// the stored aggregates of its fold source.
    fn fold_uncovered(
        &self,
        covered: &[HistoricalAggregate],
        period: PeriodType,
        window_start: NaiveDate,
        window_end: NaiveDate,
    ) -> Result<Vec<HistoricalAggregate>, StorageError> {
        let Some(source) = period.fold_source() else {
            return Ok(Vec::new());
        };
        let covered: BTreeSet<(EntityKey, NaiveDate)> =
            covered.iter().map(|a| (a.key(), a.period_start)).collect();
        let finer: Vec<HistoricalAggregate> = self
            .aggregates
            .list_period(source)?
            .into_iter()
            .filter(|a| a.period_start >= window_start && a.period_start <= window_end)
            .filter(|a| !covered.contains(&(a.key(), period.bucket_start(a.period_start))))
            .collect();
        if finer.is_empty() {
            return Ok(Vec::new());
        }
        let folded = self.rollup.fold_aggregates(&finer, period);
        debug!(period = %period, source = %source, folded = folded.len(), "Folded finer aggregates");
        Ok(folded)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Advance every listed series, tracking unknown ones, then run cleanup.
    ///
    /// An UPCOMING series reported as RELEASING is promoted into grace here.
    pub fn lifecycle_pass(
        &self,
        series: &[SeriesMetrics],
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> LifecycleReport {
        let started = Instant::now();
        let outcomes: Vec<SeriesOutcome> = self.pool.install(|| {
            series
                .par_iter()
                .map(|m| {
                    if cancel.is_cancelled() {
                        return SeriesOutcome::Skipped;
                    }
                    self.advance_one(m, now)
                })
                .collect()
        });

        let mut report = LifecycleReport::default();
        for o in outcomes {
            match o {
                SeriesOutcome::Done { tracked, outcome } => {
                    report.evaluated += 1;
                    if tracked {
                        report.newly_tracked += 1;
                    }
                    match outcome {
                        AdvanceOutcome::Transitioned { to, .. } => {
                            *report.transitions.entry(to).or_insert(0) += 1;
                        }
                        AdvanceOutcome::Retained { .. } => report.retained += 1,
                        AdvanceOutcome::Waiting { .. } | AdvanceOutcome::Idle { .. } => {
                            report.waiting += 1
                        }
                    }
                }
                SeriesOutcome::Conflict => report.conflicts += 1,
                SeriesOutcome::Failed => report.errors += 1,
                SeriesOutcome::Skipped => report.skipped += 1,
            }
        }

        if cancel.is_cancelled() {
            warn!("Lifecycle pass cancelled before cleanup");
        } else {
            match self.lifecycle.cleanup(now) {
                Ok(n) => {
                    report.cleaned_up = n;
                    if n > 0 {
                        *report
                            .transitions
                            .entry(LifecycleStage::ReadyForDeletion)
                            .or_insert(0) += n;
                    }
                }
                Err(e) => {
                    error!(error = %e, "Cleanup failed");
                    report.errors += 1;
                }
            }
        }

        report.elapsed_ms = elapsed_ms(started);
        info!(
            evaluated = report.evaluated,
            tracked = report.newly_tracked,
            transitions = report.total_transitions(),
            retained = report.retained,
            conflicts = report.conflicts,
            errors = report.errors,
            skipped = report.skipped,
            cleaned_up = report.cleaned_up,
            elapsed_ms = report.elapsed_ms,
            "Lifecycle pass complete"
        );
        report
    }

    /// Resolve each input against the stored trending scores, then advance.
    ///
    /// A failed lookup falls back to the metrics as supplied.
    pub fn lifecycle_pass_from_scores(
        &self,
        inputs: &[SeriesInput],
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> LifecycleReport {
        let series: Vec<SeriesMetrics> = self.pool.install(|| {
            inputs
                .par_iter()
                .map(|input| {
                    self.series_metrics_from_scores(input.metrics.clone(), &input.character_ids, now)
                        .unwrap_or_else(|e| {
                            warn!(
                                series_id = input.metrics.series_id,
                                error = %e,
                                "Stored score lookup failed, using supplied metrics"
                            );
                            input.metrics.clone()
                        })
                })
                .collect()
        });
        self.lifecycle_pass(&series, now, cancel)
    }

    /// Fill the series' own trending score and its character summaries from
    /// the latest snapshots at or before `as_of`.
    ///
    /// The series is scored as a media entity. Supplied values stand where no
    /// snapshot exists; `character_count` is the number of linked characters.
    pub fn series_metrics_from_scores(
        &self,
        mut series: SeriesMetrics,
        character_ids: &[u64],
        as_of: DateTime<Utc>,
    ) -> Result<SeriesMetrics, StorageError> {
        if let Some(own) = self
            .snapshots
            .latest_at_or_before(EntityKey::media(series.series_id), as_of)?
        {
            series.trending = own.final_score;
        }
        if character_ids.is_empty() {
            return Ok(series);
        }

        let mut scores = Vec::with_capacity(character_ids.len());
        for &id in character_ids {
            if let Some(s) = self
                .snapshots
                .latest_at_or_before(EntityKey::character(id), as_of)?
            {
                scores.push(s.final_score);
            }
        }
        if !scores.is_empty() {
            series = series.with_character_scores(&scores);
        }
        series.character_count = u32::try_from(character_ids.len()).unwrap_or(u32::MAX);
        debug!(
            series_id = series.series_id,
            scored_characters = scores.len(),
            trending = series.trending,
            "Series metrics resolved from snapshots"
        );
        Ok(series)
    }

    fn advance_one(&self, m: &SeriesMetrics, now: DateTime<Utc>) -> SeriesOutcome {
        match self.track_and_advance(m, now) {
            Ok((tracked, outcome)) => SeriesOutcome::Done { tracked, outcome },
            Err(e) if e.is_conflict() || matches!(e, TransitionError::AlreadyTracked(_)) => {
                warn!(series_id = m.series_id, error = %e, "Lifecycle conflict, retrying next pass");
                SeriesOutcome::Conflict
            }
            Err(e) => {
                error!(series_id = m.series_id, error = %e, "Lifecycle evaluation failed");
                SeriesOutcome::Failed
            }
        }
    }

    /// Returns whether the series was newly tracked, and what happened to it.
    fn track_and_advance(
        &self,
        m: &SeriesMetrics,
        now: DateTime<Utc>,
    ) -> Result<(bool, AdvanceOutcome), TransitionError> {
        let tracked = match self.lifecycle.get(m.series_id) {
            Ok(_) => false,
            Err(TransitionError::NotFound(_)) => {
                self.lifecycle.track(m.series_id)?;
                true
            }
            Err(e) => return Err(e),
        };

        let outcome = self.lifecycle.advance(m, now)?;
        if matches!(outcome, AdvanceOutcome::Idle { stage: LifecycleStage::Upcoming })
            && m.status == Some(ReleaseStatus::Releasing)
        {
            self.lifecycle.promote(m.series_id, now)?;
            let promoted = AdvanceOutcome::Transitioned {
                from: LifecycleStage::Upcoming,
                to: LifecycleStage::GracePeriod,
                decision: None,
            };
            return Ok((tracked, promoted));
        }
        Ok((tracked, outcome))
    }

    /// UPCOMING -> GRACE_PERIOD for series that started releasing.
    pub fn promote_released(&self, series_ids: &[u64], now: DateTime<Utc>) -> PromoteReport {
        let mut report = PromoteReport::default();
        for &id in series_ids {
            match self.lifecycle.promote(id, now) {
                Ok(_) => report.promoted += 1,
                Err(TransitionError::InvalidTransition { from, .. }) => {
                    debug!(series_id = id, stage = %from, "Not promoted, series is past UPCOMING");
                    report.ineligible += 1;
                }
                Err(TransitionError::NotFound(_)) => report.not_tracked += 1,
                Err(e) if e.is_conflict() => report.conflicts += 1,
                Err(e) => {
                    error!(series_id = id, error = %e, "Promotion failed");
                    report.errors += 1;
                }
            }
        }
        info!(
            promoted = report.promoted,
            ineligible = report.ineligible,
            not_tracked = report.not_tracked,
            "Promotion complete"
        );
        report
    }
}

enum SeriesOutcome {
    Done { tracked: bool, outcome: AdvanceOutcome },
    Conflict,
    Failed,
    Skipped,
}

/// Rank 1 is the highest final score; ties go to the lower entity key.
pub fn assign_popularity_ranks(scores: &mut [TrendingScore]) {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| {
        let (sa, sb) = (&scores[a], &scores[b]);
        match sb.final_score.total_cmp(&sa.final_score) {
            Ordering::Equal => sa.key().cmp(&sb.key()),
            other => other,
        }
    });
    for (rank, idx) in order.into_iter().enumerate() {
        scores[idx].metadata.popularity_rank = Some(u32::try_from(rank + 1).unwrap_or(u32::MAX));
    }
}

fn start_of_day(d: NaiveDate) -> DateTime<Utc> {
    d.and_time(NaiveTime::MIN).and_utc()
}

fn end_of_day(d: NaiveDate) -> DateTime<Utc> {
    d.succ_opt()
        .map(|next| start_of_day(next) - chrono::Duration::nanoseconds(1))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
