//! Per-pass summaries returned by the batch runner and logged by the binary.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::aggregation::PruneReport;
use crate::types::{LifecycleStage, PeriodType};

/// Outcome counts of one evaluation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub evaluated: usize,
    /// Entities whose score carries at least one fault
    pub faulted_entities: usize,
    pub fault_count: usize,
    /// Not evaluated because the pass was cancelled
    pub skipped: usize,
    pub storage_errors: usize,
    pub elapsed_ms: u64,
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Evaluation: {} evaluated, {} faulted ({} faults), {} skipped, {} storage errors in {}ms",
            self.evaluated,
            self.faulted_entities,
            self.fault_count,
            self.skipped,
            self.storage_errors,
            self.elapsed_ms
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RollupReport {
    pub snapshots_read: usize,
    /// Aggregates written per period, folded ones included
    pub written: BTreeMap<PeriodType, usize>,
    /// Buckets built from finer aggregates because no snapshots covered them
    pub folded: BTreeMap<PeriodType, usize>,
    pub pruned: PruneReport,
    pub elapsed_ms: u64,
}

impl RollupReport {
    pub fn total_written(&self) -> usize {
        self.written.values().sum()
    }

    pub fn total_folded(&self) -> usize {
        self.folded.values().sum()
    }
}

impl fmt::Display for RollupReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Rollup: {} snapshots read, {} aggregates written ({} folded), {} pruned in {}ms",
            self.snapshots_read,
            self.total_written(),
            self.total_folded(),
            self.pruned.total_removed(),
            self.elapsed_ms
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LifecycleReport {
    pub evaluated: usize,
    pub newly_tracked: usize,
    /// Transition counts keyed by target stage
    pub transitions: BTreeMap<LifecycleStage, usize>,
    pub retained: usize,
    pub waiting: usize,
    pub conflicts: usize,
    pub errors: usize,
    pub skipped: usize,
    pub cleaned_up: usize,
    pub elapsed_ms: u64,
}

impl LifecycleReport {
    pub fn transitions_to(&self, stage: LifecycleStage) -> usize {
        self.transitions.get(&stage).copied().unwrap_or(0)
    }

    pub fn total_transitions(&self) -> usize {
        self.transitions.values().sum()
    }
}

impl fmt::Display for LifecycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Lifecycle: {} evaluated, {} transitions, {} retained, {} waiting, {} conflicts, {} errors, {} cleaned up in {}ms",
            self.evaluated,
            self.total_transitions(),
            self.retained,
            self.waiting,
            self.conflicts,
            self.errors,
            self.cleaned_up,
            self.elapsed_ms
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PromoteReport {
    pub promoted: usize,
    /// Tracked but not in UPCOMING
    pub ineligible: usize,
    pub not_tracked: usize,
    pub conflicts: usize,
    pub errors: usize,
}

impl fmt::Display for PromoteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Promote: {} promoted, {} ineligible, {} not tracked, {} conflicts, {} errors",
            self.promoted, self.ineligible, self.not_tracked, self.conflicts, self.errors
        )
    }
}
