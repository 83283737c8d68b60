//! Series lifecycle
//!
//! - `rules`: periods, thresholds and weights from the config, plus explanations
//! - `decision`: composite score and the KEEP_ACTIVE / EXTEND_GRACE / ARCHIVE verdict
//! - `state_machine`: applies verdicts and timers to stored records with CAS writes
//! - `stats`: per-stage counts and recent-activity counters

pub mod decision;
pub mod rules;
pub mod state_machine;
pub mod stats;

pub use decision::LifecycleDecisionMaker;
pub use rules::{LifecycleRulesManager, RuleKind, RulesReport};
pub use state_machine::{is_allowed, AdvanceOutcome, LifecycleStateMachine, TransitionError};
pub use stats::LifecycleStats;
