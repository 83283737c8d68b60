//! System-wide default constants.
//!
//! Grouped by subsystem for easy discovery.

// ============================================================================
// Configuration
// ============================================================================

/// Environment variable holding an explicit config path.
pub const CONFIG_ENV_VAR: &str = "TRENDWATCH_CONFIG";

/// Config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "trending_config.toml";

/// Maximum edit distance for "did you mean" key suggestions.
pub const SUGGESTION_MAX_DISTANCE: usize = 3;

/// Shortest grace period accepted at load.
pub const MIN_GRACE_PERIOD_DAYS: u32 = 7;

/// Grace periods longer than this are accepted with a warning.
pub const LONG_GRACE_PERIOD_DAYS: u32 = 90;

/// Allowed drift of the fractional scoring weights from 1.0 before warning.
pub const WEIGHT_SUM_TOLERANCE: f64 = 0.1;

// ============================================================================
// Storage
// ============================================================================

/// Default data directory for the sled database and lock file.
pub const DEFAULT_DATA_DIR: &str = "./data";

/// Database directory name inside the data directory.
pub const DB_DIR_NAME: &str = "trendwatch.db";

pub const SNAPSHOTS_TREE: &str = "snapshots";
/// Secondary index of snapshots ordered by `as_of` across all entities
pub const SNAPSHOT_TIME_INDEX_TREE: &str = "snapshots_by_time";
pub const AGGREGATES_TREE: &str = "aggregates";
pub const LIFECYCLE_TREE: &str = "lifecycle";

// ============================================================================
// Lifecycle Statistics
// ============================================================================

/// Window for "entered grace" / "archived" counters (days).
pub const STATS_RECENT_DAYS: i64 = 7;

/// Window for the "evaluated recently" counter (hours).
pub const STATS_EVALUATED_HOURS: i64 = 24;

// ============================================================================
// Trend Analysis
// ============================================================================

/// Snapshot count at which velocity confidence reaches 1.0 before damping.
pub const VELOCITY_FULL_CONFIDENCE_POINTS: usize = 10;
