use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;

use time::{Duration, UtcOffset};

use crate::normalize::tz_offset_from_minutes;

const TZ_OFFSET_MINUTES_MIN: i32 = -14 * 60;
const TZ_OFFSET_MINUTES_MAX: i32 = 14 * 60;

pub const DATA_DIR_NAME: &str = "data-backend";
pub const ACTIVITY_FILE: &str = "activity.jsonl";
pub const CLASSIFICATION_FILE: &str = "q_analysis.jsonl";
pub const METRICS_FILE: &str = "metrics.jsonl";

/// Everything the pipeline needs, resolved once at startup and passed by reference.
#[derive(Clone, Debug)]
pub struct Config {
    pub data_dir: PathBuf,
    /// Offset used for naive timestamps and for every HourBucket.
    pub tz_offset: UtcOffset,
    pub poll_interval_seconds: f64,
    /// As-of join tolerance (inclusive).
    pub lookback: Duration,
    /// Same-session future classification search bound.
    pub lookahead: Duration,
    pub break_threshold_seconds: f64,
    pub focus_gap: Duration,
    pub streak_records: usize,
    pub goal_minutes: u32,
    pub heuristic_labels: bool,
    pub reconcile_every: StdDuration,
    pub aggregate_every: StdDuration,
    pub monitor_every: StdDuration,
    pub shutdown_timeout: StdDuration,
}

impl Config {
    /// Defaults rooted at `data_dir`, UTC offset.
    #[cfg(test)]
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Config {
            data_dir: data_dir.into(),
            tz_offset: UtcOffset::UTC,
            poll_interval_seconds: 60.0,
            lookback: Duration::minutes(10),
            lookahead: Duration::minutes(60),
            break_threshold_seconds: 600.0,
            focus_gap: Duration::minutes(5),
            streak_records: 10,
            goal_minutes: 180,
            heuristic_labels: false,
            reconcile_every: StdDuration::from_secs(15),
            aggregate_every: StdDuration::from_secs(60),
            monitor_every: StdDuration::from_secs(30),
            shutdown_timeout: StdDuration::from_secs(5),
        }
    }

    pub fn activity_log(&self) -> PathBuf {
        self.data_dir.join(ACTIVITY_FILE)
    }

    pub fn classification_log(&self) -> PathBuf {
        self.data_dir.join(CLASSIFICATION_FILE)
    }

    pub fn metrics_log(&self) -> PathBuf {
        self.data_dir.join(METRICS_FILE)
    }
}

/// Pick the data directory: an explicit path wins; otherwise the first existing
/// `data-backend` found walking up to two levels from `cwd`; otherwise `cwd/data-backend`.
pub fn resolve_data_dir(explicit: Option<&Path>, cwd: &Path) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    let mut dir = Some(cwd);
    for _ in 0..3 {
        let Some(d) = dir else { break };
        let candidate = d.join(DATA_DIR_NAME);
        if candidate.is_dir() {
            return candidate;
        }
        dir = d.parent();
    }
    cwd.join(DATA_DIR_NAME)
}

pub fn normalize_tz_offset_minutes(v: Option<i32>) -> i32 {
    v.unwrap_or(0)
        .clamp(TZ_OFFSET_MINUTES_MIN, TZ_OFFSET_MINUTES_MAX)
}

/// Explicit minutes, else the machine's current local offset.
pub fn resolve_tz_offset(explicit_minutes: Option<i32>) -> UtcOffset {
    let minutes = explicit_minutes.unwrap_or_else(|| {
        let secs = chrono::Local::now().offset().local_minus_utc();
        secs / 60
    });
    tz_offset_from_minutes(normalize_tz_offset_minutes(Some(minutes)))
}
