use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::config::Config;
use crate::error::{PipelineError, PipelineResult};
use crate::jsonl::read_objects;
use crate::normalize::{coerce_productive_lenient, parse_timestamp_value};
use crate::records::{active_seconds, idle_from_json, MetricsRecord, Productive, ProductivityLabel};

/// Ceiling for idle readings on the dashboard path; sleep/wake gaps report hours of idle.
const MAX_IDLE_SECONDS: f64 = 3600.0;

/// Columns reducers may depend on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Column {
    AppName,
    WindowTitle,
    IdleSeconds,
    Productive,
}

impl Column {
    pub fn name(self) -> &'static str {
        match self {
            Column::AppName => "app_name",
            Column::WindowTitle => "window_title",
            Column::IdleSeconds => "idle_seconds",
            Column::Productive => "productive",
        }
    }

    const ALL: [Column; 4] = [
        Column::AppName,
        Column::WindowTitle,
        Column::IdleSeconds,
        Column::Productive,
    ];
}

/// MetricsLog loaded and normalized for the reducers: sorted by time, active seconds
/// recomputed from idle, labels re-coerced.
#[derive(Debug, Clone)]
pub struct MetricsTable {
    pub rows: Vec<MetricsRecord>,
    pub dropped: usize,
    path: PathBuf,
    present: Vec<Column>,
}

impl MetricsTable {
    pub fn load(cfg: &Config) -> PipelineResult<Self> {
        Self::load_from(&cfg.metrics_log(), cfg)
    }

    pub fn load_from(path: &Path, cfg: &Config) -> PipelineResult<Self> {
        let objects = read_objects(path)?;
        let present = Column::ALL
            .into_iter()
            .filter(|c| objects.rows.iter().any(|v| v.get(c.name()).is_some()))
            .collect();

        let mut dropped = objects.dropped;
        let mut rows = Vec::with_capacity(objects.rows.len());
        for v in &objects.rows {
            match normalize_row(v, cfg) {
                Some(r) => rows.push(r),
                None => dropped += 1,
            }
        }
        rows.sort_by_key(|r| r.ts);

        Ok(MetricsTable {
            rows,
            dropped,
            path: path.to_path_buf(),
            present,
        })
    }

    pub fn require(&self, columns: &[Column]) -> PipelineResult<()> {
        match columns.iter().find(|c| !self.present.contains(c)) {
            Some(missing) => Err(PipelineError::MissingColumn {
                path: self.path.clone(),
                column: missing.name(),
            }),
            None => Ok(()),
        }
    }

    /// Clip every idle reading to one hour. The periodic artifacts sum raw idle time;
    /// only the dashboard charts use clipped values.
    pub fn clip_idle(mut self) -> Self {
        for r in &mut self.rows {
            r.idle_seconds = r.idle_seconds.min(MAX_IDLE_SECONDS);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn text_or_unknown(v: &Value, key: &str) -> String {
    v.get(key)
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string()
}

fn normalize_row(v: &Value, cfg: &Config) -> Option<MetricsRecord> {
    let ts = parse_timestamp_value(v.get("timestamp"), cfg.tz_offset)?;
    let idle_seconds = idle_from_json(v.get("idle_seconds"));
    let productive = Productive::from_option(v.get("productive").and_then(coerce_productive_lenient));

    // Unknown records keep a stored keyword label, if any.
    let label = productive
        .label()
        .unwrap_or_else(|| match v.get("productivity_label").and_then(Value::as_str) {
            Some("productive") => ProductivityLabel::Productive,
            Some("unproductive") => ProductivityLabel::Unproductive,
            _ => ProductivityLabel::Neutral,
        });

    Some(MetricsRecord {
        ts,
        app_name: text_or_unknown(v, "app_name"),
        window_title: text_or_unknown(v, "window_title"),
        idle_seconds,
        productive,
        active_seconds: active_seconds(idle_seconds, cfg.poll_interval_seconds),
        label,
        source_app_name: v.get("source_app_name").and_then(Value::as_str).map(str::to_string),
        source_window_title: v
            .get("source_window_title")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}
