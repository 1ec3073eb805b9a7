use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{PipelineError, PipelineResult};

/// Derived artifacts, one whole-file JSON document each.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Artifact {
    HourlyProductivity,
    ContextSwitches,
    ProductivitySummary,
    MonitorStatus,
}

impl Artifact {
    pub fn file_name(self) -> &'static str {
        match self {
            Artifact::HourlyProductivity => "hourly_productivity.json",
            Artifact::ContextSwitches => "context_switches.json",
            Artifact::ProductivitySummary => "productivity_summary.json",
            Artifact::MonitorStatus => "monitor_status.json",
        }
    }
}

/// Artifact cache read by the dashboard. Every write replaces the whole file atomically,
/// so readers see either the previous snapshot or the new one.
#[derive(Clone, Debug)]
pub struct MetricsStore {
    dir: PathBuf,
}

impl MetricsStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        MetricsStore { dir: dir.into() }
    }

    pub fn path(&self, artifact: Artifact) -> PathBuf {
        self.dir.join(artifact.file_name())
    }

    pub fn write<T: Serialize>(&self, artifact: Artifact, value: &T) -> PipelineResult<()> {
        let mut text = serde_json::to_string_pretty(value)?;
        text.push('\n');
        write_atomic(&self.path(artifact), text.as_bytes())
    }

    /// `None` when the artifact is missing, empty or not valid JSON.
    pub fn read(&self, artifact: Artifact) -> Option<Value> {
        let path = self.path(artifact);
        let text = std::fs::read_to_string(&path).ok()?;
        if text.trim().is_empty() {
            return None;
        }
        match serde_json::from_str(&text) {
            Ok(v) => Some(v),
            Err(err) => {
                debug!("artifact {} unreadable: {err}", path.display());
                None
            }
        }
    }

    /// Array artifacts; non-object entries are ignored.
    pub fn read_rows(&self, artifact: Artifact) -> Option<Vec<serde_json::Map<String, Value>>> {
        match self.read(artifact)? {
            Value::Array(items) => Some(
                items
                    .into_iter()
                    .filter_map(|v| match v {
                        Value::Object(m) => Some(m),
                        _ => None,
                    })
                    .collect(),
            ),
            _ => None,
        }
    }
}

/// Write to a temp file in the target's directory, fsync, then rename over the target.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> PipelineResult<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| PipelineError::io(dir, e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| PipelineError::io(dir, e))?;
    tmp.write_all(bytes).map_err(|e| PipelineError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| PipelineError::io(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| PipelineError::io(path, e.error))?;
    Ok(())
}
