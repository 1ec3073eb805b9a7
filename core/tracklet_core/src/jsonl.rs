use std::io::Write;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use crate::error::{PipelineError, PipelineResult};

/// Records parsed from a line-delimited JSON log, with the count of lines dropped.
#[derive(Debug)]
pub struct Loaded<T> {
    pub rows: Vec<T>,
    pub dropped: usize,
}

/// Read every JSON object line of `path`. Blank lines are ignored; lines that are not
/// JSON objects are counted in `dropped`. Invalid UTF-8 is decoded lossily.
pub fn read_objects(path: &Path) -> PipelineResult<Loaded<Value>> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(PipelineError::InputNotReady {
                path: path.to_path_buf(),
                reason: "missing",
            });
        }
        Err(err) => return Err(PipelineError::io(path, err)),
    };
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(PipelineError::InputNotReady {
            path: path.to_path_buf(),
            reason: "empty",
        });
    }

    let mut rows = Vec::new();
    let mut dropped = 0;
    for raw in bytes.split(|b| *b == b'\n') {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(v) if v.is_object() => rows.push(v),
            _ => dropped += 1,
        }
    }

    if rows.is_empty() {
        return Err(PipelineError::InputNotReady {
            path: path.to_path_buf(),
            reason: "no parseable lines",
        });
    }
    Ok(Loaded { rows, dropped })
}

/// Read `path` and map each object through `parse`; objects it rejects count as dropped.
pub fn load_records<T>(
    path: &Path,
    mut parse: impl FnMut(&Value) -> Option<T>,
) -> PipelineResult<Loaded<T>> {
    let objects = read_objects(path)?;
    let mut dropped = objects.dropped;
    let mut rows = Vec::with_capacity(objects.rows.len());
    for v in &objects.rows {
        match parse(v) {
            Some(r) => rows.push(r),
            None => dropped += 1,
        }
    }
    Ok(Loaded { rows, dropped })
}

/// Append one line to an append-only log, creating it (and its directory) if needed.
pub fn append_line<T: Serialize>(path: &Path, value: &T) -> PipelineResult<()> {
    let mut line = serde_json::to_string(value)?;
    line.push('\n');
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
    }
    let mut f = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| PipelineError::io(path, e))?;
    f.write_all(line.as_bytes())
        .map_err(|e| PipelineError::io(path, e))
}
