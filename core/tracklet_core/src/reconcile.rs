use std::collections::HashMap;

use serde::Serialize;
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::PipelineResult;
use crate::heuristics::keyword_label;
use crate::jsonl::load_records;
use crate::normalize::floor_to_minute;
use crate::records::{
    active_seconds, ActivityRecord, ClassificationRecord, MetricsRecord, Productive,
    ProductivityLabel,
};
use crate::store::write_atomic;

/// Which pipeline stage resolved a record's label. Stages run in declaration order and a
/// record that resolves never goes back to an earlier stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LabelSource {
    AsOf,
    ForwardFill,
    Lookahead,
    Unresolved,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub activity_rows: usize,
    pub classification_rows: usize,
    pub dropped_activity: usize,
    pub dropped_classification: usize,
    pub resolved_as_of: usize,
    pub resolved_forward_fill: usize,
    pub resolved_lookahead: usize,
    pub unknown: usize,
}

fn match_key(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Most recent classification at or before `at`, if no older than `lookback`.
fn as_of<'a>(
    cls: &'a [ClassificationRecord],
    candidates: Option<&Vec<usize>>,
    at: OffsetDateTime,
    lookback: Duration,
) -> Option<&'a ClassificationRecord> {
    let list = candidates?;
    let pos = list.partition_point(|&i| cls[i].ts <= at);
    let c = &cls[*list.get(pos.checked_sub(1)?)?];
    (at - c.ts <= lookback).then_some(c)
}

/// Label of the first resolved classification strictly after `at`, within `lookahead`.
fn lookahead(
    cls: &[ClassificationRecord],
    candidates: Option<&Vec<usize>>,
    at: OffsetDateTime,
    bound: Duration,
) -> Option<bool> {
    let list = candidates?;
    let pos = list.partition_point(|&i| cls[i].ts <= at);
    let c = &cls[*list.get(pos)?];
    if c.ts - at <= bound {
        c.productive
    } else {
        None
    }
}

/// Merge the activity stream with classifications into one labeled record per activity.
///
/// 1. timestamps floored to the minute (local offset), both inputs stable-sorted;
/// 2. as-of join on the same app within `cfg.lookback`;
/// 3. forward fill inside each app/window session;
/// 4. first later classification with the same app/window within `cfg.lookahead`.
pub fn reconcile(
    activity: Vec<ActivityRecord>,
    classifications: Vec<ClassificationRecord>,
    cfg: &Config,
) -> (Vec<MetricsRecord>, Vec<LabelSource>) {
    let tz = cfg.tz_offset;

    let mut activity = activity;
    for a in &mut activity {
        a.ts = floor_to_minute(a.ts, tz);
    }
    activity.sort_by_key(|a| a.ts);

    let mut cls = classifications;
    for c in &mut cls {
        c.ts = floor_to_minute(c.ts, tz);
    }
    cls.sort_by_key(|c| c.ts);

    // Indices into `cls`, ascending by time.
    let mut by_app: HashMap<String, Vec<usize>> = HashMap::new();
    let mut resolved_by_pair: HashMap<(String, String), Vec<usize>> = HashMap::new();
    for (i, c) in cls.iter().enumerate() {
        by_app.entry(match_key(&c.app_name)).or_default().push(i);
        if c.productive.is_some() {
            resolved_by_pair
                .entry((match_key(&c.app_name), match_key(&c.window_title)))
                .or_default()
                .push(i);
        }
    }

    let mut out = Vec::with_capacity(activity.len());
    let mut sources = Vec::with_capacity(activity.len());
    let mut carry: Option<bool> = None;
    let mut prev: Option<(&str, &str)> = None;

    for a in &activity {
        let key = (a.app_name.as_str(), a.window_title.as_str());
        if prev != Some(key) {
            carry = None;
        }
        prev = Some(key);

        let attached = as_of(&cls, by_app.get(&match_key(&a.app_name)), a.ts, cfg.lookback);
        let mut productive = attached.and_then(|c| c.productive);
        let mut source = LabelSource::AsOf;

        if productive.is_none() {
            productive = carry;
            source = LabelSource::ForwardFill;
        }
        if productive.is_none() {
            let pair = (match_key(&a.app_name), match_key(&a.window_title));
            productive = lookahead(&cls, resolved_by_pair.get(&pair), a.ts, cfg.lookahead);
            source = LabelSource::Lookahead;
        }
        if productive.is_none() {
            source = LabelSource::Unresolved;
        }
        if productive.is_some() {
            carry = productive;
        }

        let productive = Productive::from_option(productive);
        let label = match productive.label() {
            Some(label) => label,
            None if cfg.heuristic_labels => keyword_label(&a.app_name, &a.window_title),
            None => ProductivityLabel::Neutral,
        };

        out.push(MetricsRecord {
            ts: a.ts,
            app_name: a.app_name.clone(),
            window_title: a.window_title.clone(),
            idle_seconds: a.idle_seconds,
            productive,
            active_seconds: active_seconds(a.idle_seconds, cfg.poll_interval_seconds),
            label,
            source_app_name: attached.map(|c| c.app_name.clone()),
            source_window_title: attached.map(|c| c.window_title.clone()),
        });
        sources.push(source);
    }

    (out, sources)
}

pub fn render_metrics_log(records: &[MetricsRecord]) -> serde_json::Result<String> {
    let mut text = String::new();
    for r in records {
        text.push_str(&r.to_json_line()?);
        text.push('\n');
    }
    Ok(text)
}

/// Load both logs, reconcile, and atomically replace MetricsLog.
pub fn run_reconcile(cfg: &Config) -> PipelineResult<ReconcileReport> {
    let tz = cfg.tz_offset;
    let activity = load_records(&cfg.activity_log(), |v| ActivityRecord::from_json(v, tz))?;
    let classifications = load_records(&cfg.classification_log(), |v| {
        ClassificationRecord::from_json(v, tz)
    })?;

    let mut report = ReconcileReport {
        activity_rows: activity.rows.len(),
        classification_rows: classifications.rows.len(),
        dropped_activity: activity.dropped,
        dropped_classification: classifications.dropped,
        ..ReconcileReport::default()
    };

    let (records, sources) = reconcile(activity.rows, classifications.rows, cfg);
    for s in &sources {
        match s {
            LabelSource::AsOf => report.resolved_as_of += 1,
            LabelSource::ForwardFill => report.resolved_forward_fill += 1,
            LabelSource::Lookahead => report.resolved_lookahead += 1,
            LabelSource::Unresolved => report.unknown += 1,
        }
    }

    let text = render_metrics_log(&records)?;
    let path = cfg.metrics_log();
    write_atomic(&path, text.as_bytes())?;

    if report.dropped_activity > 0 || report.dropped_classification > 0 {
        warn!(
            "skipped malformed lines: activity={} classification={}",
            report.dropped_activity, report.dropped_classification
        );
    }
    info!(
        "metrics log updated: {} rows ({} as-of, {} filled, {} lookahead, {} unknown) -> {}",
        records.len(),
        report.resolved_as_of,
        report.resolved_forward_fill,
        report.resolved_lookahead,
        report.unknown,
        path.display()
    );
    Ok(report)
}
