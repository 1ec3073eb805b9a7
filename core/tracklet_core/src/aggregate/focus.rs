use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use time::{Duration, OffsetDateTime, UtcOffset};

use crate::normalize::{format_ts, hour_bucket, minutes, round2};
use crate::records::{MetricsRecord, Productive};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusSession {
    pub id: String,
    pub start: String,
    pub end: String,
    pub duration_seconds: f64,
    pub app: String,
    pub window: String,
}

impl FocusSession {
    pub fn duration_minutes(&self) -> f64 {
        self.duration_seconds / 60.0
    }
}

/// Maximal runs of productive records on one app/window with no gap above `gap`.
/// A session ends one poll interval after its last record.
pub fn focus_sessions(rows: &[MetricsRecord], gap: Duration, poll_interval_seconds: f64) -> Vec<FocusSession> {
    let poll = Duration::seconds_f64(poll_interval_seconds);
    let mut out: Vec<FocusSession> = Vec::new();
    let mut prev: Option<&MetricsRecord> = None;

    for r in rows.iter().filter(|r| r.productive == Productive::Yes) {
        let continues = prev.is_some_and(|p| {
            p.app_name == r.app_name && p.window_title == r.window_title && r.ts - p.ts <= gap
        });
        if continues {
            if let Some(s) = out.last_mut() {
                s.end = format_ts(r.ts + poll);
                s.duration_seconds += r.active_seconds;
            }
        } else {
            let id = format!("session-{}", out.len() + 1);
            out.push(FocusSession {
                id,
                start: format_ts(r.ts),
                end: format_ts(r.ts + poll),
                duration_seconds: r.active_seconds,
                app: r.app_name.clone(),
                window: r.window_title.clone(),
            });
        }
        prev = Some(r);
    }
    out
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HistogramBin {
    pub name: &'static str,
    pub sessions: u32,
}

const BINS: [(&str, f64); 6] = [
    ("0-15m", 15.0),
    ("15-30m", 30.0),
    ("30-45m", 45.0),
    ("45-60m", 60.0),
    ("60-90m", 90.0),
    ("90m+", f64::INFINITY),
];

/// Session length distribution; every bin is present.
pub fn session_histogram(sessions: &[FocusSession]) -> Vec<HistogramBin> {
    let mut counts = [0u32; BINS.len()];
    for s in sessions {
        let m = s.duration_minutes();
        if let Some(i) = BINS.iter().position(|(_, upper)| m < *upper) {
            counts[i] += 1;
        }
    }
    BINS.iter()
        .zip(counts)
        .map(|((name, _), sessions)| HistogramBin { name, sessions })
        .collect()
}

/// Focus score per local hour: productive minutes × 10.
pub fn focus_score_by_hour(rows: &[MetricsRecord], local: UtcOffset) -> BTreeMap<OffsetDateTime, f64> {
    let mut secs: BTreeMap<OffsetDateTime, f64> = BTreeMap::new();
    for r in rows {
        let slot = secs.entry(hour_bucket(r.ts, local)).or_default();
        if r.productive == Productive::Yes {
            *slot += r.active_seconds;
        }
    }
    secs.into_iter().map(|(h, s)| (h, round2(s / 60.0 * 10.0))).collect()
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CategoryMinutes {
    pub name: String,
    pub minutes: f64,
}

/// Productive minutes per app, largest first.
pub fn focus_minutes_by_app(rows: &[MetricsRecord], limit: usize) -> Vec<CategoryMinutes> {
    let mut secs: HashMap<&str, f64> = HashMap::new();
    for r in rows.iter().filter(|r| r.productive == Productive::Yes) {
        *secs.entry(r.app_name.as_str()).or_default() += r.active_seconds;
    }
    let mut out: Vec<_> = secs
        .into_iter()
        .map(|(name, s)| CategoryMinutes {
            name: name.to_string(),
            minutes: minutes(s),
        })
        .collect();
    out.sort_by(|a, b| b.minutes.total_cmp(&a.minutes).then_with(|| a.name.cmp(&b.name)));
    out.truncate(limit);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::fixture::rec;

    fn sessions(rows: &[MetricsRecord]) -> Vec<FocusSession> {
        focus_sessions(rows, Duration::minutes(5), 60.0)
    }

    #[test]
    fn sessions_split_on_window_change_and_gap() {
        let rows = vec![
            rec("10:00", "Code", "a.rs", 0.0, Some(true)),
            rec("10:01", "Code", "a.rs", 30.0, Some(true)),
            rec("10:02", "Slack", "chat", 0.0, Some(false)),
            rec("10:03", "Code", "a.rs", 0.0, Some(true)),
            rec("10:04", "Code", "b.rs", 0.0, Some(true)),
            rec("10:15", "Code", "b.rs", 0.0, Some(true)),
        ];
        let out = sessions(&rows);
        assert_eq!(out.len(), 3);

        // The unproductive record is filtered out, so 10:00..10:03 is one run.
        assert_eq!(out[0].id, "session-1");
        assert_eq!(out[0].start, "2025-10-05T10:00:00Z");
        assert_eq!(out[0].end, "2025-10-05T10:04:00Z");
        assert_eq!(out[0].duration_seconds, 150.0);

        assert_eq!(out[1].window, "b.rs");
        assert_eq!(out[2].start, "2025-10-05T10:15:00Z");
    }

    #[test]
    fn histogram_emits_every_bin() {
        let rows: Vec<_> = (0..20)
            .map(|i| rec(&format!("10:{i:02}"), "Code", "a.rs", 0.0, Some(true)))
            .collect();
        let bins = session_histogram(&sessions(&rows));
        assert_eq!(bins.len(), 6);
        assert_eq!(bins[1], HistogramBin { name: "15-30m", sessions: 1 });
        assert_eq!(bins.iter().map(|b| b.sessions).sum::<u32>(), 1);
        assert!(session_histogram(&[]).iter().all(|b| b.sessions == 0));
    }

    #[test]
    fn score_and_category_minutes() {
        let rows = vec![
            rec("10:00", "Code", "a", 0.0, Some(true)),
            rec("10:01", "Figma", "b", 30.0, Some(true)),
            rec("10:02", "Slack", "c", 0.0, Some(false)),
            rec("11:00", "Slack", "c", 0.0, None),
        ];
        let score: Vec<_> = focus_score_by_hour(&rows, UtcOffset::UTC).into_values().collect();
        assert_eq!(score, vec![15.0, 0.0]);

        let cats = focus_minutes_by_app(&rows, 1);
        assert_eq!(cats, vec![CategoryMinutes { name: "Code".into(), minutes: 1.0 }]);
    }
}
