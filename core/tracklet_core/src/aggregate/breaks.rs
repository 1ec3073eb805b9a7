use std::collections::BTreeMap;

use serde::Serialize;
use time::{Duration, OffsetDateTime, UtcOffset};

use crate::normalize::{format_ts, hour_bucket, minutes, round2};
use crate::records::MetricsRecord;

pub const BREAK_REASON: &str = "Extended idle";

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Break {
    pub start: String,
    pub end: String,
    pub duration_minutes: f64,
    pub reason: &'static str,
}

struct OpenBreak {
    start: OffsetDateTime,
    end: OffsetDateTime,
}

impl OpenBreak {
    fn close(self, threshold_seconds: f64) -> Option<Break> {
        let duration = round2((self.end - self.start).as_seconds_f64() / 60.0);
        (duration >= threshold_seconds / 60.0).then(|| Break {
            start: format_ts(self.start),
            end: format_ts(self.end),
            duration_minutes: duration,
            reason: BREAK_REASON,
        })
    }
}

/// Runs of records idle for at least `threshold_seconds`. A run starts at the first
/// record's `ts − idle` and ends at the last idle record's timestamp.
pub fn detect_breaks(rows: &[MetricsRecord], threshold_seconds: f64) -> Vec<Break> {
    let mut out = Vec::new();
    let mut open: Option<OpenBreak> = None;

    for r in rows {
        if r.idle_seconds >= threshold_seconds {
            match open.as_mut() {
                Some(b) => b.end = r.ts,
                None => {
                    open = Some(OpenBreak {
                        start: r.ts - Duration::seconds_f64(r.idle_seconds),
                        end: r.ts,
                    })
                }
            }
        } else if let Some(b) = open.take() {
            out.extend(b.close(threshold_seconds));
        }
    }
    if let Some(b) = open {
        out.extend(b.close(threshold_seconds));
    }
    out
}

/// Idle minutes per local hour.
pub fn idle_minutes_by_hour(rows: &[MetricsRecord], local: UtcOffset) -> BTreeMap<OffsetDateTime, f64> {
    let mut secs: BTreeMap<OffsetDateTime, f64> = BTreeMap::new();
    for r in rows {
        *secs.entry(hour_bucket(r.ts, local)).or_default() += r.idle_seconds;
    }
    secs.into_iter().map(|(h, s)| (h, minutes(s))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::fixture::rec;

    fn idle_stream(idle: &[f64]) -> Vec<MetricsRecord> {
        idle.iter()
            .enumerate()
            .map(|(i, s)| rec(&format!("10:{i:02}"), "A", "w", *s, None))
            .collect()
    }

    #[test]
    fn consecutive_idle_records_form_one_break() {
        let breaks = detect_breaks(&idle_stream(&[0.0, 0.0, 650.0, 650.0, 0.0]), 600.0);
        assert_eq!(
            breaks,
            vec![Break {
                start: "2025-10-05T09:51:10Z".into(),
                end: "2025-10-05T10:03:00Z".into(),
                duration_minutes: 11.83,
                reason: BREAK_REASON,
            }]
        );
    }

    #[test]
    fn break_open_at_end_of_stream_is_emitted() {
        let breaks = detect_breaks(&idle_stream(&[0.0, 700.0]), 600.0);
        assert_eq!(breaks.len(), 1);
        assert_eq!(breaks[0].end, "2025-10-05T10:01:00Z");
        assert_eq!(breaks[0].duration_minutes, 11.67);
    }

    #[test]
    fn short_idle_is_not_a_break() {
        assert!(detect_breaks(&idle_stream(&[0.0, 599.0, 0.0, 300.0]), 600.0).is_empty());
    }

    #[test]
    fn idle_minutes_group_by_hour() {
        let mut rows = idle_stream(&[30.0, 90.0]);
        rows.push(rec("11:00", "A", "w", 60.0, None));
        let by_hour: Vec<_> = idle_minutes_by_hour(&rows, UtcOffset::UTC).into_values().collect();
        assert_eq!(by_hour, vec![2.0, 1.0]);
    }
}
