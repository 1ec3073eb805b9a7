use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};
use time::{OffsetDateTime, UtcOffset};

use crate::normalize::{format_ts, hhmm, hour_bucket, minutes};
use crate::records::{MetricsRecord, ProductivityLabel};

pub const OTHER: &str = "Other";

/// Per local hour, active minutes for each of `top` plus everything else as `Other`.
/// Rows are chart points: `{"name": "HH:MM", <app>: minutes, ..., "Other": minutes}`;
/// `Other` is left out of hours where it would be zero.
pub fn stacked_timeline(rows: &[MetricsRecord], local: UtcOffset, top: &[String]) -> Vec<Map<String, Value>> {
    let mut hours: BTreeMap<OffsetDateTime, Vec<f64>> = BTreeMap::new();
    for r in rows {
        let slots = hours
            .entry(hour_bucket(r.ts, local))
            .or_insert_with(|| vec![0.0; top.len() + 1]);
        let i = top
            .iter()
            .position(|a| *a == r.app_name)
            .unwrap_or(top.len());
        slots[i] += r.active_seconds;
    }

    hours
        .into_iter()
        .map(|(hour, slots)| {
            let mut point = Map::new();
            point.insert("name".into(), Value::from(hhmm(hour, local)));
            let names = top.iter().map(String::as_str).chain(std::iter::once(OTHER));
            for (name, secs) in names.zip(slots) {
                if name == OTHER && secs <= 0.0 {
                    continue;
                }
                point.insert(name.to_string(), Value::from(minutes(secs)));
            }
            point
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedEvent {
    pub ts: String,
    pub app: String,
    pub window: String,
    pub idle_sec: f64,
    pub category: ProductivityLabel,
}

/// The most recent `limit` records, oldest first.
pub fn activity_feed(rows: &[MetricsRecord], limit: usize) -> Vec<FeedEvent> {
    let skip = rows.len().saturating_sub(limit);
    rows[skip..]
        .iter()
        .map(|r| FeedEvent {
            ts: format_ts(r.ts),
            app: r.app_name.clone(),
            window: r.window_title.clone(),
            idle_sec: r.idle_seconds,
            category: r.label,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::fixture::rec;
    use serde_json::json;

    #[test]
    fn timeline_collapses_the_tail_into_other() {
        let rows = vec![
            rec("10:00", "Code", "a", 0.0, Some(true)),
            rec("10:01", "Slack", "c", 30.0, None),
            rec("10:02", "Spotify", "s", 0.0, Some(false)),
            rec("11:00", "Code", "a", 0.0, Some(true)),
        ];
        let points = stacked_timeline(&rows, UtcOffset::UTC, &["Code".to_string()]);
        assert_eq!(points.len(), 2);
        assert_eq!(Value::Object(points[0].clone()), json!({"name": "10:00", "Code": 1.0, "Other": 1.5}));
        assert_eq!(Value::Object(points[1].clone()), json!({"name": "11:00", "Code": 1.0}));
    }

    #[test]
    fn feed_keeps_the_latest_records() {
        let rows: Vec<_> = (0..5)
            .map(|i| rec(&format!("10:{i:02}"), "A", "w", f64::from(i), None))
            .collect();
        let feed = activity_feed(&rows, 2);
        assert_eq!(feed.len(), 2);
        assert_eq!(feed[0].ts, "2025-10-05T10:03:00Z");
        assert_eq!(feed[1].idle_sec, 4.0);

        let v = serde_json::to_value(&feed[1]).unwrap();
        assert_eq!(v["idleSec"], 4.0);
        assert_eq!(v["category"], "neutral");
        assert_eq!(activity_feed(&rows, 200).len(), 5);
    }
}
