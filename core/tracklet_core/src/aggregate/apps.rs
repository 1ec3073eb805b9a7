use std::collections::HashMap;

use serde::Serialize;

use crate::normalize::{minutes, round2};
use crate::records::{MetricsRecord, ProductivityLabel};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppUsage {
    pub app: String,
    pub active_seconds: f64,
    pub productive_seconds: f64,
    pub unproductive_seconds: f64,
    pub records: u32,
    pub avg_session_minutes: f64,
    pub productive_pct: f64,
}

impl AppUsage {
    pub fn active_minutes(&self) -> f64 {
        minutes(self.active_seconds)
    }
}

/// Per-app totals ranked by active time, ties by name. Each record stands in for one
/// session when averaging.
pub fn app_usage(rows: &[MetricsRecord]) -> Vec<AppUsage> {
    let mut by_app: HashMap<&str, AppUsage> = HashMap::new();
    for r in rows {
        let u = by_app.entry(r.app_name.as_str()).or_insert_with(|| AppUsage {
            app: r.app_name.clone(),
            active_seconds: 0.0,
            productive_seconds: 0.0,
            unproductive_seconds: 0.0,
            records: 0,
            avg_session_minutes: 0.0,
            productive_pct: 0.0,
        });
        u.active_seconds += r.active_seconds;
        match r.label {
            ProductivityLabel::Productive => u.productive_seconds += r.active_seconds,
            ProductivityLabel::Unproductive => u.unproductive_seconds += r.active_seconds,
            ProductivityLabel::Neutral => {}
        }
        u.records += 1;
    }

    let mut out: Vec<AppUsage> = by_app
        .into_values()
        .map(|mut u| {
            u.avg_session_minutes = round2(u.active_seconds / 60.0 / f64::from(u.records));
            u.productive_pct = if u.active_seconds > 0.0 {
                round2(u.productive_seconds / u.active_seconds * 100.0)
            } else {
                0.0
            };
            u
        })
        .collect();
    out.sort_by(|a, b| {
        b.active_seconds
            .total_cmp(&a.active_seconds)
            .then_with(|| a.app.cmp(&b.app))
    });
    out
}

/// Names of the `n` highest-ranked apps.
pub fn top_apps(usage: &[AppUsage], n: usize) -> Vec<String> {
    usage.iter().take(n).map(|u| u.app.clone()).collect()
}
