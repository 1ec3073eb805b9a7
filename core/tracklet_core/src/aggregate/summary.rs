use serde::Serialize;

use crate::normalize::{minutes, round2};
use crate::records::MetricsRecord;

use super::hourly::LabelSeconds;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ProductivitySummary {
    pub productive: f64,
    pub unproductive: f64,
    pub idle: f64,
    pub neutral: f64,
    pub total_minutes: f64,
}

/// Whole-log minutes per label plus idle minutes.
pub fn productivity_summary(rows: &[MetricsRecord]) -> ProductivitySummary {
    let mut secs = LabelSeconds::default();
    let mut idle = 0.0;
    for r in rows {
        secs.add(r.label, r.active_seconds);
        idle += r.idle_seconds;
    }

    let productive = minutes(secs.productive);
    let unproductive = minutes(secs.unproductive);
    let neutral = minutes(secs.neutral);
    let idle = minutes(idle);
    ProductivitySummary {
        productive,
        unproductive,
        idle,
        neutral,
        total_minutes: round2(productive + unproductive + idle + neutral),
    }
}
