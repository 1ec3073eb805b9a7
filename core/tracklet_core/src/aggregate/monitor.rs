use serde::Serialize;
use time::OffsetDateTime;

use crate::normalize::format_ts;
use crate::records::{MetricsRecord, Productive};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MonitorStatus {
    pub unproductive_streak: bool,
    pub checked_at: String,
}

/// True when there are at least `n` records and the last `n` are all unproductive.
pub fn unproductive_streak(rows: &[MetricsRecord], n: usize) -> bool {
    n > 0
        && rows.len() >= n
        && rows[rows.len() - n..]
            .iter()
            .all(|r| r.productive == Productive::No)
}

pub fn monitor_status(rows: &[MetricsRecord], n: usize, now: OffsetDateTime) -> MonitorStatus {
    MonitorStatus {
        unproductive_streak: unproductive_streak(rows, n),
        checked_at: format_ts(now),
    }
}
