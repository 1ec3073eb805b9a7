use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use time::{OffsetDateTime, UtcOffset};

use crate::normalize::{format_ts, hour_bucket};
use crate::records::MetricsRecord;

/// What counts as a context switch between two consecutive records.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwitchGranularity {
    /// The foreground app changed.
    App,
    /// The app or the window title changed.
    AppOrWindow,
}

impl SwitchGranularity {
    fn is_switch(self, prev: &MetricsRecord, cur: &MetricsRecord) -> bool {
        match self {
            SwitchGranularity::App => prev.app_name != cur.app_name,
            SwitchGranularity::AppOrWindow => {
                prev.app_name != cur.app_name || prev.window_title != cur.window_title
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HourlySwitches {
    pub hour: String,
    pub switches: u32,
}

/// Switch counts keyed by the hour the switch lands in. Every hour that has records is
/// present; the first record never counts.
pub fn switches_by_hour(
    rows: &[MetricsRecord],
    local: UtcOffset,
    granularity: SwitchGranularity,
) -> BTreeMap<OffsetDateTime, u32> {
    let mut hours = BTreeMap::new();
    let mut prev: Option<&MetricsRecord> = None;
    for r in rows {
        let slot = hours.entry(hour_bucket(r.ts, local)).or_insert(0);
        if prev.is_some_and(|p| granularity.is_switch(p, r)) {
            *slot += 1;
        }
        prev = Some(r);
    }
    hours
}

pub fn context_switches(
    rows: &[MetricsRecord],
    local: UtcOffset,
    granularity: SwitchGranularity,
) -> Vec<HourlySwitches> {
    switches_by_hour(rows, local, granularity)
        .into_iter()
        .map(|(hour, switches)| HourlySwitches {
            hour: format_ts(hour),
            switches,
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TransitionPair {
    pub from: String,
    pub to: String,
    pub count: u32,
}

/// Most frequent app-to-app transitions; ties keep first-seen order.
pub fn top_transitions(rows: &[MetricsRecord], limit: usize) -> Vec<TransitionPair> {
    let mut pairs: Vec<TransitionPair> = Vec::new();
    let mut index: HashMap<(&str, &str), usize> = HashMap::new();

    for w in rows.windows(2) {
        let (from, to) = (w[0].app_name.as_str(), w[1].app_name.as_str());
        if from == to {
            continue;
        }
        match index.get(&(from, to)) {
            Some(&i) => pairs[i].count += 1,
            None => {
                index.insert((from, to), pairs.len());
                pairs.push(TransitionPair {
                    from: from.to_string(),
                    to: to.to_string(),
                    count: 1,
                });
            }
        }
    }

    // Stable sort keeps first occurrence ahead on ties.
    pairs.sort_by(|a, b| b.count.cmp(&a.count));
    pairs.truncate(limit);
    pairs
}
