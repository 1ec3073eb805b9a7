use std::collections::BTreeMap;

use serde::Serialize;
use time::{Date, OffsetDateTime, UtcOffset, Weekday};

use crate::normalize::{format_ts, hour_bucket, local_day, round2};
use crate::records::{MetricsRecord, ProductivityLabel};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HourlyProductivity {
    pub hour: String,
    pub productive: f64,
    pub unproductive: f64,
}

/// Active seconds split by label.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LabelSeconds {
    pub productive: f64,
    pub unproductive: f64,
    pub neutral: f64,
}

impl LabelSeconds {
    pub fn add(&mut self, label: ProductivityLabel, seconds: f64) {
        match label {
            ProductivityLabel::Productive => self.productive += seconds,
            ProductivityLabel::Unproductive => self.unproductive += seconds,
            ProductivityLabel::Neutral => self.neutral += seconds,
        }
    }

    pub fn total(&self) -> f64 {
        self.productive + self.unproductive + self.neutral
    }

    /// Productive and unproductive shares of the total, in percent. Zero total is 0/0.
    pub fn percentages(&self) -> (f64, f64) {
        let total = self.total();
        if total <= 0.0 {
            return (0.0, 0.0);
        }
        let productive = round2(self.productive / total * 100.0);
        let mut unproductive = round2(self.unproductive / total * 100.0);
        if productive + unproductive > 100.0 {
            unproductive = round2(100.0 - productive);
        }
        (productive, unproductive)
    }
}

pub fn seconds_by_hour(rows: &[MetricsRecord], local: UtcOffset) -> BTreeMap<OffsetDateTime, LabelSeconds> {
    let mut hours: BTreeMap<OffsetDateTime, LabelSeconds> = BTreeMap::new();
    for r in rows {
        hours
            .entry(hour_bucket(r.ts, local))
            .or_default()
            .add(r.label, r.active_seconds);
    }
    hours
}

/// Per local hour, productive and unproductive percent of active time. Neutral time
/// stays in the denominator.
pub fn hourly_productivity(rows: &[MetricsRecord], local: UtcOffset) -> Vec<HourlyProductivity> {
    seconds_by_hour(rows, local)
        .into_iter()
        .map(|(hour, secs)| {
            let (productive, unproductive) = secs.percentages();
            HourlyProductivity {
                hour: format_ts(hour),
                productive,
                unproductive,
            }
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DailyProductivity {
    pub date: String,
    pub day: &'static str,
    pub productivity: f64,
}

fn weekday_short(d: Date) -> &'static str {
    match d.weekday() {
        Weekday::Monday => "Mon",
        Weekday::Tuesday => "Tue",
        Weekday::Wednesday => "Wed",
        Weekday::Thursday => "Thu",
        Weekday::Friday => "Fri",
        Weekday::Saturday => "Sat",
        Weekday::Sunday => "Sun",
    }
}

/// Productive percent per local calendar day with active time; the last `days` of them.
pub fn daily_productivity(rows: &[MetricsRecord], local: UtcOffset, days: usize) -> Vec<DailyProductivity> {
    let mut by_day: BTreeMap<Date, LabelSeconds> = BTreeMap::new();
    for r in rows {
        by_day
            .entry(local_day(r.ts, local))
            .or_default()
            .add(r.label, r.active_seconds);
    }
    let active: Vec<_> = by_day.into_iter().filter(|(_, s)| s.total() > 0.0).collect();
    let skip = active.len().saturating_sub(days);
    active
        .into_iter()
        .skip(skip)
        .map(|(date, secs)| DailyProductivity {
            date: date.to_string(),
            day: weekday_short(date),
            productivity: secs.percentages().0,
        })
        .collect()
}
