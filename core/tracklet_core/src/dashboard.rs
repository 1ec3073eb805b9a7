use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::{Map, Value};
use time::OffsetDateTime;
use tracing::debug;

use crate::aggregate::apps::{app_usage, top_apps};
use crate::aggregate::breaks::{detect_breaks, idle_minutes_by_hour, Break};
use crate::aggregate::focus::{
    focus_minutes_by_app, focus_score_by_hour, focus_sessions, session_histogram, CategoryMinutes,
    FocusSession, HistogramBin,
};
use crate::aggregate::hourly::daily_productivity;
use crate::aggregate::switches::{switches_by_hour, top_transitions, SwitchGranularity, TransitionPair};
use crate::aggregate::timeline::{activity_feed, stacked_timeline, FeedEvent};
use crate::aggregate::MetricsTable;
use crate::config::Config;
use crate::normalize::{format_ts, hhmm, minutes, parse_timestamp, round2};
use crate::records::{MetricsRecord, ProductivityLabel};
use crate::store::{Artifact, MetricsStore};

const CHART_1: &str = "hsl(var(--chart-1))";
const CHART_2: &str = "hsl(var(--chart-2))";
const CHART_3: &str = "hsl(var(--chart-3))";
const CHART_4: &str = "hsl(var(--chart-4))";
const CHART_5: &str = "hsl(var(--chart-5))";

const TOP_APPS: usize = 5;
const TOP_PAIRS: usize = 8;
const FEED_LIMIT: usize = 200;
const FOCUS_CATEGORIES: usize = 6;
const RECENT_SESSIONS: usize = 10;
const WEEK_DAYS: usize = 7;

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct Series {
    pub label: String,
    pub color: &'static str,
}

pub type ChartConfig = BTreeMap<String, Series>;

fn series(entries: &[(&str, &str, &'static str)]) -> ChartConfig {
    entries
        .iter()
        .map(|(key, label, color)| {
            (
                key.to_string(),
                Series {
                    label: label.to_string(),
                    color: *color,
                },
            )
        })
        .collect()
}

#[derive(Debug, Serialize)]
pub struct Chart<P: Serialize> {
    pub points: Vec<P>,
    pub config: ChartConfig,
}

#[derive(Debug, Serialize)]
pub struct Slice {
    pub name: &'static str,
    pub value: f64,
    pub color: &'static str,
}

#[derive(Debug, Serialize)]
pub struct Slices {
    pub slices: Vec<Slice>,
    pub config: ChartConfig,
}

impl Slices {
    fn new(slices: Vec<Slice>) -> Self {
        let config = slices
            .iter()
            .map(|s| {
                (
                    s.name.to_string(),
                    Series {
                        label: s.name.to_string(),
                        color: s.color,
                    },
                )
            })
            .collect();
        Slices { slices, config }
    }
}

#[derive(Debug, Serialize)]
pub struct HourlyPoint {
    pub name: String,
    pub productive: f64,
    pub unproductive: f64,
}

#[derive(Debug, Serialize)]
pub struct SwitchPoint {
    pub name: String,
    pub switches: u64,
}

#[derive(Debug, Serialize)]
pub struct WeeklyPoint {
    pub name: &'static str,
    pub productivity: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub productivity_breakdown: Slices,
    pub hourly_productivity: Chart<HourlyPoint>,
    pub context_switch_trend: Chart<SwitchPoint>,
    pub weekly_productivity: Chart<WeeklyPoint>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdlePoint {
    pub name: String,
    pub idle_min: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdleSection {
    pub idle_over_time: Chart<IdlePoint>,
    pub long_breaks: Vec<Break>,
    pub tracked_minutes: u64,
}

#[derive(Debug, Serialize)]
pub struct UsagePoint {
    pub name: String,
    pub time: f64,
    pub productivity: f64,
}

#[derive(Debug, Serialize)]
pub struct AppSplitPoint {
    pub name: String,
    pub productive: f64,
    pub unproductive: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRow {
    pub app: String,
    pub total_time: f64,
    pub sessions: u32,
    pub avg_session: f64,
    pub productivity: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppsSection {
    pub usage_by_app: Chart<UsagePoint>,
    pub category_distribution: Slices,
    pub productive_vs_unproductive: Chart<AppSplitPoint>,
    pub sessions: Vec<SessionRow>,
}

#[derive(Debug, Serialize)]
pub struct CountPoint {
    pub name: String,
    pub count: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchesSection {
    pub switches_over_time: Chart<SwitchPoint>,
    pub switch_intensity: Chart<CountPoint>,
    pub top_pairs: Vec<TransitionPair>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineSection {
    pub daily_timeline: Chart<Map<String, Value>>,
    pub activity_events: Vec<FeedEvent>,
}

#[derive(Debug, Serialize)]
pub struct FocusPoint {
    pub name: String,
    pub focus: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusSection {
    pub sessions: Vec<FocusSession>,
    pub category_minutes: Chart<CategoryMinutes>,
    pub session_distribution: Chart<HistogramBin>,
    pub focus_score_trend: Chart<FocusPoint>,
    pub goal_minutes: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Thresholds {
    pub poll_interval_seconds: f64,
    pub lookback_minutes: i64,
    pub lookahead_minutes: i64,
    pub break_threshold_seconds: f64,
    pub focus_gap_minutes: i64,
    pub streak_records: usize,
    pub goal_minutes: u32,
    pub heuristic_labels: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsSection {
    pub thresholds: Thresholds,
    pub monitor_status: Value,
}

/// Everything the dashboard renders. Sections whose data is unavailable are left out.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overview: Option<Overview>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle: Option<IdleSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apps: Option<AppsSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub switches: Option<SwitchesSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeline: Option<TimelineSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus: Option<FocusSection>,
    pub settings: SettingsSection,
    pub generated_at: String,
}

pub fn build_dashboard_payload(cfg: &Config, store: &MetricsStore) -> DashboardPayload {
    let table = match MetricsTable::load(cfg) {
        Ok(t) if !t.is_empty() => Some(t.clip_idle()),
        Ok(_) => None,
        Err(err) => {
            debug!("dashboard: metrics log unavailable: {err}");
            None
        }
    };
    let rows = table.as_ref().map(|t| t.rows.as_slice());

    DashboardPayload {
        overview: overview_section(cfg, store, rows),
        idle: rows.map(|r| idle_section(cfg, r)),
        apps: rows.map(apps_section),
        switches: switches_section(cfg, store, rows),
        timeline: rows.map(|r| timeline_section(cfg, r)),
        focus: rows.and_then(|r| focus_section(cfg, r)),
        settings: settings_section(cfg, store),
        generated_at: format_ts(OffsetDateTime::now_utc().to_offset(cfg.tz_offset)),
    }
}

fn num(row: &Map<String, Value>, key: &str) -> f64 {
    row.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

/// Hour-keyed artifact rows in hour order, each mapped with its `HH:MM` label.
fn hour_points<P>(
    cfg: &Config,
    store: &MetricsStore,
    artifact: Artifact,
    point: impl Fn(String, &Map<String, Value>) -> P,
) -> Option<Vec<P>> {
    let mut rows: Vec<(OffsetDateTime, Map<String, Value>)> = store
        .read_rows(artifact)?
        .into_iter()
        .filter_map(|row| {
            let hour = row.get("hour").and_then(Value::as_str)?;
            let ts = parse_timestamp(hour, cfg.tz_offset)?;
            Some((ts, row))
        })
        .collect();
    rows.sort_by_key(|(ts, _)| *ts);
    Some(
        rows.iter()
            .map(|(ts, row)| point(hhmm(*ts, cfg.tz_offset), row))
            .collect(),
    )
}

fn switch_points(cfg: &Config, store: &MetricsStore) -> Option<Vec<SwitchPoint>> {
    hour_points(cfg, store, Artifact::ContextSwitches, |name, row| SwitchPoint {
        name,
        switches: row.get("switches").and_then(Value::as_u64).unwrap_or(0),
    })
}

fn switches_config() -> ChartConfig {
    series(&[("switches", "Switches", CHART_1)])
}

fn overview_section(cfg: &Config, store: &MetricsStore, rows: Option<&[MetricsRecord]>) -> Option<Overview> {
    let summary = store.read(Artifact::ProductivitySummary);
    let hourly = hour_points(cfg, store, Artifact::HourlyProductivity, |name, row| HourlyPoint {
        name,
        productive: round2(num(row, "productive")),
        unproductive: round2(num(row, "unproductive")),
    });
    let switches = switch_points(cfg, store);
    if rows.is_none() && summary.is_none() && hourly.is_none() && switches.is_none() {
        return None;
    }

    let summary = summary.and_then(|v| v.as_object().cloned()).unwrap_or_default();
    let slices = [
        ("productive", "Productive", CHART_1),
        ("unproductive", "Unproductive", CHART_2),
        ("neutral", "Neutral", CHART_3),
        ("idle", "Idle", CHART_4),
    ]
    .into_iter()
    .filter_map(|(key, name, color)| {
        let value = round2(num(&summary, key));
        (value > 0.0 || key == "idle").then_some(Slice { name, value, color })
    })
    .collect();

    let weekly = rows
        .map(|r| {
            daily_productivity(r, cfg.tz_offset, WEEK_DAYS)
                .into_iter()
                .map(|d| WeeklyPoint {
                    name: d.day,
                    productivity: d.productivity,
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    Some(Overview {
        productivity_breakdown: Slices::new(slices),
        hourly_productivity: Chart {
            points: hourly.unwrap_or_default(),
            config: series(&[
                ("productive", "Productive", CHART_1),
                ("unproductive", "Unproductive", CHART_2),
            ]),
        },
        context_switch_trend: Chart {
            points: switches.unwrap_or_default(),
            config: switches_config(),
        },
        weekly_productivity: Chart {
            points: weekly,
            config: series(&[("productivity", "Productivity", CHART_2)]),
        },
    })
}

fn idle_section(cfg: &Config, rows: &[MetricsRecord]) -> IdleSection {
    let points = idle_minutes_by_hour(rows, cfg.tz_offset)
        .into_iter()
        .map(|(hour, idle_min)| IdlePoint {
            name: hhmm(hour, cfg.tz_offset),
            idle_min,
        })
        .collect();
    let active: f64 = rows.iter().map(|r| r.active_seconds).sum();

    IdleSection {
        idle_over_time: Chart {
            points,
            config: series(&[("idleMin", "Idle Minutes", CHART_4)]),
        },
        long_breaks: detect_breaks(rows, cfg.break_threshold_seconds),
        tracked_minutes: (active / 60.0).round() as u64,
    }
}

fn apps_section(rows: &[MetricsRecord]) -> AppsSection {
    let usage = app_usage(rows);
    let top = &usage[..usage.len().min(TOP_APPS)];

    let usage_points = top
        .iter()
        .map(|u| UsagePoint {
            name: u.app.clone(),
            time: u.active_minutes(),
            productivity: u.productive_pct,
        })
        .collect();
    let split_points = top
        .iter()
        .map(|u| AppSplitPoint {
            name: u.app.clone(),
            productive: minutes(u.productive_seconds),
            unproductive: minutes(u.unproductive_seconds),
        })
        .collect();
    let sessions = top
        .iter()
        .map(|u| SessionRow {
            app: u.app.clone(),
            total_time: u.active_minutes(),
            sessions: u.records,
            avg_session: u.avg_session_minutes,
            productivity: u.productive_pct,
        })
        .collect();

    let mut productive = 0.0;
    let mut unproductive = 0.0;
    let mut idle = 0.0;
    for r in rows {
        match r.label {
            ProductivityLabel::Productive => productive += r.active_seconds,
            ProductivityLabel::Unproductive => unproductive += r.active_seconds,
            ProductivityLabel::Neutral => {}
        }
        idle += r.idle_seconds;
    }

    AppsSection {
        usage_by_app: Chart {
            points: usage_points,
            config: series(&[
                ("time", "Time (minutes)", CHART_1),
                ("productivity", "Productivity", CHART_2),
            ]),
        },
        category_distribution: Slices::new(vec![
            Slice {
                name: "Productive",
                value: minutes(productive),
                color: CHART_1,
            },
            Slice {
                name: "Unproductive",
                value: minutes(unproductive),
                color: CHART_2,
            },
            Slice {
                name: "Idle",
                value: minutes(idle),
                color: CHART_4,
            },
        ]),
        productive_vs_unproductive: Chart {
            points: split_points,
            config: series(&[
                ("productive", "Productive", CHART_1),
                ("unproductive", "Unproductive", CHART_2),
            ]),
        },
        sessions,
    }
}

fn switches_section(cfg: &Config, store: &MetricsStore, rows: Option<&[MetricsRecord]>) -> Option<SwitchesSection> {
    let over_time = switch_points(cfg, store);
    if rows.is_none() && over_time.is_none() {
        return None;
    }
    let rows = rows.unwrap_or_default();

    let intensity = switches_by_hour(rows, cfg.tz_offset, SwitchGranularity::App)
        .into_iter()
        .map(|(hour, count)| CountPoint {
            name: hhmm(hour, cfg.tz_offset),
            count,
        })
        .collect();

    Some(SwitchesSection {
        switches_over_time: Chart {
            points: over_time.unwrap_or_default(),
            config: switches_config(),
        },
        switch_intensity: Chart {
            points: intensity,
            config: series(&[("count", "Switches", CHART_2)]),
        },
        top_pairs: top_transitions(rows, TOP_PAIRS),
    })
}

fn timeline_section(cfg: &Config, rows: &[MetricsRecord]) -> TimelineSection {
    let top = top_apps(&app_usage(rows), TOP_APPS);
    let points = stacked_timeline(rows, cfg.tz_offset, &top);

    let keys: BTreeSet<&String> = points
        .iter()
        .flat_map(|p| p.keys())
        .filter(|k| k.as_str() != "name")
        .collect();
    let palette = [CHART_1, CHART_2, CHART_3, CHART_4, CHART_5];
    let config = keys
        .into_iter()
        .zip(palette.iter().cycle())
        .map(|(key, color)| {
            (
                key.clone(),
                Series {
                    label: key.clone(),
                    color: *color,
                },
            )
        })
        .collect();

    TimelineSection {
        activity_events: activity_feed(rows, FEED_LIMIT),
        daily_timeline: Chart { points, config },
    }
}

fn focus_section(cfg: &Config, rows: &[MetricsRecord]) -> Option<FocusSection> {
    let sessions = focus_sessions(rows, cfg.focus_gap, cfg.poll_interval_seconds);
    if sessions.is_empty() {
        return None;
    }
    let distribution = session_histogram(&sessions);
    let recent = sessions[sessions.len().saturating_sub(RECENT_SESSIONS)..].to_vec();

    let trend = focus_score_by_hour(rows, cfg.tz_offset)
        .into_iter()
        .map(|(hour, focus)| FocusPoint {
            name: hhmm(hour, cfg.tz_offset),
            focus,
        })
        .collect();

    Some(FocusSection {
        sessions: recent,
        category_minutes: Chart {
            points: focus_minutes_by_app(rows, FOCUS_CATEGORIES),
            config: series(&[("minutes", "Focus minutes", CHART_1)]),
        },
        session_distribution: Chart {
            points: distribution,
            config: series(&[("sessions", "Sessions", CHART_1)]),
        },
        focus_score_trend: Chart {
            points: trend,
            config: series(&[("focus", "Focus score", CHART_2)]),
        },
        goal_minutes: cfg.goal_minutes,
    })
}

fn settings_section(cfg: &Config, store: &MetricsStore) -> SettingsSection {
    let monitor_status = store
        .read(Artifact::MonitorStatus)
        .filter(Value::is_object)
        .unwrap_or_else(|| Value::Object(Map::new()));
    SettingsSection {
        thresholds: Thresholds {
            poll_interval_seconds: cfg.poll_interval_seconds,
            lookback_minutes: cfg.lookback.whole_minutes(),
            lookahead_minutes: cfg.lookahead.whole_minutes(),
            break_threshold_seconds: cfg.break_threshold_seconds,
            focus_gap_minutes: cfg.focus_gap.whole_minutes(),
            streak_records: cfg.streak_records,
            goal_minutes: cfg.goal_minutes,
            heuristic_labels: cfg.heuristic_labels,
        },
        monitor_status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks;

    fn setup() -> (tempfile::TempDir, Config, MetricsStore) {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = Config::with_data_dir(tmp.path());
        let store = MetricsStore::new(tmp.path());
        (tmp, cfg, store)
    }

    fn activity_line(ts: &str, app: &str, window: &str, idle: f64) -> String {
        format!(
            "{{\"timestamp\":\"{ts}\",\"app_name\":\"{app}\",\"window_title\":\"{window}\",\"idle_seconds\":{idle}}}\n"
        )
    }

    #[test]
    fn empty_data_dir_yields_settings_only() {
        let (_tmp, cfg, store) = setup();
        let v = serde_json::to_value(build_dashboard_payload(&cfg, &store)).unwrap();
        let keys: Vec<_> = v.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["generatedAt".to_string(), "settings".to_string()]);
        assert_eq!(v["settings"]["monitorStatus"], serde_json::json!({}));
        assert_eq!(v["settings"]["thresholds"]["goalMinutes"], 180);
    }

    #[test]
    fn artifacts_alone_give_overview_and_switches() {
        let (_tmp, cfg, store) = setup();
        store
            .write(
                Artifact::ContextSwitches,
                &serde_json::json!([
                    {"hour": "2025-10-05T11:00:00Z", "switches": 2},
                    {"hour": "2025-10-05T10:00:00Z", "switches": 4},
                    {"hour": "garbage", "switches": 9}
                ]),
            )
            .unwrap();
        let payload = build_dashboard_payload(&cfg, &store);
        assert!(payload.idle.is_none() && payload.apps.is_none() && payload.focus.is_none());

        let overview = payload.overview.unwrap();
        let names: Vec<_> = overview.context_switch_trend.points.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["10:00", "11:00"]);
        // Idle is always sliced, other categories only when non-zero.
        assert_eq!(overview.productivity_breakdown.slices.len(), 1);
        assert_eq!(overview.productivity_breakdown.slices[0].name, "Idle");

        let switches = payload.switches.unwrap();
        assert_eq!(switches.switches_over_time.points[0].switches, 4);
        assert!(switches.switch_intensity.points.is_empty());
    }

    #[test]
    fn charts_clip_idle_but_the_summary_artifact_does_not() {
        let (_tmp, cfg, store) = setup();
        std::fs::write(
            cfg.metrics_log(),
            "{\"timestamp\":\"2025-10-05T10:00:00Z\",\"app_name\":\"A\",\"window_title\":\"w\",\"idle_seconds\":7200,\"productive\":null}\n",
        )
        .unwrap();
        tasks::productivity_summary_task(&cfg, &store).unwrap();

        let payload = build_dashboard_payload(&cfg, &store);
        let overview = payload.overview.unwrap();
        assert_eq!(overview.productivity_breakdown.slices[0].name, "Idle");
        assert_eq!(overview.productivity_breakdown.slices[0].value, 120.0);

        assert_eq!(payload.idle.unwrap().idle_over_time.points[0].idle_min, 60.0);
        let apps = payload.apps.unwrap();
        let idle = apps.category_distribution.slices.iter().find(|s| s.name == "Idle").unwrap();
        assert_eq!(idle.value, 60.0);
    }

    #[test]
    fn full_pipeline_fills_every_section() {
        let (_tmp, cfg, store) = setup();
        let mut activity = String::new();
        for m in 0..20 {
            activity.push_str(&activity_line(&format!("2025-10-05T10:{m:02}:00"), "Code", "main.rs", 0.0));
        }
        activity.push_str(&activity_line("2025-10-05T10:20:00", "Code", "main.rs", 700.0));
        activity.push_str(&activity_line("2025-10-05T10:21:00", "Chrome", "YouTube", 0.0));
        std::fs::write(cfg.activity_log(), activity).unwrap();
        std::fs::write(
            cfg.classification_log(),
            concat!(
                "{\"timestamp\":\"2025-10-05T10:05:00\",\"app_name\":\"Code\",\"window_title\":\"main.rs\",\"productive\":true}\n",
                "{\"timestamp\":\"2025-10-05T10:21:00\",\"app_name\":\"Chrome\",\"window_title\":\"YouTube\",\"productive\":false}\n",
            ),
        )
        .unwrap();

        tasks::reconcile_task(&cfg).unwrap();
        tasks::hourly_productivity_task(&cfg, &store).unwrap();
        tasks::context_switches_task(&cfg, &store).unwrap();
        tasks::productivity_summary_task(&cfg, &store).unwrap();
        tasks::monitor_task(&cfg, &store).unwrap();

        let payload = build_dashboard_payload(&cfg, &store);
        let v = serde_json::to_value(&payload).unwrap();
        for key in ["overview", "idle", "apps", "switches", "timeline", "focus", "settings"] {
            assert!(v.get(key).is_some(), "missing {key}");
        }

        assert_eq!(v["overview"]["hourlyProductivity"]["points"][0]["name"], "10:00");
        assert_eq!(v["idle"]["longBreaks"][0]["reason"], "Extended idle");
        assert_eq!(v["apps"]["usageByApp"]["points"][0]["name"], "Code");
        assert_eq!(v["switches"]["topPairs"][0]["from"], "Code");
        assert_eq!(v["switches"]["switchIntensity"]["points"][0]["count"], 1);
        assert_eq!(v["timeline"]["activityEvents"].as_array().unwrap().len(), 22);
        assert_eq!(v["focus"]["goalMinutes"], 180);
        assert_eq!(v["focus"]["sessions"][0]["app"], "Code");
        assert_eq!(v["focus"]["sessionDistribution"]["points"].as_array().unwrap().len(), 6);
        assert_eq!(v["settings"]["monitorStatus"]["unproductive_streak"], false);
    }
}
