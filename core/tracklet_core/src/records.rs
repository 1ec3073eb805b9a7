use serde::{Serialize, Serializer};
use serde_json::Value;
use time::{OffsetDateTime, UtcOffset};

use crate::normalize::{coerce_productive, format_ts, parse_timestamp_value};

/// One poll-interval sample from the window/idle poller.
#[derive(Clone, Debug, PartialEq)]
pub struct ActivityRecord {
    pub ts: OffsetDateTime,
    pub app_name: String,
    pub window_title: String,
    pub idle_seconds: f64,
}

impl ActivityRecord {
    /// `None` for lines missing a parseable timestamp or an app name.
    pub fn from_json(v: &Value, local: UtcOffset) -> Option<Self> {
        let ts = parse_timestamp_value(v.get("timestamp"), local)?;
        let app_name = v.get("app_name")?.as_str()?.to_string();
        let window_title = v
            .get("window_title")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let idle_seconds = idle_from_json(v.get("idle_seconds"));
        Some(ActivityRecord {
            ts,
            app_name,
            window_title,
            idle_seconds,
        })
    }
}

/// Missing or non-numeric idle counts as zero; negative values clamp to zero.
pub fn idle_from_json(v: Option<&Value>) -> f64 {
    let raw = match v {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    if raw.is_finite() {
        raw.max(0.0)
    } else {
        0.0
    }
}

/// One screenshot-derived judgment from the classifier.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassificationRecord {
    pub ts: OffsetDateTime,
    pub app_name: String,
    pub window_title: String,
    pub productive: Option<bool>,
}

impl ClassificationRecord {
    pub fn from_json(v: &Value, local: UtcOffset) -> Option<Self> {
        let ts = parse_timestamp_value(v.get("timestamp"), local)?;
        let text = |key: &str| {
            v.get(key)
                .and_then(Value::as_str)
                .map(|s| s.to_string())
                .unwrap_or_else(|| "unknown".to_string())
        };
        Some(ClassificationRecord {
            ts,
            app_name: text("app_name"),
            window_title: text("window_title"),
            productive: v.get("productive").and_then(coerce_productive),
        })
    }
}

/// Resolved productivity of a metrics record. Serialized as `true`, `false` or `"unknown"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Productive {
    Yes,
    No,
    Unknown,
}

impl Productive {
    pub fn from_option(v: Option<bool>) -> Self {
        match v {
            Some(true) => Productive::Yes,
            Some(false) => Productive::No,
            None => Productive::Unknown,
        }
    }

    /// Label implied by a resolved value; `None` while unknown.
    pub fn label(self) -> Option<ProductivityLabel> {
        match self {
            Productive::Yes => Some(ProductivityLabel::Productive),
            Productive::No => Some(ProductivityLabel::Unproductive),
            Productive::Unknown => None,
        }
    }
}

impl Serialize for Productive {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            Productive::Yes => s.serialize_bool(true),
            Productive::No => s.serialize_bool(false),
            Productive::Unknown => s.serialize_str("unknown"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductivityLabel {
    Productive,
    Unproductive,
    Neutral,
}

/// A labeled activity record: one line of MetricsLog.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricsRecord {
    pub ts: OffsetDateTime,
    pub app_name: String,
    pub window_title: String,
    pub idle_seconds: f64,
    pub productive: Productive,
    pub active_seconds: f64,
    pub label: ProductivityLabel,
    pub source_app_name: Option<String>,
    pub source_window_title: Option<String>,
}

/// `poll_interval − min(idle, poll_interval)`, never negative.
pub fn active_seconds(idle_seconds: f64, poll_interval: f64) -> f64 {
    (poll_interval - idle_seconds.max(0.0).min(poll_interval)).max(0.0)
}

#[derive(Serialize)]
struct MetricsLine<'a> {
    timestamp: String,
    app_name: &'a str,
    window_title: &'a str,
    idle_seconds: f64,
    productive: Productive,
    active_seconds: f64,
    productivity_label: ProductivityLabel,
    source_app_name: Option<&'a str>,
    source_window_title: Option<&'a str>,
}

impl MetricsRecord {
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(&MetricsLine {
            timestamp: format_ts(self.ts),
            app_name: &self.app_name,
            window_title: &self.window_title,
            idle_seconds: self.idle_seconds,
            productive: self.productive,
            active_seconds: self.active_seconds,
            productivity_label: self.label,
            source_app_name: self.source_app_name.as_deref(),
            source_window_title: self.source_window_title.as_deref(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn activity_defaults_and_rejections() {
        let utc = UtcOffset::UTC;
        let r = ActivityRecord::from_json(
            &json!({"timestamp": "2025-10-05T10:00:00", "app_name": "Code"}),
            utc,
        )
        .unwrap();
        assert_eq!(r.window_title, "");
        assert_eq!(r.idle_seconds, 0.0);

        let r = ActivityRecord::from_json(
            &json!({"timestamp": "2025-10-05T10:00:00", "app_name": "Code", "idle_seconds": -4}),
            utc,
        )
        .unwrap();
        assert_eq!(r.idle_seconds, 0.0);

        assert!(ActivityRecord::from_json(&json!({"timestamp": "2025-10-05T10:00:00"}), utc).is_none());
        assert!(ActivityRecord::from_json(&json!({"timestamp": "bad", "app_name": "x"}), utc).is_none());
    }

    #[test]
    fn classification_tolerates_partial_classifier_output() {
        let r = ClassificationRecord::from_json(
            &json!({"timestamp": "2025-10-05T10:00:00", "productive": "yes"}),
            UtcOffset::UTC,
        )
        .unwrap();
        assert_eq!(r.app_name, "unknown");
        assert_eq!(r.window_title, "unknown");
        assert_eq!(r.productive, Some(true));

        let r = ClassificationRecord::from_json(
            &json!({"timestamp": "2025-10-05T10:00:00", "app_name": "Slack", "productive": null}),
            UtcOffset::UTC,
        )
        .unwrap();
        assert_eq!(r.productive, None);
    }

    #[test]
    fn active_seconds_is_bounded_by_the_poll_interval() {
        assert_eq!(active_seconds(0.0, 60.0), 60.0);
        assert_eq!(active_seconds(15.0, 60.0), 45.0);
        assert_eq!(active_seconds(650.0, 60.0), 0.0);
        assert_eq!(active_seconds(-3.0, 60.0), 60.0);
        for idle in [0.0, 1.5, 30.25, 60.0, 61.0, 3600.0] {
            let a = active_seconds(idle, 60.0);
            assert!((0.0..=60.0).contains(&a));
            assert_eq!(a + idle.min(60.0), 60.0);
        }
    }

    #[test]
    fn metrics_line_shape() {
        let ts = crate::normalize::parse_timestamp("2025-10-05T10:00:00Z", UtcOffset::UTC).unwrap();
        let rec = MetricsRecord {
            ts,
            app_name: "Code".into(),
            window_title: "main.rs".into(),
            idle_seconds: 0.0,
            productive: Productive::Unknown,
            active_seconds: 60.0,
            label: ProductivityLabel::Neutral,
            source_app_name: None,
            source_window_title: None,
        };
        let v: Value = serde_json::from_str(&rec.to_json_line().unwrap()).unwrap();
        assert_eq!(v["timestamp"], "2025-10-05T10:00:00Z");
        assert_eq!(v["productive"], "unknown");
        assert_eq!(v["productivity_label"], "neutral");
        assert_eq!(v["source_app_name"], Value::Null);
    }
}
