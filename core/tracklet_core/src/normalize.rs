use serde_json::Value;
use time::{
    format_description::well_known::{Iso8601, Rfc3339},
    Date, Duration, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset,
};

/// Parse an ISO-8601 timestamp. Zoned inputs keep their offset; naive inputs are
/// local wall-clock time in `local` (no UTC shift). Returns `None` when unparseable.
pub fn parse_timestamp(raw: &str, local: UtcOffset) -> Option<OffsetDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    // Accept "YYYY-MM-DD HH:MM:SS" as well as the T separator.
    let spaced;
    let s = if s.len() > 10 && s.as_bytes()[10] == b' ' {
        spaced = format!("{}T{}", &s[..10], &s[11..]);
        spaced.as_str()
    } else {
        s
    };

    if let Ok(t) = OffsetDateTime::parse(s, &Rfc3339) {
        return Some(t);
    }
    if let Ok(t) = OffsetDateTime::parse(s, &Iso8601::DEFAULT) {
        return Some(t);
    }
    PrimitiveDateTime::parse(s, &Iso8601::DEFAULT)
        .ok()
        .map(|t| t.assume_offset(local))
}

pub fn parse_timestamp_value(v: Option<&Value>, local: UtcOffset) -> Option<OffsetDateTime> {
    v.and_then(Value::as_str)
        .and_then(|s| parse_timestamp(s, local))
}

fn floor_to(ts: OffsetDateTime, local: UtcOffset, keep_minutes: bool) -> OffsetDateTime {
    let t = ts.to_offset(local);
    let minutes = i64::from(t.hour()) * 60 + if keep_minutes { i64::from(t.minute()) } else { 0 };
    t.replace_time(Time::MIDNIGHT) + Duration::minutes(minutes)
}

/// Drop seconds and sub-seconds, in the local offset.
pub fn floor_to_minute(ts: OffsetDateTime, local: UtcOffset) -> OffsetDateTime {
    floor_to(ts, local, true)
}

/// HourBucket key: the local hour containing `ts`.
pub fn hour_bucket(ts: OffsetDateTime, local: UtcOffset) -> OffsetDateTime {
    floor_to(ts, local, false)
}

pub fn local_day(ts: OffsetDateTime, local: UtcOffset) -> Date {
    ts.to_offset(local).date()
}

pub fn format_ts(ts: OffsetDateTime) -> String {
    ts.format(&Rfc3339).unwrap_or_default()
}

/// "HH:MM" chart label in the local offset.
pub fn hhmm(ts: OffsetDateTime, local: UtcOffset) -> String {
    let t = ts.to_offset(local);
    format!("{:02}:{:02}", t.hour(), t.minute())
}

/// Boolean-ish coercion for `productive` values crossing a serialization boundary.
pub fn coerce_productive(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Dashboard read path variant: also understands label words.
pub fn coerce_productive_lenient(v: &Value) -> Option<bool> {
    if let Value::String(s) = v {
        match s.trim().to_lowercase().as_str() {
            "productive" => return Some(true),
            "unproductive" => return Some(false),
            _ => {}
        }
    }
    coerce_productive(v)
}

pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

pub fn minutes(seconds: f64) -> f64 {
    round2(seconds / 60.0)
}

pub fn tz_offset_from_minutes(minutes: i32) -> UtcOffset {
    UtcOffset::from_whole_seconds(minutes.saturating_mul(60)).unwrap_or(UtcOffset::UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn plus2() -> UtcOffset {
        tz_offset_from_minutes(120)
    }

    #[test]
    fn naive_timestamps_are_local_wall_clock() {
        let t = parse_timestamp("2025-10-05T10:15:30", plus2()).unwrap();
        assert_eq!(t.offset(), plus2());
        assert_eq!((t.hour(), t.minute(), t.second()), (10, 15, 30));

        let spaced = parse_timestamp("2025-10-05 10:15:30", plus2()).unwrap();
        assert_eq!(spaced, t);

        let frac = parse_timestamp("2025-10-05T10:15:30.250000", plus2()).unwrap();
        assert_eq!(frac.millisecond(), 250);
    }

    #[test]
    fn zoned_timestamps_keep_their_instant() {
        let t = parse_timestamp("2025-10-05T08:00:00Z", plus2()).unwrap();
        assert_eq!(t.offset(), UtcOffset::UTC);
        assert_eq!(hour_bucket(t, plus2()).hour(), 10);

        let t = parse_timestamp("2025-10-05T10:00:00+02:00", UtcOffset::UTC).unwrap();
        assert_eq!(t.to_offset(UtcOffset::UTC).hour(), 8);
    }

    #[test]
    fn malformed_timestamps_are_rejected() {
        for raw in ["", "   ", "yesterday", "2025-13-40T99:00:00", "10:00"] {
            assert!(parse_timestamp(raw, UtcOffset::UTC).is_none(), "{raw}");
        }
        assert!(parse_timestamp_value(Some(&json!(12)), UtcOffset::UTC).is_none());
        assert!(parse_timestamp_value(None, UtcOffset::UTC).is_none());
    }

    #[test]
    fn floors_in_local_offset() {
        let t = parse_timestamp("2025-10-05T23:59:59.900Z", plus2()).unwrap();
        let m = floor_to_minute(t, plus2());
        assert_eq!(format_ts(m), "2025-10-06T01:59:00+02:00");
        assert_eq!(format_ts(hour_bucket(t, plus2())), "2025-10-06T01:00:00+02:00");
        assert_eq!(local_day(t, plus2()).to_string(), "2025-10-06");
        assert_eq!(hhmm(t, plus2()), "01:59");
    }

    #[test]
    fn productive_coercion() {
        assert_eq!(coerce_productive(&json!(true)), Some(true));
        assert_eq!(coerce_productive(&json!(false)), Some(false));
        assert_eq!(coerce_productive(&json!(1)), Some(true));
        assert_eq!(coerce_productive(&json!(0)), Some(false));
        assert_eq!(coerce_productive(&json!(" YES ")), Some(true));
        assert_eq!(coerce_productive(&json!("No")), Some(false));
        assert_eq!(coerce_productive(&json!("0")), Some(false));
        assert_eq!(coerce_productive(&json!("unknown")), None);
        assert_eq!(coerce_productive(&json!("productive")), None);
        assert_eq!(coerce_productive(&Value::Null), None);
        assert_eq!(coerce_productive(&json!({"a": 1})), None);

        assert_eq!(coerce_productive_lenient(&json!("Productive")), Some(true));
        assert_eq!(coerce_productive_lenient(&json!("unproductive")), Some(false));
        assert_eq!(coerce_productive_lenient(&json!("maybe")), None);
    }

    #[test]
    fn rounding() {
        assert_eq!(round2(66.666_666), 66.67);
        assert_eq!(round2(0.125), 0.13);
        assert_eq!(minutes(90.0), 1.5);
        assert_eq!(tz_offset_from_minutes(-300).whole_minutes(), -300);
    }
}
