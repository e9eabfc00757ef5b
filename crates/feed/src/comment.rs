use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::count_from_any;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    #[serde(deserialize_with = "count_from_any")]
    pub id: u64,
    pub text: String,
    pub author: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(deserialize_with = "timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_own_comment: bool,
}

// The comments table stores naive UTC datetimes; newer endpoints send RFC 3339.
fn timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(d)?;
    parse_timestamp(&raw).ok_or_else(|| serde::de::Error::custom(format!("bad timestamp {raw:?}")))
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").ok().map(|n| n.and_utc())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelativeAge {
    Seconds(i64),
    Minutes(i64),
    Hours(i64),
    Days(i64),
}

/// Buckets the age of `ts` relative to `now`, rounding each unit like a relative-time formatter does.
pub fn relative_age(ts: DateTime<Utc>, now: DateTime<Utc>) -> RelativeAge {
    let seconds = ((now - ts).num_milliseconds() as f64 / 1000.0).round();
    let minutes = (seconds / 60.0).round();
    let hours = (minutes / 60.0).round();
    let days = (hours / 24.0).round();
    if seconds < 60.0 {
        RelativeAge::Seconds(seconds as i64)
    } else if minutes < 60.0 {
        RelativeAge::Minutes(minutes as i64)
    } else if hours < 24.0 {
        RelativeAge::Hours(hours as i64)
    } else {
        RelativeAge::Days(days as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn accepts_both_timestamp_shapes() {
        let a: Comment = serde_json::from_value(json!({
            "id": "12", "text": "hi", "author": "bo", "avatar": "", "timestamp": "2024-03-01 10:00:00", "isOwnComment": true
        }))
        .unwrap();
        let b = parse_timestamp("2024-03-01T10:00:00Z").unwrap();
        assert_eq!(a.timestamp, b);
        assert_eq!(a.id, 12);
        assert!(a.is_own_comment);
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn relative_age_buckets() {
        let now = parse_timestamp("2024-03-02T00:00:00Z").unwrap();
        assert_eq!(relative_age(now - Duration::seconds(20), now), RelativeAge::Seconds(20));
        assert_eq!(relative_age(now - Duration::minutes(5), now), RelativeAge::Minutes(5));
        assert_eq!(relative_age(now - Duration::hours(3), now), RelativeAge::Hours(3));
        assert_eq!(relative_age(now - Duration::days(4), now), RelativeAge::Days(4));
    }
}
