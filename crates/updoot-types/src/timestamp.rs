/// Timestamps cross the wire as stringified milliseconds since the Unix epoch.
/// The same string is what clients send back as a feed cursor.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serializer};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid millisecond timestamp: {0:?}")]
pub struct InvalidTimestamp(pub String);

pub fn to_millis_string(ts: &DateTime<Utc>) -> String {
    ts.timestamp_millis().to_string()
}

pub fn parse_millis(raw: &str) -> Result<DateTime<Utc>, InvalidTimestamp> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .ok_or_else(|| InvalidTimestamp(raw.to_string()))
}

/// `#[serde(with = "updoot_types::timestamp::millis_string")]`
pub mod millis_string {
    use super::*;

    pub fn serialize<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&to_millis_string(ts))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse_millis(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_string_is_epoch_millis() {
        let ts = DateTime::from_timestamp_millis(1_642_505_009_184).unwrap();
        assert_eq!(to_millis_string(&ts), "1642505009184");
        assert_eq!(parse_millis("1642505009184"), Ok(ts));
    }

    #[test]
    fn garbage_cursor_is_rejected() {
        assert!(parse_millis("yesterday").is_err());
        assert!(parse_millis("").is_err());
    }
}
