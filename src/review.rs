use chrono::{DateTime, FixedOffset, NaiveDateTime, SecondsFormat};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// A rider's review of another participant on a ride.
///
/// Field names double as the wire and storage names. `comment` is always
/// encoded, as `null` when absent. `rating` also accepts integral floats and
/// numeric strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub review_id: String,
    pub ride_id: String,
    pub reviewer_id: String,
    pub reviewee_id: String,
    #[serde(deserialize_with = "lax_integer")]
    pub rating: i64,
    #[serde(default)]
    pub comment: Option<String>,
    pub created_at: Timestamp,
}

/// ISO-8601 timestamp that keeps the offset it was written with, or none
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timestamp {
    Offset(DateTime<FixedOffset>),
    Naive(NaiveDateTime),
}

impl FromStr for Timestamp {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match DateTime::parse_from_rfc3339(s) {
            Ok(dt) => Ok(Timestamp::Offset(dt)),
            Err(offset_err) => s
                .parse::<NaiveDateTime>()
                .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
                .map(Timestamp::Naive)
                .map_err(|_| offset_err),
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timestamp::Offset(dt) => f.write_str(&dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Timestamp::Naive(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S%.f")),
        }
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse()
            .map_err(|e| de::Error::custom(format!("invalid datetime '{}': {}", raw, e)))
    }
}

fn lax_integer<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    struct LaxInteger;

    impl Visitor<'_> for LaxInteger {
        type Value = i64;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("an integer")
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<i64, E> {
            Ok(v)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<i64, E> {
            i64::try_from(v).map_err(|_| E::custom(format!("integer {} out of range", v)))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<i64, E> {
            if v.fract() == 0.0 && v >= i64::MIN as f64 && v < i64::MAX as f64 {
                Ok(v as i64)
            } else {
                Err(E::custom(format!("expected an integer, got {}", v)))
            }
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<i64, E> {
            v.trim()
                .parse()
                .map_err(|_| E::custom(format!("expected an integer, got '{}'", v)))
        }
    }

    deserializer.deserialize_any(LaxInteger)
}

impl Review {
    /// Validate a decoded storage document
    pub fn from_document(data: Map<String, Value>) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(data))
    }

    /// Encode for storage
    pub fn to_document(&self) -> Map<String, Value> {
        let mut doc = Map::new();
        doc.insert("review_id".into(), Value::from(self.review_id.as_str()));
        doc.insert("ride_id".into(), Value::from(self.ride_id.as_str()));
        doc.insert("reviewer_id".into(), Value::from(self.reviewer_id.as_str()));
        doc.insert("reviewee_id".into(), Value::from(self.reviewee_id.as_str()));
        doc.insert("rating".into(), Value::from(self.rating));
        doc.insert(
            "comment".into(),
            self.comment.as_deref().map_or(Value::Null, Value::from),
        );
        doc.insert("created_at".into(), Value::from(self.created_at.to_string()));
        doc
    }
}
