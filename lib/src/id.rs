//! The `Id` format shared by every entity: a creation timestamp plus a
//! monotonic per-store sequence, so that sorting by `Id` sorts by creation
//! time with ties broken by sequence (§3 Invariant 1).
//!
//! Format: `YYYYMMDDTHHMMSSsss_<16-hex-sequence>`. Do not change the
//! timestamp format without a migration (§9) — `GetFromDateRange` depends on
//! being able to widen a timestamp range and still parse every Id in it.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use std::fmt;
use std::str::FromStr;

const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%3f";

/// Maximum allowed divergence between a Task's Id timestamp and its
/// `Created` field (§3: "created-time skew tolerance of 6 minutes").
pub const TASK_ID_SKEW: chrono::Duration = chrono::Duration::minutes(6);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id {
    pub timestamp: DateTime<Utc>,
    pub sequence: u64,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid id: {0}")]
pub struct InvalidId(pub String);

impl Id {
    pub fn new(timestamp: DateTime<Utc>, sequence: u64) -> Self {
        // Truncate to millisecond precision: that's all the wire format carries.
        let truncated = truncate_to_millis(timestamp);
        Id {
            timestamp: truncated,
            sequence,
        }
    }

    /// Is this Id's timestamp within the allowed skew of `created`? Only
    /// meaningful for Task ids (§3); Job ids require an exact match.
    pub fn within_skew_of(&self, created: DateTime<Utc>, skew: chrono::Duration) -> bool {
        let diff = self.timestamp - created;
        diff <= skew && diff >= -skew
    }
}

/// Mints fresh `Id`s for a single process: the sequence only has to be
/// unique among ids sharing the same millisecond, so a process-local atomic
/// counter is enough (collisions across processes are caught by the store's
/// primary-key constraint on write).
#[derive(Default)]
pub struct IdGen(std::sync::atomic::AtomicU64);

impl IdGen {
    pub fn next(&self, now: DateTime<Utc>) -> Id {
        let seq = self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        Id::new(now, seq)
    }
}

fn truncate_to_millis(t: DateTime<Utc>) -> DateTime<Utc> {
    let millis = t.timestamp_millis();
    Utc.timestamp_millis_opt(millis).single().unwrap_or(t)
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{:016x}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.sequence
        )
    }
}

impl FromStr for Id {
    type Err = InvalidId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ts_part, seq_part) = s
            .split_once('_')
            .ok_or_else(|| InvalidId(s.to_string()))?;

        if seq_part.len() != 16 || !seq_part.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(InvalidId(s.to_string()));
        }
        let sequence = u64::from_str_radix(seq_part, 16).map_err(|_| InvalidId(s.to_string()))?;

        let naive = NaiveDateTime::parse_from_str(ts_part, TIMESTAMP_FORMAT)
            .map_err(|_| InvalidId(s.to_string()))?;
        let timestamp = Utc.from_utc_datetime(&naive);

        Ok(Id { timestamp, sequence })
    }
}

impl serde::Serialize for Id {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for Id {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl utoipa::ToSchema<'static> for Id {
    fn schema() -> (
        &'static str,
        utoipa::openapi::RefOr<utoipa::openapi::Schema>,
    ) {
        (
            "Id",
            utoipa::openapi::ObjectBuilder::new()
                .schema_type(utoipa::openapi::SchemaType::String)
                .example(Some(serde_json::json!("20060102T150405000_0000000000000001")))
                .into(),
        )
    }
}
