use chrono::{DateTime, Datelike, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::Coordinate;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdventureId(pub String);

impl AdventureId {
    pub fn generate() -> Self {
        AdventureId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AdventureId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A place the user stayed at long enough to be prompted about.
///
/// Adventures are values: once built, nothing about them changes. The fields
/// are only reachable through accessors.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Adventure {
    id: AdventureId,
    name: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    timestamp: DateTime<Utc>,
    #[serde(with = "base64_blobs", default)]
    attachments: Vec<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    address: Option<String>,
    #[serde(flatten)]
    coordinate: Coordinate,
}

impl Adventure {
    /// Build an adventure with an explicit id.
    ///
    /// The timestamp is truncated to millisecond precision so the record
    /// survives a round trip through its persisted form unchanged.
    pub fn new(
        id: AdventureId,
        name: String,
        coordinate: Coordinate,
        timestamp: DateTime<Utc>,
        attachments: Vec<Vec<u8>>,
        address: Option<String>,
    ) -> Self {
        let timestamp =
            DateTime::from_timestamp_millis(timestamp.timestamp_millis()).unwrap_or(timestamp);
        Self {
            id,
            name,
            timestamp,
            attachments,
            address,
            coordinate,
        }
    }

    pub fn id(&self) -> &AdventureId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn coordinate(&self) -> Coordinate {
        self.coordinate
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn attachments(&self) -> &[Vec<u8>] {
        &self.attachments
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    /// Apply the naming rules to a record that came from outside, such as a
    /// persisted snapshot or an import: blank names take `default_name` and
    /// blank addresses become absent.
    pub fn normalized(mut self, default_name: &str) -> Self {
        self.name = normalize_name(&self.name, default_name);
        self.address = self.address.filter(|a| !a.trim().is_empty());
        self
    }

    /// Calendar (year, month) of the timestamp in the given offset.
    pub fn year_month(&self, offset: &FixedOffset) -> (i32, u32) {
        let local = self.timestamp.with_timezone(offset);
        (local.year(), local.month())
    }
}

/// Trim a user-supplied name, falling back to `default_name` when blank.
pub fn normalize_name(name: &str, default_name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        default_name.to_string()
    } else {
        trimmed.to_string()
    }
}

/// A single location sample from the location source.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LocationFix {
    pub coordinate: Coordinate,
    /// Horizontal accuracy radius in meters; negative means invalid.
    pub accuracy_m: f64,
    pub timestamp: DateTime<Utc>,
}

impl LocationFix {
    pub fn new(coordinate: Coordinate, accuracy_m: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            coordinate,
            accuracy_m,
            timestamp,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, uniffi::Enum)]
pub enum TimeFormat {
    HhMmSs,
    MmSs,
}

impl TimeFormat {
    /// Render a whole number of seconds. Negative values clamp to zero.
    ///
    /// `MmSs` lets minutes exceed 59 rather than dropping hours.
    pub fn format_secs(&self, secs: i64) -> String {
        let secs = secs.max(0);
        match self {
            TimeFormat::HhMmSs => {
                format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
            }
            TimeFormat::MmSs => format!("{:02}:{:02}", secs / 60, secs % 60),
        }
    }
}

/// Attachments are persisted as base64 strings.
mod base64_blobs {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(blobs: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(blobs.len()))?;
        for blob in blobs {
            seq.serialize_element(&STANDARD.encode(blob))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = Vec::<String>::deserialize(deserializer)?;
        encoded
            .iter()
            .map(|e| STANDARD.decode(e).map_err(serde::de::Error::custom))
            .collect()
    }
}
