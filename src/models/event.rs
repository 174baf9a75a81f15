use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single marathon occurrence as reported by the donation tracker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub id: i64,
    /// Short name used in URLs and lookups, e.g. `"sgdq2024"`.
    #[serde(rename = "short")]
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(rename = "startTime", default)]
    pub start_time: Option<DateTime<Utc>>,
    /// External id of the event in the alternate schedule source, when one
    /// exists for this event.
    #[serde(rename = "externalId", default)]
    pub external_id: Option<String>,
}

impl Event {
    pub fn normalized_slug(&self) -> String {
        self.slug.to_ascii_lowercase()
    }
}

/// Derived event view exposed to callers: the upstream event plus schedule
/// timing and the started/ended state from the event override record.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EventData {
    pub event: Event,
    #[serde(rename = "startTime")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(rename = "endTime")]
    pub end_time: Option<DateTime<Utc>>,
    pub started: bool,
    pub ended: bool,
}
