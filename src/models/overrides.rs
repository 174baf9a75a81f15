use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Vod;
use crate::utils::serde_opt_duration;

/// Locally-stored corrections and additions for one run, layered onto
/// upstream data without mutating the upstream source.
///
/// A record is created lazily on first lookup by either foreign id. Two
/// records later discovered to describe the same run are merged by the
/// override store; `created_at` decides precedence on conflicting scalars.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunOverride {
    /// Storage id, derived from whichever foreign id the record was first
    /// created under. Lookups never use it directly.
    pub id: String,
    #[serde(rename = "trackerId", default)]
    pub tracker_id: Option<i64>,
    #[serde(rename = "horaroId", default)]
    pub horaro_id: Option<String>,
    #[serde(rename = "startTime", default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(rename = "runTime", with = "serde_opt_duration", default)]
    pub run_time: Option<Duration>,
    #[serde(default)]
    pub vods: Vec<Vod>,
    #[serde(rename = "redditVodsFinalized", default)]
    pub reddit_vods_finalized: bool,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl RunOverride {
    pub fn new(tracker_id: Option<i64>, horaro_id: Option<String>) -> Self {
        let id = match (tracker_id, horaro_id.as_deref()) {
            (Some(t), _) => format!("trk-{}", t),
            (None, Some(h)) => format!("hor-{}", h),
            (None, None) => String::new(),
        };
        Self {
            id,
            tracker_id,
            horaro_id,
            start_time: None,
            run_time: None,
            vods: Vec::new(),
            reddit_vods_finalized: false,
            created_at: Utc::now(),
        }
    }
}

/// Per-event override record, mutated by the state-transition hook as the
/// event crosses into "started" and "ended".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventOverride {
    /// The event slug.
    pub id: String,
    #[serde(rename = "startedAt", default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(rename = "endedAt", default)]
    pub ended_at: Option<DateTime<Utc>>,
    /// One-time monotonic flag: set once the community VOD list has been
    /// merged in after finalization, never reset.
    #[serde(rename = "redditMergedIn", default)]
    pub reddit_merged_in: bool,
}

impl EventOverride {
    pub fn new(slug: impl Into<String>) -> Self {
        Self {
            id: slug.into(),
            started_at: None,
            ended_at: None,
            reddit_merged_in: false,
        }
    }
}
