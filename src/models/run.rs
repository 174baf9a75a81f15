use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Bid, Vod};
use crate::utils::serde_duration;

/// A runner, host, or commentator associated with a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Talent {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub stream: Option<String>,
    #[serde(default)]
    pub pronouns: Option<String>,
}

/// One scheduled speedrun entry as reported by the donation tracker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Run {
    pub id: i64,
    #[serde(rename = "eventId")]
    pub event_id: i64,
    pub name: String,
    #[serde(rename = "displayName", default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub console: Option<String>,
    /// Position within the event schedule; the tracker's explicit ordering.
    #[serde(default)]
    pub order: Option<i64>,
    #[serde(rename = "startTime", default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(
        rename = "runTime",
        with = "serde_duration",
        default = "Duration::zero"
    )]
    pub run_time: Duration,
    #[serde(
        rename = "setupTime",
        with = "serde_duration",
        default = "Duration::zero"
    )]
    pub setup_time: Duration,
    /// Row id in the alternate spreadsheet-like schedule, when known.
    #[serde(rename = "externalId", default)]
    pub external_id: Option<String>,
    #[serde(rename = "runnerIds", default)]
    pub runners: Vec<i64>,
    #[serde(rename = "hostIds", default)]
    pub hosts: Vec<i64>,
    #[serde(rename = "commentatorIds", default)]
    pub commentators: Vec<i64>,
    /// Upstream-confirmed VOD links.
    #[serde(rename = "videoLinks", default)]
    pub video_links: Vec<Vod>,
}

impl Run {
    /// Display title, falling back to the internal name.
    pub fn title(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }

    /// All talent ids referenced by this run.
    pub fn talent_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.runners
            .iter()
            .chain(self.hosts.iter())
            .chain(self.commentators.iter())
            .copied()
    }
}

/// The cached record for one run: the upstream run plus its bid subtree.
///
/// A `placeholder` record is synthesized for events whose upstream run list
/// is genuinely empty, so that subsequent requests stop re-hitting upstream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunRecord {
    pub run: Run,
    #[serde(default)]
    pub bids: Vec<Bid>,
    #[serde(default)]
    pub placeholder: bool,
}

impl RunRecord {
    pub fn new(run: Run, bids: Vec<Bid>) -> Self {
        Self {
            run,
            bids,
            placeholder: false,
        }
    }

    /// Placeholder "no runs known for this event" record.
    pub fn placeholder(event_id: i64) -> Self {
        Self {
            run: Run {
                id: -event_id,
                event_id,
                name: String::new(),
                display_name: None,
                category: None,
                console: None,
                order: None,
                start_time: None,
                run_time: Duration::zero(),
                setup_time: Duration::zero(),
                external_id: None,
                runners: Vec::new(),
                hosts: Vec::new(),
                commentators: Vec::new(),
                video_links: Vec::new(),
            },
            bids: Vec::new(),
            placeholder: true,
        }
    }
}

/// Fully reconciled per-run view, recomputed on every request and never
/// persisted. Timing invariants:
///
/// - `start_time = override.start ?? previous.end_time ?? upstream.start`
/// - `setup_time = previous? max(0, start_time - previous.end_time) : upstream`
/// - `end_time = start_time + run_time`
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RunData {
    pub run: Run,
    pub bids: Vec<Bid>,
    #[serde(rename = "startTime")]
    pub start_time: DateTime<Utc>,
    #[serde(rename = "endTime")]
    pub end_time: DateTime<Utc>,
    #[serde(rename = "runTime", with = "serde_duration")]
    pub run_time: Duration,
    #[serde(rename = "setupTime", with = "serde_duration")]
    pub setup_time: Duration,
    pub vods: Vec<Vod>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(id: i64) -> Run {
        Run {
            id,
            event_id: 1,
            name: format!("run {}", id),
            display_name: None,
            category: None,
            console: None,
            order: None,
            start_time: None,
            run_time: Duration::minutes(30),
            setup_time: Duration::minutes(10),
            external_id: None,
            runners: vec![1, 2],
            hosts: vec![3],
            commentators: vec![2],
            video_links: Vec::new(),
        }
    }

    #[test]
    fn test_talent_ids_spans_all_roles() {
        let ids: Vec<i64> = run(5).talent_ids().collect();
        assert_eq!(ids, vec![1, 2, 3, 2]);
    }

    #[test]
    fn test_run_serde_round_trip() {
        let r = run(7);
        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains("\"runTime\":\"0:30:00\""));
        let back: Run = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }

    #[test]
    fn test_placeholder_record() {
        let rec = RunRecord::placeholder(42);
        assert!(rec.placeholder);
        assert_eq!(rec.run.event_id, 42);
        assert_eq!(rec.run.id, -42);
    }
}
