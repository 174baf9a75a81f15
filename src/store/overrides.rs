//! Override records: per-run and per-event corrections, independent of
//! the cache, keyed by one of two possible foreign ids.
//!
//! A run override may first be created under its tracker id, its alternate
//! schedule (horaro) row id, or both. When a later fetch supplies both ids
//! at once and they resolve to two distinct records, the records are merged
//! into one reachable by either id.

use std::path::Path;

use anyhow::Result;
use tracing::{debug, warn};

use crate::models::{EventOverride, RunOverride};
use crate::store::{ObjectStore, StoredObject};

impl StoredObject for RunOverride {
    fn object_id(&self) -> &str {
        &self.id
    }
}

impl StoredObject for EventOverride {
    fn object_id(&self) -> &str {
        &self.id
    }
}

pub struct OverrideStore {
    runs: ObjectStore<RunOverride>,
    events: ObjectStore<EventOverride>,
}

impl OverrideStore {
    pub fn open(dir: &Path) -> Result<Self> {
        Ok(Self {
            runs: ObjectStore::open(dir, "run_overrides")?,
            events: ObjectStore::open(dir, "event_overrides")?,
        })
    }

    /// Get or lazily create the override record for a run, looked up by
    /// tracker id first, then horaro id. Returns `None` only when neither
    /// id is known.
    ///
    /// A newly-learned id is filled onto an existing record; a known id is
    /// never overwritten. If the two ids resolve to distinct records, the
    /// records are merged (see `merge`).
    pub fn run_override(
        &self,
        tracker_id: Option<i64>,
        horaro_id: Option<&str>,
    ) -> Option<RunOverride> {
        if tracker_id.is_none() && horaro_id.is_none() {
            return None;
        }

        let by_tracker = tracker_id.and_then(|tid| {
            self.runs
                .find(|o| o.tracker_id == Some(tid))
                .into_iter()
                .next()
        });
        let by_horaro = horaro_id.and_then(|hid| {
            self.runs
                .find(|o| o.horaro_id.as_deref() == Some(hid))
                .into_iter()
                .next()
        });

        match (by_tracker, by_horaro) {
            (Some(a), Some(b)) if a.id == b.id => Some(a),
            (Some(a), Some(b)) => Some(self.merge(a, b)),
            (Some(mut rec), None) => {
                if rec.horaro_id.is_none() {
                    if let Some(hid) = horaro_id {
                        rec.horaro_id = Some(hid.to_string());
                        self.runs.update(rec.clone());
                    }
                }
                Some(rec)
            }
            (None, Some(mut rec)) => {
                if rec.tracker_id.is_none() {
                    if let Some(tid) = tracker_id {
                        rec.tracker_id = Some(tid);
                        self.runs.update(rec.clone());
                    }
                }
                Some(rec)
            }
            (None, None) => {
                let rec = RunOverride::new(tracker_id, horaro_id.map(|s| s.to_string()));
                self.runs.insert(rec.clone());
                Some(rec)
            }
        }
    }

    /// Converge two records that describe the same run. Scalars take the
    /// non-null value, preferring the earlier-created record on conflict;
    /// VOD lists concatenate with semantic de-duplication; the later record
    /// is deleted. Merging an already-merged pair is a no-op because both
    /// lookups then resolve to the surviving record.
    fn merge(&self, a: RunOverride, b: RunOverride) -> RunOverride {
        let (mut keep, other) = if a.created_at <= b.created_at {
            (a, b)
        } else {
            (b, a)
        };
        debug!(keep = %keep.id, drop = %other.id, "Merging duplicate run overrides");

        if keep.tracker_id.is_none() {
            keep.tracker_id = other.tracker_id;
        } else if other.tracker_id.is_some() && keep.tracker_id != other.tracker_id {
            warn!(keep = %keep.id, drop = %other.id,
                  "Conflicting tracker ids on merge; keeping earlier record's");
        }
        if keep.horaro_id.is_none() {
            keep.horaro_id = other.horaro_id.clone();
        }
        if keep.start_time.is_none() {
            keep.start_time = other.start_time;
        }
        if keep.run_time.is_none() {
            keep.run_time = other.run_time;
        }
        for vod in other.vods {
            if !keep.vods.contains(&vod) {
                keep.vods.push(vod);
            }
        }
        keep.reddit_vods_finalized = keep.reddit_vods_finalized || other.reddit_vods_finalized;

        self.runs.delete(&other.id);
        self.runs.update(keep.clone());
        keep
    }

    pub fn update_run(&self, record: RunOverride) {
        self.runs.update(record);
    }

    /// Get or lazily create the override record for an event slug.
    pub fn event_override(&self, slug: &str) -> EventOverride {
        if let Some(rec) = self.events.get(slug) {
            return rec;
        }
        let rec = EventOverride::new(slug);
        self.events.insert(rec.clone());
        rec
    }

    pub fn update_event(&self, record: EventOverride) {
        self.events.update(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Vod, VodKind};
    use chrono::{Duration, Utc};

    fn store() -> (tempfile::TempDir, OverrideStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = OverrideStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_create_then_lookup_by_either_id() {
        let (_dir, store) = store();

        let created = store.run_override(Some(7), Some("row-1")).unwrap();
        assert_eq!(created.tracker_id, Some(7));
        assert_eq!(created.horaro_id.as_deref(), Some("row-1"));

        let by_tracker = store.run_override(Some(7), None).unwrap();
        let by_horaro = store.run_override(None, Some("row-1")).unwrap();
        assert_eq!(by_tracker.id, created.id);
        assert_eq!(by_horaro.id, created.id);
    }

    #[tokio::test]
    async fn test_neither_id_returns_none() {
        let (_dir, store) = store();
        assert!(store.run_override(None, None).is_none());
    }

    #[tokio::test]
    async fn test_id_backfill_never_overwrites() {
        let (_dir, store) = store();

        let created = store.run_override(Some(7), None).unwrap();
        assert_eq!(created.horaro_id, None);

        // Second lookup supplies the horaro id: filled in on the same record.
        let filled = store.run_override(Some(7), Some("row-1")).unwrap();
        assert_eq!(filled.id, created.id);
        assert_eq!(filled.horaro_id.as_deref(), Some("row-1"));

        // A different horaro id does not overwrite the known one.
        let again = store.run_override(Some(7), Some("row-2")).unwrap();
        assert_eq!(again.horaro_id.as_deref(), Some("row-1"));
    }

    #[tokio::test]
    async fn test_merge_is_commutative_and_lossless() {
        for flipped in [false, true] {
            let (_dir, store) = store();

            // Two records created independently, each knowing one id.
            let mut a = RunOverride::new(Some(7), None);
            a.created_at = Utc::now() - Duration::minutes(10);
            a.start_time = Some(Utc::now());
            a.vods.push(Vod::new(VodKind::Twitch, "https://t.tv/1"));

            let mut b = RunOverride::new(None, Some("row-1".to_string()));
            b.created_at = Utc::now();
            b.run_time = Some(Duration::minutes(45));
            b.vods.push(Vod::new(VodKind::Youtube, "https://yt.be/1"));
            b.vods.push(Vod::new(VodKind::Twitch, "https://t.tv/1"));

            if flipped {
                store.update_run(b.clone());
                store.update_run(a.clone());
            } else {
                store.update_run(a.clone());
                store.update_run(b.clone());
            }

            // A fetch supplying both ids triggers the merge.
            let merged = store.run_override(Some(7), Some("row-1")).unwrap();
            assert_eq!(merged.id, a.id, "earlier-created record survives");
            assert_eq!(merged.tracker_id, Some(7));
            assert_eq!(merged.horaro_id.as_deref(), Some("row-1"));
            assert_eq!(merged.start_time, a.start_time);
            assert_eq!(merged.run_time, Some(Duration::minutes(45)));
            // VODs concatenated, semantic duplicates removed.
            assert_eq!(merged.vods.len(), 2);

            // Exactly one record remains, reachable by either id.
            assert_eq!(store.run_override(Some(7), None).unwrap().id, merged.id);
            assert_eq!(
                store.run_override(None, Some("row-1")).unwrap().id,
                merged.id
            );
        }
    }

    #[tokio::test]
    async fn test_merge_prefers_earlier_scalars_on_conflict() {
        let (_dir, store) = store();
        let early_start = Utc::now() - Duration::hours(2);

        let mut a = RunOverride::new(Some(7), None);
        a.created_at = Utc::now() - Duration::minutes(10);
        a.start_time = Some(early_start);

        let mut b = RunOverride::new(None, Some("row-1".to_string()));
        b.start_time = Some(Utc::now());

        store.update_run(a);
        store.update_run(b);

        let merged = store.run_override(Some(7), Some("row-1")).unwrap();
        assert_eq!(merged.start_time, Some(early_start));
    }

    #[tokio::test]
    async fn test_merge_is_idempotent() {
        let (_dir, store) = store();

        let mut a = RunOverride::new(Some(7), None);
        a.created_at = Utc::now() - Duration::minutes(10);
        store.update_run(a);
        store.update_run(RunOverride::new(None, Some("row-1".to_string())));

        let first = store.run_override(Some(7), Some("row-1")).unwrap();
        let second = store.run_override(Some(7), Some("row-1")).unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_event_override_get_or_create() {
        let (_dir, store) = store();

        let created = store.event_override("demo2024");
        assert!(!created.reddit_merged_in);

        let mut updated = created.clone();
        updated.reddit_merged_in = true;
        store.update_event(updated);

        assert!(store.event_override("demo2024").reddit_merged_in);
    }
}
