//! Schedule reconciliation.
//!
//! The reconciler assembles one consistent, ordered schedule view per event
//! from the cached upstream records, the override store, the bid trees, and
//! the community VOD list. It owns the cache-vs-refetch decision and always
//! degrades to stale-but-available data rather than failing outright.

pub mod endtime;

pub use endtime::{EndTimeCache, EndTimeEntry};

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::api::{AltSchedule, ScheduleClient, TrackerClient, VodListClient};
use crate::bids::{build_bid_trees, sort_for_display};
use crate::cache::{CacheManager, CachedObject, TimedCacheManager, TimedCachedObject};
use crate::config::Config;
use crate::models::{
    sort_vods, Bid, Event, EventData, EventOverride, RunData, RunOverride, RunRecord,
    ScheduleStatus, Talent, VodKind,
};
use crate::store::{ObjectStore, OverrideStore, StoredObject};

/// Events are only marked ended after their end time has been in the past
/// this long, a grace window against last-minute schedule shuffling.
const EVENT_END_GRACE_HOURS: i64 = 1;

impl StoredObject for ScheduleStatus {
    fn object_id(&self) -> &str {
        &self.id
    }
}

/// Per-organization reconciliation context: upstream clients, caches,
/// stores, and the slug→id and end-time maps. Constructed once and shared
/// by reference; all methods take `&self`.
pub struct Reconciler<C, S, V>
where
    C: TrackerClient,
    S: ScheduleClient,
    V: VodListClient,
{
    tracker: C,
    schedules: S,
    vod_lists: V,
    events: CacheManager<Event>,
    runs: TimedCacheManager<RunRecord>,
    talent: CacheManager<Talent>,
    alt_schedules: CacheManager<AltSchedule>,
    overrides: OverrideStore,
    status: ObjectStore<ScheduleStatus>,
    slug_ids: RwLock<HashMap<String, i64>>,
    end_times: EndTimeCache,
    vod_finalize_window: Duration,
}

/// One run mid-reconciliation: the cached record plus derived timing.
struct TimedRun {
    record: RunRecord,
    run_override: Option<RunOverride>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    run_time: Duration,
    setup: Duration,
}

impl<C, S, V> Reconciler<C, S, V>
where
    C: TrackerClient,
    S: ScheduleClient,
    V: VodListClient,
{
    /// Must be called within a tokio runtime (the stores spawn their flush
    /// workers).
    pub fn new(config: &Config, tracker: C, schedules: S, vod_lists: V) -> Result<Self> {
        let dir = config.store_dir()?;
        let cache_length = config.cache_length();
        Ok(Self {
            tracker,
            schedules,
            vod_lists,
            events: CacheManager::open(&dir, "events", cache_length)?,
            runs: TimedCacheManager::open(&dir, "runs", cache_length, config.cache_cutoff())?,
            talent: CacheManager::open(&dir, "talent", cache_length)?,
            alt_schedules: CacheManager::open(&dir, "alt_schedules", cache_length)?,
            overrides: OverrideStore::open(&dir)?,
            status: ObjectStore::open(&dir, "status")?,
            slug_ids: RwLock::new(HashMap::new()),
            end_times: EndTimeCache::new(),
            vod_finalize_window: config.vod_finalize_window(),
        })
    }

    // ===== Public surface =====

    /// The reconciled, ordered schedule for an event. `None` if the event
    /// slug is unknown; an empty list if the event has no runs.
    pub async fn get_schedule(&self, event_slug: &str) -> Option<Vec<RunData>> {
        let slug = event_slug.trim().to_ascii_lowercase();
        let event = self.resolve_event(&slug).await?;
        let (records, talent_ids) = self.load_runs(&event).await;
        let records: Vec<RunRecord> =
            records.into_iter().filter(|r| !r.placeholder).collect();
        if records.is_empty() {
            return Some(Vec::new());
        }
        Some(self.assemble(&event, records, talent_ids).await)
    }

    /// Derived event view for one slug.
    pub async fn get_event_data(&self, event_slug: &str) -> Option<EventData> {
        let slug = event_slug.trim().to_ascii_lowercase();
        let event = self.resolve_event(&slug).await?;
        let schedule = self.get_schedule(&slug).await.unwrap_or_default();
        let start_time = schedule.first().map(|r| r.start_time).or(event.start_time);
        let end_time = if self.end_times.needs_refresh(&slug, Utc::now()) {
            self.refresh_end_time(&slug, &schedule)
        } else {
            self.end_times.get(&slug).map(|e| e.end_time)
        };
        let record = self.apply_event_transitions(&event, start_time, end_time);
        Some(EventData {
            started: record.started_at.is_some(),
            ended: record.ended_at.is_some(),
            event,
            start_time,
            end_time,
        })
    }

    /// Derived views for all known events, fetched concurrently.
    pub async fn get_events_data(&self) -> Vec<EventData> {
        let events = self.all_events().await;
        join_all(events.iter().map(|e| self.get_event_data(&e.slug)))
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    /// When the event's last run ends, via the short-lived end-time cache.
    pub async fn event_end_time(&self, event_slug: &str) -> Option<DateTime<Utc>> {
        let slug = event_slug.trim().to_ascii_lowercase();
        if !self.end_times.needs_refresh(&slug, Utc::now()) {
            return self.end_times.get(&slug).map(|e| e.end_time);
        }
        let schedule = self.get_schedule(&slug).await?;
        self.refresh_end_time(&slug, &schedule)
    }

    /// Recompute and store the end-time entry from an already-reconciled
    /// schedule.
    fn refresh_end_time(&self, slug: &str, schedule: &[RunData]) -> Option<DateTime<Utc>> {
        let end = schedule.last().map(|r| r.end_time)?;
        self.end_times
            .store(slug, end, schedule.first().map(|r| r.start_time), Utc::now());
        Some(end)
    }

    /// The alternate spreadsheet-like schedule, cached under the plain
    /// freshness policy.
    pub async fn get_alternate_schedule(
        &self,
        event_external_id: &str,
        schedule_slug: &str,
    ) -> Option<AltSchedule> {
        let key = format!("{}/{}", event_external_id, schedule_slug);
        if let Some(result) = self.alt_schedules.lookup(&key) {
            if result.is_fresh {
                return Some(result.object.payload);
            }
        }
        match self
            .schedules
            .get_schedule(event_external_id, schedule_slug)
            .await
        {
            Ok(Some(schedule)) => {
                self.alt_schedules
                    .put(CachedObject::new(key, schedule.clone()));
                Some(schedule)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(schedule = %key, error = %e,
                      "Alternate schedule fetch failed; serving stale cache");
                self.alt_schedules.get(&key).map(|o| o.payload)
            }
        }
    }

    /// Live-show state, stored outside the cache-freshness machinery.
    pub fn schedule_status(&self, event_slug: &str) -> Option<ScheduleStatus> {
        self.status.get(&event_slug.trim().to_ascii_lowercase())
    }

    pub fn set_schedule_status(&self, status: ScheduleStatus) {
        self.status.update(status);
    }

    // ===== Event resolution =====

    /// Resolve a normalized slug to its event: slug→id map, then event
    /// cache, then the upstream event list (which populates the map for
    /// every returned event).
    async fn resolve_event(&self, slug: &str) -> Option<Event> {
        let known_id = self
            .slug_ids
            .read()
            .expect("slug map poisoned")
            .get(slug)
            .copied();

        if let Some(id) = known_id {
            if let Some(result) = self.events.lookup(&id.to_string()) {
                if result.is_fresh {
                    return Some(result.object.payload);
                }
                return match self.tracker.get_event(id).await {
                    Ok(Some(event)) => {
                        self.events
                            .put(CachedObject::new(id.to_string(), event.clone()));
                        Some(event)
                    }
                    Ok(None) => Some(result.object.payload),
                    Err(e) => {
                        warn!(event = id, error = %e, "Event refresh failed; serving stale");
                        Some(result.object.payload)
                    }
                };
            }
            return match self.tracker.get_event(id).await {
                Ok(Some(event)) => {
                    self.events
                        .put(CachedObject::new(id.to_string(), event.clone()));
                    Some(event)
                }
                Ok(None) => None,
                Err(e) => {
                    warn!(event = id, error = %e, "Event fetch failed");
                    None
                }
            };
        }

        match self.tracker.list_events().await {
            Ok(events) => {
                {
                    let mut map = self.slug_ids.write().expect("slug map poisoned");
                    for event in &events {
                        map.insert(event.normalized_slug(), event.id);
                    }
                }
                for event in &events {
                    self.events
                        .put(CachedObject::new(event.id.to_string(), event.clone()));
                }
                events.into_iter().find(|e| e.normalized_slug() == slug)
            }
            Err(e) => {
                warn!(error = %e, "Event list fetch failed; checking cache");
                self.events
                    .get_by(|o| o.payload.normalized_slug() == slug)
                    .into_iter()
                    .next()
                    .map(|o| o.payload)
            }
        }
    }

    async fn all_events(&self) -> Vec<Event> {
        let cached = self.events.get_all();
        let all_fresh = !cached.is_empty() && cached.iter().all(|o| self.events.is_fresh(o));
        if all_fresh {
            let mut map = self.slug_ids.write().expect("slug map poisoned");
            for obj in &cached {
                map.insert(obj.payload.normalized_slug(), obj.payload.id);
            }
            drop(map);
            return sort_events(cached.into_iter().map(|o| o.payload).collect());
        }
        match self.tracker.list_events().await {
            Ok(events) => {
                {
                    let mut map = self.slug_ids.write().expect("slug map poisoned");
                    for event in &events {
                        map.insert(event.normalized_slug(), event.id);
                    }
                }
                for event in &events {
                    self.events
                        .put(CachedObject::new(event.id.to_string(), event.clone()));
                }
                sort_events(events)
            }
            Err(e) => {
                warn!(error = %e, "Event list fetch failed; serving stale cache");
                sort_events(cached.into_iter().map(|o| o.payload).collect())
            }
        }
    }

    // ===== Run loading =====

    /// Working set of run records for an event, refetching from upstream
    /// when any cached entry has gone stale. Returns the ordered records
    /// and the talent ids referenced by a fresh fetch (empty when served
    /// purely from cache).
    async fn load_runs(&self, event: &Event) -> (Vec<RunRecord>, Vec<i64>) {
        let cached = self.runs.get_by(|o| o.payload.run.event_id == event.id);
        let all_fresh = !cached.is_empty() && cached.iter().all(|o| self.runs.is_fresh(o));
        if all_fresh {
            debug!(event = %event.slug, runs = cached.len(), "Serving schedule from cache");
            return (
                sort_records(cached.into_iter().map(|o| o.payload).collect()),
                Vec::new(),
            );
        }

        let (runs_result, bids_result) = tokio::join!(
            self.tracker.list_runs(event.id),
            self.tracker.list_bids(event.id)
        );

        let fetched = match runs_result {
            Ok(runs) => runs,
            Err(e) => {
                warn!(event = %event.slug, error = %e, "Run fetch failed; serving stale cache");
                return (
                    sort_records(cached.into_iter().map(|o| o.payload).collect()),
                    Vec::new(),
                );
            }
        };

        if fetched.is_empty() {
            if !cached.is_empty() {
                // Transient upstream hiccup: keep serving what we have.
                return (
                    sort_records(cached.into_iter().map(|o| o.payload).collect()),
                    Vec::new(),
                );
            }
            // Genuinely no runs yet: cache a placeholder so subsequent
            // requests stop re-hitting upstream for this event. Anchored to
            // the event's own start so the permanence cutoff only kicks in
            // for long-concluded events, not late-published schedules.
            let record = RunRecord::placeholder(event.id);
            let starts_at = event.start_time.unwrap_or_else(Utc::now);
            self.runs.put(TimedCachedObject::new(
                record.run.id.to_string(),
                record,
                starts_at,
            ));
            return (Vec::new(), Vec::new());
        }

        let fetched_ids: HashSet<i64> = fetched.iter().map(|r| r.id).collect();

        // Evict cached runs that are both stale and absent upstream, plus
        // any placeholder now contradicted by real runs.
        for obj in &cached {
            let orphaned =
                !self.runs.is_fresh(obj) && !fetched_ids.contains(&obj.payload.run.id);
            if orphaned || obj.payload.placeholder {
                self.runs.remove(&obj.id);
            }
        }

        let bids = match bids_result {
            Ok(bids) => bids,
            Err(e) => {
                warn!(event = %event.slug, error = %e, "Bid fetch failed");
                Vec::new()
            }
        };
        let known_run = |b: &Bid| b.run_id.map_or(true, |rid| fetched_ids.contains(&rid));
        let mut trees = build_bid_trees(bids.into_iter().filter(known_run).collect());

        let mut talent_ids: Vec<i64> = Vec::new();
        let mut records = Vec::with_capacity(fetched.len());
        for run in fetched {
            talent_ids.extend(run.talent_ids());
            let bids = trees.remove(&run.id).unwrap_or_default();
            let starts_at = run.start_time.unwrap_or_else(Utc::now);
            let id = run.id.to_string();
            let record = RunRecord::new(run, bids);
            self.runs
                .put(TimedCachedObject::new(id, record.clone(), starts_at));
            records.push(record);
        }
        talent_ids.sort_unstable();
        talent_ids.dedup();
        (sort_records(records), talent_ids)
    }

    /// Cascade upserts of runner/host/commentator records referenced by
    /// freshly fetched runs.
    async fn refresh_talent(&self, ids: &[i64]) {
        let need: Vec<i64> = ids
            .iter()
            .copied()
            .filter(|id| match self.talent.lookup(&id.to_string()) {
                Some(result) => !result.is_fresh,
                None => true,
            })
            .collect();
        if need.is_empty() {
            return;
        }
        match self.tracker.list_talent(&need).await {
            Ok(talent) => {
                for t in talent {
                    self.talent.put(CachedObject::new(t.id.to_string(), t));
                }
            }
            Err(e) => warn!(error = %e, "Talent fetch failed"),
        }
    }

    // ===== Assembly =====

    /// Merge records, overrides, and community VODs into the final ordered
    /// timeline.
    async fn assemble(
        &self,
        event: &Event,
        records: Vec<RunRecord>,
        talent_ids: Vec<i64>,
    ) -> Vec<RunData> {
        let now = Utc::now();

        // Timing pass: derive start/setup/end in schedule order.
        let mut timed: Vec<TimedRun> = Vec::with_capacity(records.len());
        let mut prev_end: Option<DateTime<Utc>> = None;
        for record in records {
            let run_override = self
                .overrides
                .run_override(Some(record.run.id), record.run.external_id.as_deref());
            let override_start = run_override.as_ref().and_then(|o| o.start_time);
            let Some(start) = override_start.or(prev_end).or(record.run.start_time) else {
                warn!(run = record.run.id, "Run has no derivable start time; skipping");
                continue;
            };
            let run_time = run_override
                .as_ref()
                .and_then(|o| o.run_time)
                .unwrap_or(record.run.run_time);
            let setup = match prev_end {
                Some(prev) => (start - prev).max(Duration::zero()),
                None => record.run.setup_time,
            };
            let end = start + run_time;
            prev_end = Some(end);
            timed.push(TimedRun {
                record,
                run_override,
                start,
                end,
                run_time,
                setup,
            });
        }

        if timed.is_empty() {
            return Vec::new();
        }

        let slug = event.normalized_slug();
        let mut event_override = self.overrides.event_override(&slug);

        // Only merge community VODs once the event has begun; community
        // lists are assumed to stabilize about a week post-event.
        let load_vods = timed.first().map(|t| t.start < now).unwrap_or(false);
        let vods_finalized = timed
            .last()
            .map(|t| t.end < now - self.vod_finalize_window)
            .unwrap_or(false);

        let fetch_community =
            load_vods && (!event_override.reddit_merged_in || !vods_finalized);
        let community_future = async {
            if !fetch_community {
                return Vec::new();
            }
            match self.vod_lists.suggested_vods(&slug).await {
                Ok(lists) => lists,
                Err(e) => {
                    warn!(event = %slug, error = %e, "Community VOD fetch failed");
                    Vec::new()
                }
            }
        };
        let (community, _) = tokio::join!(community_future, self.refresh_talent(&talent_ids));

        let mut schedule = Vec::with_capacity(timed.len());
        for (position, t) in timed.into_iter().enumerate() {
            // VOD merge: upstream-confirmed links first, then persisted
            // override links, then community suggestions, each only for
            // kinds not already present.
            let mut vods = t.record.run.video_links.clone();
            let mut present: HashSet<VodKind> = vods.iter().map(|v| v.kind).collect();
            if let Some(ref run_override) = t.run_override {
                for vod in &run_override.vods {
                    if !present.contains(&vod.kind) {
                        vods.push(vod.clone());
                    }
                }
                present.extend(run_override.vods.iter().map(|v| v.kind));
            }

            // A run whose community VODs were already finalized keeps them
            // as persisted; later community-list edits no longer apply.
            let run_finalized = t
                .run_override
                .as_ref()
                .map_or(false, |o| o.reddit_vods_finalized);
            let mut added: Vec<crate::models::Vod> = Vec::new();
            if !run_finalized {
                if let Some(list) = community.get(position) {
                    for vod in list {
                        if !present.contains(&vod.kind) && !vods.contains(vod) {
                            vods.push(vod.clone());
                            added.push(vod.clone());
                        }
                    }
                }
            }
            // Once finalized, persist the community links so future calls
            // skip the community fetch for this run.
            if vods_finalized && !added.is_empty() {
                if let Some(mut run_override) = t.run_override.clone() {
                    for vod in added {
                        if !run_override.vods.contains(&vod) {
                            run_override.vods.push(vod);
                        }
                    }
                    run_override.reddit_vods_finalized = true;
                    self.overrides.update_run(run_override);
                }
            }
            sort_vods(&mut vods);

            let mut bids = t.record.bids.clone();
            sort_for_display(&mut bids);

            schedule.push(RunData {
                run: t.record.run,
                bids,
                start_time: t.start,
                end_time: t.end,
                run_time: t.run_time,
                setup_time: t.setup,
                vods,
            });
        }

        // One-time, monotonic transition: once the finalized community list
        // has been merged in, it is never re-fetched for this event.
        if load_vods && !event_override.reddit_merged_in && vods_finalized {
            event_override.reddit_merged_in = true;
            info!(event = %slug, "Community VOD list finalized and merged");
            self.overrides.update_event(event_override);
        }

        schedule
    }

    // ===== Event state transitions =====

    /// Post-read hook: advance the event's started/ended markers. Both
    /// transitions are one-time; the ended transition waits out a grace
    /// window after the end time.
    fn apply_event_transitions(
        &self,
        event: &Event,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
    ) -> EventOverride {
        let now = Utc::now();
        let mut record = self.overrides.event_override(&event.normalized_slug());
        let mut changed = false;

        if record.started_at.is_none() {
            if let Some(start) = start_time {
                if start < now {
                    record.started_at = Some(start);
                    changed = true;
                    info!(event = %event.slug, start = %start, "Event started");
                }
            }
        }
        if record.ended_at.is_none() {
            if let (Some(started), Some(end)) = (record.started_at, end_time) {
                if end > started && now - end > Duration::hours(EVENT_END_GRACE_HOURS) {
                    record.ended_at = Some(end);
                    changed = true;
                    info!(event = %event.slug, end = %end, "Event ended");
                }
            }
        }
        if changed {
            self.overrides.update_event(record.clone());
        }
        record
    }
}

fn sort_events(mut events: Vec<Event>) -> Vec<Event> {
    events.sort_by_key(|e| (e.start_time, e.id));
    events
}

fn sort_records(mut records: Vec<RunRecord>) -> Vec<RunRecord> {
    records.sort_by_key(|r| (r.run.order.unwrap_or(i64::MAX), r.run.start_time, r.run.id));
    records
}
