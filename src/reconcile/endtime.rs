//! Derived event end-time cache.
//!
//! Short-lived and separate from the main object cache: maps an event slug
//! to the last run's end time plus an expiry for when to recompute. Polling
//! stays rare until the event approaches its end, then tightens to a few
//! minutes; long-concluded or settled events stop being recomputed at all.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};

/// Floor between recomputations while an event is live.
const MIN_POLL_MINUTES: i64 = 5;

/// Start polling at the floor rate this close to the event's end.
const END_LEAD_HOURS: i64 = 1;

/// An event that started this long ago is never recomputed.
const SETTLED_AFTER_START_DAYS: i64 = 30;

/// An unchanged value this far past its own end time is never recomputed.
const SETTLED_PAST_END_DAYS: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EndTimeEntry {
    pub end_time: DateTime<Utc>,
    /// `None` means never recompute.
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
pub struct EndTimeCache {
    entries: RwLock<HashMap<String, EndTimeEntry>>,
}

impl EndTimeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, slug: &str) -> Option<EndTimeEntry> {
        self.entries
            .read()
            .expect("end-time cache poisoned")
            .get(slug)
            .copied()
    }

    /// Whether the cached value for `slug` is missing or expired.
    pub fn needs_refresh(&self, slug: &str, now: DateTime<Utc>) -> bool {
        match self.get(slug) {
            None => true,
            Some(entry) => match entry.expires_at {
                None => false,
                Some(expiry) => expiry <= now,
            },
        }
    }

    /// Record a freshly recomputed end time and derive its expiry.
    pub fn store(
        &self,
        slug: &str,
        end_time: DateTime<Utc>,
        event_start: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) {
        let previous = self.get(slug);

        let settled_start = event_start
            .map(|s| now - s > Duration::days(SETTLED_AFTER_START_DAYS))
            .unwrap_or(false);
        let settled_unchanged = previous
            .map(|p| p.end_time == end_time && now - end_time > Duration::days(SETTLED_PAST_END_DAYS))
            .unwrap_or(false);

        let expires_at = if settled_start || settled_unchanged {
            None
        } else {
            Some((end_time - Duration::hours(END_LEAD_HOURS)).max(now + Duration::minutes(MIN_POLL_MINUTES)))
        };

        self.entries
            .write()
            .expect("end-time cache poisoned")
            .insert(slug.to_string(), EndTimeEntry { end_time, expires_at });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_entry_needs_refresh() {
        let cache = EndTimeCache::new();
        assert!(cache.needs_refresh("demo", Utc::now()));
    }

    #[test]
    fn test_far_future_end_polls_rarely() {
        let cache = EndTimeCache::new();
        let now = Utc::now();
        let end = now + Duration::hours(10);

        cache.store("demo", end, Some(now - Duration::hours(1)), now);
        let entry = cache.get("demo").unwrap();
        // Next poll is pushed out to an hour before the end.
        assert_eq!(entry.expires_at, Some(end - Duration::hours(1)));
        assert!(!cache.needs_refresh("demo", now));
    }

    #[test]
    fn test_near_end_polls_at_floor_rate() {
        let cache = EndTimeCache::new();
        let now = Utc::now();
        let end = now + Duration::minutes(20);

        cache.store("demo", end, Some(now - Duration::hours(5)), now);
        let entry = cache.get("demo").unwrap();
        assert_eq!(entry.expires_at, Some(now + Duration::minutes(5)));
        assert!(cache.needs_refresh("demo", now + Duration::minutes(6)));
    }

    #[test]
    fn test_old_event_never_recomputed() {
        let cache = EndTimeCache::new();
        let now = Utc::now();
        let end = now - Duration::days(25);

        cache.store("demo", end, Some(now - Duration::days(31)), now);
        let entry = cache.get("demo").unwrap();
        assert_eq!(entry.expires_at, None);
        assert!(!cache.needs_refresh("demo", now + Duration::days(365)));
    }

    #[test]
    fn test_unchanged_value_past_end_settles() {
        let cache = EndTimeCache::new();
        let now = Utc::now();
        let end = now - Duration::days(2);
        let start = Some(now - Duration::days(3));

        // First computation: event recently over, still polled.
        cache.store("demo", end, start, now);
        assert!(cache.get("demo").unwrap().expires_at.is_some());

        // Recomputed to the same value a day later: settles.
        cache.store("demo", end, start, now);
        assert_eq!(cache.get("demo").unwrap().expires_at, None);
    }

    #[test]
    fn test_changed_value_keeps_polling() {
        let cache = EndTimeCache::new();
        let now = Utc::now();
        let start = Some(now - Duration::days(3));

        cache.store("demo", now - Duration::days(2), start, now);
        // Schedule shuffled: end moved, so the entry does not settle.
        cache.store("demo", now + Duration::hours(2), start, now);
        assert!(cache.get("demo").unwrap().expires_at.is_some());
    }
}
