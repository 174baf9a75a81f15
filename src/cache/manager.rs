use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::store::{ObjectStore, StoredObject};

/// A cached upstream record. `id` is unique within its partition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CachedObject<T> {
    pub id: String,
    pub payload: T,
    #[serde(rename = "cachedAt")]
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedObject<T> {
    pub fn new(id: impl Into<String>, payload: T) -> Self {
        Self {
            id: id.into(),
            payload,
            cached_at: Utc::now(),
        }
    }

    pub fn age(&self) -> Duration {
        Utc::now() - self.cached_at
    }
}

/// A cached record for an entity with its own scheduled time, e.g. a run's
/// start. Required for the cutoff-based permanence rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimedCachedObject<T> {
    pub id: String,
    pub payload: T,
    #[serde(rename = "cachedAt")]
    pub cached_at: DateTime<Utc>,
    #[serde(rename = "startsAt")]
    pub starts_at: DateTime<Utc>,
}

impl<T> TimedCachedObject<T> {
    pub fn new(id: impl Into<String>, payload: T, starts_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            payload,
            cached_at: Utc::now(),
            starts_at,
        }
    }
}

impl<T> StoredObject for CachedObject<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + 'static,
{
    fn object_id(&self) -> &str {
        &self.id
    }
}

impl<T> StoredObject for TimedCachedObject<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + 'static,
{
    fn object_id(&self) -> &str {
        &self.id
    }
}

/// Transient lookup result pairing an entry with its freshness; never
/// persisted.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
    pub object: T,
    pub is_fresh: bool,
}

/// Freshness-policy wrapper over one partition: entries are fresh while
/// `now - cached_at < cache_length`; stale entries remain available as a
/// fallback until refreshed or removed.
pub struct CacheManager<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + 'static,
{
    store: ObjectStore<CachedObject<T>>,
    cache_length: Duration,
}

impl<T> CacheManager<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + 'static,
{
    pub fn open(dir: &Path, partition: &str, cache_length: Duration) -> Result<Self> {
        Ok(Self {
            store: ObjectStore::open(dir, partition)?,
            cache_length,
        })
    }

    pub fn get(&self, id: &str) -> Option<CachedObject<T>> {
        self.store.get(id)
    }

    pub fn get_all(&self) -> Vec<CachedObject<T>> {
        self.store.get_all()
    }

    pub fn get_by(&self, pred: impl Fn(&CachedObject<T>) -> bool) -> Vec<CachedObject<T>> {
        self.store.find(pred)
    }

    pub fn put(&self, obj: CachedObject<T>) {
        self.store.insert(obj);
    }

    pub fn remove(&self, id: &str) {
        self.store.delete(id);
    }

    pub fn is_fresh(&self, obj: &CachedObject<T>) -> bool {
        self.is_fresh_at(obj, Utc::now())
    }

    fn is_fresh_at(&self, obj: &CachedObject<T>, now: DateTime<Utc>) -> bool {
        now - obj.cached_at < self.cache_length
    }

    /// Lookup pairing the entry with its freshness.
    pub fn lookup(&self, id: &str) -> Option<CacheResult<CachedObject<T>>> {
        let object = self.store.get(id)?;
        let is_fresh = self.is_fresh(&object);
        Some(CacheResult { object, is_fresh })
    }
}

/// Time-scoped freshness: an entry is permanently fresh once its scheduled
/// time is more than `cache_cutoff` in the past, regardless of `cached_at`;
/// otherwise the plain age-based policy applies.
pub struct TimedCacheManager<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + 'static,
{
    store: ObjectStore<TimedCachedObject<T>>,
    cache_length: Duration,
    cache_cutoff: Duration,
}

impl<T> TimedCacheManager<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + 'static,
{
    pub fn open(
        dir: &Path,
        partition: &str,
        cache_length: Duration,
        cache_cutoff: Duration,
    ) -> Result<Self> {
        Ok(Self {
            store: ObjectStore::open(dir, partition)?,
            cache_length,
            cache_cutoff,
        })
    }

    pub fn get(&self, id: &str) -> Option<TimedCachedObject<T>> {
        self.store.get(id)
    }

    pub fn get_all(&self) -> Vec<TimedCachedObject<T>> {
        self.store.get_all()
    }

    pub fn get_by(
        &self,
        pred: impl Fn(&TimedCachedObject<T>) -> bool,
    ) -> Vec<TimedCachedObject<T>> {
        self.store.find(pred)
    }

    pub fn put(&self, obj: TimedCachedObject<T>) {
        self.store.insert(obj);
    }

    pub fn remove(&self, id: &str) {
        self.store.delete(id);
    }

    pub fn is_fresh(&self, obj: &TimedCachedObject<T>) -> bool {
        self.is_fresh_at(obj, Utc::now())
    }

    fn is_fresh_at(&self, obj: &TimedCachedObject<T>, now: DateTime<Utc>) -> bool {
        // Concluded long enough ago: the data cannot change anymore.
        if now - obj.starts_at > self.cache_cutoff {
            return true;
        }
        now - obj.cached_at < self.cache_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(dir: &Path) -> CacheManager<String> {
        CacheManager::open(dir, "plain", Duration::minutes(60)).unwrap()
    }

    fn timed_cache(dir: &Path) -> TimedCacheManager<String> {
        TimedCacheManager::open(dir, "timed", Duration::minutes(60), Duration::days(30)).unwrap()
    }

    #[tokio::test]
    async fn test_fresh_within_window() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());

        let obj = CachedObject::new("a", "payload".to_string());
        assert!(cache.is_fresh(&obj));

        let mut old = obj.clone();
        old.cached_at = Utc::now() - Duration::minutes(61);
        assert!(!cache.is_fresh(&old));
    }

    #[tokio::test]
    async fn test_stale_entry_remains_available() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());

        let mut obj = CachedObject::new("a", "payload".to_string());
        obj.cached_at = Utc::now() - Duration::hours(5);
        cache.put(obj);

        let result = cache.lookup("a").unwrap();
        assert!(!result.is_fresh);
        assert_eq!(result.object.payload, "payload");
    }

    #[tokio::test]
    async fn test_timed_entry_permanently_fresh_past_cutoff() {
        let dir = tempfile::tempdir().unwrap();
        let cache = timed_cache(dir.path());

        // Cached ages ago AND scheduled ages ago: permanently fresh.
        let mut concluded = TimedCachedObject::new(
            "a",
            "payload".to_string(),
            Utc::now() - Duration::days(31),
        );
        concluded.cached_at = Utc::now() - Duration::days(20);
        assert!(cache.is_fresh(&concluded));

        // Scheduled recently: base policy applies.
        let mut recent =
            TimedCachedObject::new("b", "payload".to_string(), Utc::now() - Duration::days(1));
        recent.cached_at = Utc::now() - Duration::minutes(61);
        assert!(!cache.is_fresh(&recent));

        recent.cached_at = Utc::now() - Duration::minutes(5);
        assert!(cache.is_fresh(&recent));
    }

    #[tokio::test]
    async fn test_get_by_predicate() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());
        cache.put(CachedObject::new("a", "x".to_string()));
        cache.put(CachedObject::new("b", "y".to_string()));

        let hits = cache.get_by(|o| o.payload == "y");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "b");
    }
}
