//! Rate-limited auxiliary lookup for per-game metadata.
//!
//! A secondary lookup path independent of the schedule caches: requests are
//! queued and drained by one dedicated worker with a fixed minimum
//! inter-request delay. Callers get an immediate cache-miss response; the
//! result becomes available to future callers once the worker completes.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Auxiliary metadata for one game.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameInfo {
    pub name: String,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(rename = "releaseYear", default)]
    pub release_year: Option<i32>,
    #[serde(rename = "twitchName", default)]
    pub twitch_name: Option<String>,
}

/// Contract for the metadata source behind the rate limit.
pub trait GameInfoClient: Send + Sync + 'static {
    fn lookup(&self, name: &str) -> impl Future<Output = Result<Option<GameInfo>>> + Send;
}

#[derive(Default)]
struct LookupState {
    cache: HashMap<String, GameInfo>,
    pending: HashSet<String>,
}

pub struct GameLookup {
    state: Arc<RwLock<LookupState>>,
    queue_tx: mpsc::UnboundedSender<String>,
}

impl GameLookup {
    /// Start the lookup worker. `min_delay` is the minimum gap between
    /// consecutive upstream requests.
    ///
    /// Must be called within a tokio runtime.
    pub fn new<C: GameInfoClient>(client: C, min_delay: Duration) -> Self {
        let state = Arc::new(RwLock::new(LookupState::default()));
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        tokio::spawn(lookup_worker(client, min_delay, Arc::clone(&state), queue_rx));
        Self { state, queue_tx }
    }

    /// Cached metadata for a game, or an immediate miss. A miss enqueues
    /// the name for the worker; repeat calls while the lookup is in flight
    /// do not enqueue it again.
    pub fn get(&self, name: &str) -> Option<GameInfo> {
        let key = cache_key(name);
        {
            let state = self.state.read().expect("lookup state poisoned");
            if let Some(info) = state.cache.get(&key) {
                return Some(info.clone());
            }
            if state.pending.contains(&key) {
                return None;
            }
        }

        let mut state = self.state.write().expect("lookup state poisoned");
        if state.cache.contains_key(&key) {
            return state.cache.get(&key).cloned();
        }
        if state.pending.insert(key) {
            if self.queue_tx.send(name.to_string()).is_err() {
                warn!(game = name, "Lookup worker gone; dropping request");
            }
        }
        None
    }
}

fn cache_key(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

async fn lookup_worker<C: GameInfoClient>(
    client: C,
    min_delay: Duration,
    state: Arc<RwLock<LookupState>>,
    mut queue_rx: mpsc::UnboundedReceiver<String>,
) {
    while let Some(name) = queue_rx.recv().await {
        let key = cache_key(&name);
        match client.lookup(&name).await {
            Ok(Some(info)) => {
                let mut state = state.write().expect("lookup state poisoned");
                state.cache.insert(key.clone(), info);
                state.pending.remove(&key);
            }
            Ok(None) => {
                debug!(game = %name, "No metadata found");
                state
                    .write()
                    .expect("lookup state poisoned")
                    .pending
                    .remove(&key);
            }
            Err(e) => {
                warn!(game = %name, error = %e, "Metadata lookup failed");
                state
                    .write()
                    .expect("lookup state poisoned")
                    .pending
                    .remove(&key);
            }
        }
        tokio::time::sleep(min_delay).await;
    }
    debug!("Lookup worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeClient {
        calls: Arc<AtomicUsize>,
    }

    impl GameInfoClient for FakeClient {
        async fn lookup(&self, name: &str) -> Result<Option<GameInfo>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if name == "unknown" {
                return Ok(None);
            }
            Ok(Some(GameInfo {
                name: name.to_string(),
                platform: Some("PC".to_string()),
                release_year: Some(1998),
                twitch_name: None,
            }))
        }
    }

    async fn wait_for_hit(lookup: &GameLookup, name: &str) -> GameInfo {
        for _ in 0..100 {
            if let Some(info) = lookup.get(name) {
                return info;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("lookup never completed for {}", name);
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let calls = Arc::new(AtomicUsize::new(0));
        let lookup = GameLookup::new(
            FakeClient {
                calls: Arc::clone(&calls),
            },
            Duration::from_millis(1),
        );

        // First call is an immediate miss that enqueues the lookup.
        assert!(lookup.get("Mega Game").is_none());

        let info = wait_for_hit(&lookup, "Mega Game").await;
        assert_eq!(info.platform.as_deref(), Some("PC"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_in_flight_requests_not_duplicated() {
        let calls = Arc::new(AtomicUsize::new(0));
        let lookup = GameLookup::new(
            FakeClient {
                calls: Arc::clone(&calls),
            },
            Duration::from_millis(50),
        );

        // Repeated misses while the worker is busy enqueue only once.
        assert!(lookup.get("Mega Game").is_none());
        assert!(lookup.get("mega game").is_none());
        assert!(lookup.get("  MEGA GAME ").is_none());

        wait_for_hit(&lookup, "Mega Game").await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cached_hit_issues_no_upstream_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let lookup = GameLookup::new(
            FakeClient {
                calls: Arc::clone(&calls),
            },
            Duration::from_millis(1),
        );

        lookup.get("Mega Game");
        wait_for_hit(&lookup, "Mega Game").await;

        for _ in 0..5 {
            assert!(lookup.get("Mega Game").is_some());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
