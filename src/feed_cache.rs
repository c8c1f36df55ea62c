// src/feed_cache.rs
//! In-process TTL cache. Between refresh cycles this is the authoritative
//! answer for the API layer: the last clustered feed (short TTL) and
//! per-story synthesis text (longer TTL, keyed by cluster hash).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::cluster::Cluster;

pub const FEED_TTL: Duration = Duration::from_secs(15 * 60);
pub const SYNTHESIS_TTL: Duration = Duration::from_secs(60 * 60);

pub struct FeedCache {
    feed: Mutex<Option<(Instant, Vec<Cluster>)>>,
    synthesis: Mutex<HashMap<String, (Instant, String)>>,
    feed_ttl: Duration,
    synthesis_ttl: Duration,
}

impl Default for FeedCache {
    fn default() -> Self {
        Self::new(FEED_TTL, SYNTHESIS_TTL)
    }
}

impl FeedCache {
    pub fn new(feed_ttl: Duration, synthesis_ttl: Duration) -> Self {
        Self {
            feed: Mutex::new(None),
            synthesis: Mutex::new(HashMap::new()),
            feed_ttl,
            synthesis_ttl,
        }
    }

    pub fn put_feed(&self, clusters: Vec<Cluster>) {
        let mut guard = self.feed.lock().expect("feed cache poisoned");
        *guard = Some((Instant::now(), clusters));
    }

    pub fn feed(&self) -> Option<Vec<Cluster>> {
        let guard = self.feed.lock().expect("feed cache poisoned");
        match guard.as_ref() {
            Some((at, clusters)) if at.elapsed() < self.feed_ttl => Some(clusters.clone()),
            _ => None,
        }
    }

    pub fn put_synthesis(&self, cluster_hash: &str, text: String) {
        let mut guard = self.synthesis.lock().expect("synthesis cache poisoned");
        guard.insert(cluster_hash.to_string(), (Instant::now(), text));
        // Opportunistic sweep so dead stories do not accumulate.
        let ttl = self.synthesis_ttl;
        guard.retain(|_, (at, _)| at.elapsed() < ttl);
    }

    pub fn synthesis(&self, cluster_hash: &str) -> Option<String> {
        let guard = self.synthesis.lock().expect("synthesis cache poisoned");
        match guard.get(cluster_hash) {
            Some((at, text)) if at.elapsed() < self.synthesis_ttl => Some(text.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_entries_read_as_absent() {
        let cache = FeedCache::new(Duration::from_millis(0), Duration::from_millis(0));
        cache.put_feed(Vec::new());
        std::thread::sleep(Duration::from_millis(2));
        assert!(cache.feed().is_none());

        cache.put_synthesis("h", "text".into());
        std::thread::sleep(Duration::from_millis(2));
        assert!(cache.synthesis("h").is_none());
    }

    #[test]
    fn fresh_entries_are_served() {
        let cache = FeedCache::default();
        cache.put_synthesis("h", "deep dive".into());
        assert_eq!(cache.synthesis("h").as_deref(), Some("deep dive"));
        assert!(cache.synthesis("other").is_none());
    }
}
