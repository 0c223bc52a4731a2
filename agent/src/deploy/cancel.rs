//! Cancellation registry

use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, info};

/// Outstanding cancel requests keyed by deployment id
///
/// A request stays registered until it preempts a deployment or its
/// time-to-live elapses, so ids reused by the backend later on are not
/// treated as canceled forever.
#[derive(Debug)]
pub struct CancellationRegistry {
    requests: DashMap<i64, Instant>,
    ttl: Duration,
}

impl CancellationRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            requests: DashMap::new(),
            ttl,
        }
    }

    /// Register a cancel request; always acknowledged
    pub fn request_cancel(&self, id: i64) -> bool {
        self.prune_expired();
        self.requests.insert(id, Instant::now());
        info!(request_id = id, "Cancel requested");
        true
    }

    /// Whether a live cancel request exists for the id
    pub fn is_canceled(&self, id: i64) -> bool {
        self.requests
            .get(&id)
            .map(|requested_at| requested_at.elapsed() < self.ttl)
            .unwrap_or(false)
    }

    /// Check for a live cancel request and remove it when found
    pub fn take(&self, id: i64) -> bool {
        match self.requests.remove(&id) {
            Some((_, requested_at)) => requested_at.elapsed() < self.ttl,
            None => false,
        }
    }

    /// Drop requests older than the time-to-live
    pub fn prune_expired(&self) -> usize {
        let before = self.requests.len();
        self.requests
            .retain(|_, requested_at| requested_at.elapsed() < self.ttl);
        let pruned = before.saturating_sub(self.requests.len());
        if pruned > 0 {
            debug!("Pruned {} expired cancel requests", pruned);
        }
        pruned
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

impl Default for CancellationRegistry {
    fn default() -> Self {
        Self::new(Duration::from_secs(3600))
    }
}
