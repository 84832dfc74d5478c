// Request Coalescing Module
//
// Deduplicates concurrent cache misses for the same key.
// When several clients miss the same (hostname, path) at once:
// - First request (leader): fetches upstream, populates the cache, drops its guard
// - Other requests (followers): wait for the leader, then read from the cache
// The lock only guards the in-flight map, never the fetch itself.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::cache::CacheKey;

/// Tracks in-flight cache population per key
#[derive(Debug, Clone, Default)]
pub struct RequestCoalescer {
    in_flight: Arc<Mutex<HashMap<CacheKey, watch::Sender<bool>>>>,
}

impl RequestCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Become the leader for `key`, or wait for the current leader.
    ///
    /// Returns `Leader` immediately when nobody is fetching the key. Returns
    /// `Follower` only after the leader's guard has been dropped, whether the
    /// leader succeeded or not.
    pub async fn acquire(&self, key: &CacheKey) -> CoalescingSlot {
        let mut receiver = {
            let mut in_flight = self.in_flight.lock();
            match in_flight.get(key) {
                Some(sender) => sender.subscribe(),
                None => {
                    let (tx, _rx) = watch::channel(false);
                    in_flight.insert(key.clone(), tx);
                    return CoalescingSlot::Leader(LeaderGuard {
                        key: key.clone(),
                        coalescer: self.clone(),
                    });
                }
            }
        };

        // Err means the sender is gone, which also signals completion
        let _ = receiver.wait_for(|&completed| completed).await;
        CoalescingSlot::Follower
    }

    /// Number of keys currently being populated
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    fn complete(&self, key: &CacheKey) {
        if let Some(sender) = self.in_flight.lock().remove(key) {
            let _ = sender.send(true);
        }
    }
}

/// Result of acquiring a coalescing slot
#[derive(Debug)]
pub enum CoalescingSlot {
    /// Fetch upstream and populate the cache; followers are released when
    /// the guard drops.
    Leader(LeaderGuard),

    /// Another request held the key and has finished. Re-check the cache.
    Follower,
}

impl CoalescingSlot {
    pub fn is_leader(&self) -> bool {
        matches!(self, CoalescingSlot::Leader(_))
    }

    pub fn is_follower(&self) -> bool {
        matches!(self, CoalescingSlot::Follower)
    }
}

/// Held by the leader; dropping it (on any exit path) releases followers
#[derive(Debug)]
pub struct LeaderGuard {
    key: CacheKey,
    coalescer: RequestCoalescer,
}

impl Drop for LeaderGuard {
    fn drop(&mut self) {
        self.coalescer.complete(&self.key);
    }
}
