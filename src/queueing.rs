//! Named-queue occupancy tracking.
//!
//! Queue nodes need to know whether a named queue is full at the moment a
//! call arrives. The engine keeps its own occupancy registry rather than
//! asking the media collaborator, so the `onFull` decision is made
//! synchronously at node entry.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use crate::ShareLock;

/// (tenant id, queue id)
type QueueKey = (String, String);

/// Tracks how many calls are currently waiting in each named queue.
#[derive(Clone, Default)]
pub struct QueueRegistry {
    occupancy: ShareLock<HashMap<QueueKey, usize>>,
}

impl QueueRegistry {
    pub fn new() -> Self {
        Self {
            occupancy: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Join the queue if it has room. Returns `false` when `max_size` is
    /// set and already reached; the caller routes to `onFull`.
    pub fn try_join(
        &self,
        tenant_id: &str,
        queue_id: &str,
        max_size: Option<usize>,
    ) -> bool {
        let key = (tenant_id.to_string(), queue_id.to_string());
        let mut occupancy = self.occupancy.write().unwrap();
        let count = occupancy.entry(key).or_insert(0);
        if let Some(max) = max_size
            && *count >= max
        {
            return false;
        }
        *count += 1;
        true
    }

    /// Leave the queue. Callers must pair every successful `try_join`
    /// with exactly one `leave`, on every exit path.
    pub fn leave(
        &self,
        tenant_id: &str,
        queue_id: &str,
    ) {
        let key = (tenant_id.to_string(), queue_id.to_string());
        let mut occupancy = self.occupancy.write().unwrap();
        if let Some(count) = occupancy.get_mut(&key) {
            *count = count.saturating_sub(1);
        }
    }

    pub fn occupancy(
        &self,
        tenant_id: &str,
        queue_id: &str,
    ) -> usize {
        let key = (tenant_id.to_string(), queue_id.to_string());
        self.occupancy.read().unwrap().get(&key).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_respects_max_size() {
        let registry = QueueRegistry::new();
        assert!(registry.try_join("t", "sales", Some(2)));
        assert!(registry.try_join("t", "sales", Some(2)));
        assert!(!registry.try_join("t", "sales", Some(2)));
        assert_eq!(registry.occupancy("t", "sales"), 2);
    }

    #[test]
    fn test_leave_frees_a_slot() {
        let registry = QueueRegistry::new();
        assert!(registry.try_join("t", "sales", Some(1)));
        registry.leave("t", "sales");
        assert!(registry.try_join("t", "sales", Some(1)));
    }

    #[test]
    fn test_unbounded_queue_never_full() {
        let registry = QueueRegistry::new();
        for _ in 0..100 {
            assert!(registry.try_join("t", "support", None));
        }
        assert_eq!(registry.occupancy("t", "support"), 100);
    }

    #[test]
    fn test_queues_are_tenant_scoped() {
        let registry = QueueRegistry::new();
        assert!(registry.try_join("t1", "sales", Some(1)));
        assert!(registry.try_join("t2", "sales", Some(1)));
        assert!(!registry.try_join("t1", "sales", Some(1)));
    }

    #[test]
    fn test_leave_without_join_is_harmless() {
        let registry = QueueRegistry::new();
        registry.leave("t", "sales");
        assert_eq!(registry.occupancy("t", "sales"), 0);
    }
}
