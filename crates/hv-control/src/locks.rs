//! Per-instance serialization for mutating calls (§5: "mutating operations
//! are serialised at the controller by an in-memory lock keyed by id, so
//! callers see linearisable behaviour even when concurrent").

use std::collections::HashMap;
use std::sync::Arc;

use hv_core::InstanceId;
use tokio::sync::Mutex;

/// A map of per-instance mutexes, created lazily on first use and evicted
/// once no caller holds a reference.
#[derive(Default)]
pub struct InstanceLocks {
    shards: parking_lot::Mutex<HashMap<InstanceId, Arc<Mutex<()>>>>,
}

impl InstanceLocks {
    /// Build an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shards: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Acquire the lock for `instance_id`, blocking other callers on the
    /// same id until the returned guard is dropped.
    pub async fn lock(&self, instance_id: InstanceId) -> tokio::sync::OwnedMutexGuard<()> {
        let shard = self
            .shards
            .lock()
            .entry(instance_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        shard.lock_owned().await
    }

    /// Drop the shard for `instance_id` if nothing else holds a reference
    /// to it. Safe to call opportunistically; a false negative just leaves
    /// an unused entry around until the next call after the lock is free.
    pub fn sweep(&self, instance_id: InstanceId) {
        let mut shards = self.shards.lock();
        if let Some(shard) = shards.get(&instance_id) {
            if Arc::strong_count(shard) == 1 {
                shards.remove(&instance_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_instance_serializes() {
        let locks = InstanceLocks::new();
        let id = InstanceId::generate();

        let first = locks.lock(id).await;
        let locks = Arc::new(locks);
        let locks2 = locks.clone();
        let handle = tokio::spawn(async move {
            let _second = locks2.lock(id).await;
        });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!handle.is_finished());
        drop(first);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn sweep_removes_unreferenced_shard() {
        let locks = InstanceLocks::new();
        let id = InstanceId::generate();
        {
            let _guard = locks.lock(id).await;
        }
        locks.sweep(id);
        assert!(locks.shards.lock().is_empty());
    }
}
