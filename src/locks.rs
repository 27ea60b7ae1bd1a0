use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::model::RoomId;

/// Per-room exclusive locks, created lazily on first use and kept for the
/// life of the registry. Entries are never evicted; the registry is
/// bounded by the number of distinct room ids, which is small and static
/// in this domain.
pub struct LockRegistry {
    locks: DashMap<RoomId, Arc<Mutex<()>>>,
}

impl Default for LockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LockRegistry {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Acquire the exclusive lock for `key`, suspending (not spinning)
    /// until the current holder releases it. No timeout; no FIFO
    /// guarantee beyond mutual exclusion.
    ///
    /// The returned guard releases on drop, so every exit path of the
    /// caller's critical section — success, error, or panic — releases
    /// the lock.
    pub async fn acquire(&self, key: RoomId) -> OwnedMutexGuard<()> {
        // Clone the Arc out before awaiting: the map shard stays locked
        // only for the entry lookup, never across a suspension point.
        let lock = self
            .locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();
        lock.lock_owned().await
    }

    /// Number of distinct keys ever locked.
    pub fn registered(&self) -> usize {
        self.locks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio::time::timeout;

    #[tokio::test]
    async fn lazily_creates_and_reuses_locks() {
        let registry = LockRegistry::new();
        assert_eq!(registry.registered(), 0);

        drop(registry.acquire(1).await);
        drop(registry.acquire(1).await);
        assert_eq!(registry.registered(), 1);

        drop(registry.acquire(2).await);
        assert_eq!(registry.registered(), 2);
    }

    #[tokio::test]
    async fn same_key_is_mutually_exclusive() {
        let registry = Arc::new(LockRegistry::new());
        let counter = Arc::new(AtomicUsize::new(0));

        // Read-modify-write with a yield in the middle: lost updates
        // would show up without mutual exclusion.
        let mut tasks = Vec::new();
        for _ in 0..32 {
            let registry = registry.clone();
            let counter = counter.clone();
            tasks.push(tokio::spawn(async move {
                let _guard = registry.acquire(7).await;
                let seen = counter.load(Ordering::SeqCst);
                tokio::task::yield_now().await;
                counter.store(seen + 1, Ordering::SeqCst);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 32);
    }

    #[tokio::test]
    async fn same_key_blocks_until_released() {
        let registry = Arc::new(LockRegistry::new());
        let guard = registry.acquire(1).await;

        let pending = timeout(Duration::from_millis(50), registry.acquire(1)).await;
        assert!(pending.is_err(), "second acquire should block");

        drop(guard);
        let reacquired = timeout(Duration::from_millis(50), registry.acquire(1)).await;
        assert!(reacquired.is_ok());
    }

    #[tokio::test]
    async fn different_keys_do_not_block_each_other() {
        let registry = Arc::new(LockRegistry::new());
        let _guard = registry.acquire(1).await;

        let other = timeout(Duration::from_millis(50), registry.acquire(2)).await;
        assert!(other.is_ok(), "different key must be acquirable");
    }

    #[tokio::test]
    async fn released_on_error_exit_path() {
        let registry = Arc::new(LockRegistry::new());

        async fn failing_section(registry: &LockRegistry) -> Result<(), &'static str> {
            let _guard = registry.acquire(1).await;
            Err("critical section failed")
        }

        assert!(failing_section(&registry).await.is_err());
        // The guard must have been dropped on the error path.
        let reacquired = timeout(Duration::from_millis(50), registry.acquire(1)).await;
        assert!(reacquired.is_ok());
    }
}
