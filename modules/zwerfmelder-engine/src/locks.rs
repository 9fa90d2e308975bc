//! Keyed async mutexes.
//!
//! Report insertion and the total recomputation of its bike group's counters
//! must not interleave with another write to the same group. Locks are held
//! per group id; writes to unrelated groups proceed concurrently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

#[derive(Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch (or create) the lock for one key. The returned handle is
    /// awaited outside the registry mutex so holders of different keys
    /// never contend.
    pub fn lock_for(&self, key: Uuid) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks.entry(key).or_default().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_key_serializes() {
        let locks = KeyedLocks::new();
        let key = Uuid::new_v4();

        let handle = locks.lock_for(key);
        let guard = handle.lock().await;

        let second = locks.lock_for(key);
        assert!(second.try_lock().is_err());
        drop(guard);
        assert!(second.try_lock().is_ok());
    }

    #[tokio::test]
    async fn different_keys_do_not_contend() {
        let locks = KeyedLocks::new();

        let first = locks.lock_for(Uuid::new_v4());
        let _guard = first.lock().await;

        let second = locks.lock_for(Uuid::new_v4());
        assert!(second.try_lock().is_ok());
    }
}
