//! ---
//! prov_section: "01-core-functionality"
//! prov_subsection: "module"
//! prov_type: "source"
//! prov_scope: "code"
//! prov_description: "Per-project serialisation of mutating runs."
//! prov_version: "v0.0.0-prealpha"
//! prov_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockMap = HashMap<String, Arc<AsyncMutex<()>>>;

/// Serialises runs that touch the same project key. Runs on distinct keys
/// proceed in parallel.
#[derive(Debug, Clone, Default)]
pub struct ProjectLocks {
    inner: Arc<Mutex<LockMap>>,
}

impl ProjectLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: &str) -> ProjectGuard {
        let lock = self
            .inner
            .lock()
            .entry(key.to_owned())
            .or_default()
            .clone();
        let guard = lock.lock_owned().await;
        ProjectGuard {
            key: key.to_owned(),
            locks: self.inner.clone(),
            _guard: guard,
        }
    }

    /// Number of keys with a live lock entry.
    pub fn tracked(&self) -> usize {
        self.inner.lock().len()
    }
}

pub struct ProjectGuard {
    key: String,
    locks: Arc<Mutex<LockMap>>,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for ProjectGuard {
    fn drop(&mut self) {
        let mut map = self.locks.lock();
        // Only the map and this guard hold the mutex: nobody is waiting.
        if map
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) == 2)
        {
            map.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_is_exclusive() {
        let locks = ProjectLocks::new();
        let first = locks.acquire("TESTP").await;
        let blocked =
            tokio::time::timeout(Duration::from_millis(50), locks.acquire("TESTP")).await;
        assert!(blocked.is_err());
        drop(first);
        let again = tokio::time::timeout(Duration::from_millis(50), locks.acquire("TESTP")).await;
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn distinct_keys_do_not_block() {
        let locks = ProjectLocks::new();
        let _a = locks.acquire("A").await;
        let b = tokio::time::timeout(Duration::from_millis(50), locks.acquire("B")).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn released_entries_are_pruned() {
        let locks = ProjectLocks::new();
        {
            let _guard = locks.acquire("TESTP").await;
            assert_eq!(locks.tracked(), 1);
        }
        assert_eq!(locks.tracked(), 0);
    }
}
