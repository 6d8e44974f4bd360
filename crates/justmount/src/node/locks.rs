//! Per-path serialization of mount operations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::mount::clean_path;

type LockMap = DashMap<PathBuf, Arc<Mutex<()>>>;

/// Async locks keyed by normalised path.
///
/// Held across check-then-mount sequences so two requests for the same path
/// cannot both observe "not mounted" and mount twice. Entries live only while
/// a holder or waiter references them.
#[derive(Debug, Clone)]
pub struct PathLocks {
    enabled: bool,
    locks: Arc<LockMap>,
}

/// Exclusive access to one path; released on drop.
#[derive(Debug)]
pub struct PathGuard {
    locks: Arc<LockMap>,
    key: PathBuf,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for PathGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // The map's own reference is the only one left when nobody waits.
        self.locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

impl PathLocks {
    /// Create a lock table; when disabled, [`PathLocks::lock`] is a no-op.
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Wait for exclusive access to `path`.
    pub async fn lock(&self, path: &Path) -> Option<PathGuard> {
        if !self.enabled {
            return None;
        }
        let key = clean_path(path);
        let mutex = self.locks.entry(key.clone()).or_default().clone();
        let guard = mutex.lock_owned().await;
        Some(PathGuard {
            locks: Arc::clone(&self.locks),
            key,
            guard: Some(guard),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_path_is_exclusive() {
        let locks = PathLocks::new(true);
        let guard = locks.lock(Path::new("/stage/v1")).await;
        assert!(guard.is_some());

        let contender = tokio::time::timeout(
            Duration::from_millis(50),
            locks.lock(Path::new("/stage/./v1")),
        )
        .await;
        assert!(contender.is_err());

        drop(guard);
        assert!(locks.lock(Path::new("/stage/v1")).await.is_some());
    }

    #[tokio::test]
    async fn different_paths_do_not_contend() {
        let locks = PathLocks::new(true);
        let _a = locks.lock(Path::new("/stage/a")).await;
        let b = tokio::time::timeout(Duration::from_millis(50), locks.lock(Path::new("/stage/b")))
            .await
            .unwrap();
        assert!(b.is_some());
    }

    #[tokio::test]
    async fn released_paths_leave_no_entries() {
        let locks = PathLocks::new(true);
        for i in 0..1000 {
            let guard = locks.lock(&PathBuf::from(format!("/pods/{i}/vol"))).await;
            assert!(guard.is_some());
        }
        assert!(locks.locks.is_empty());
    }

    #[tokio::test]
    async fn entry_survives_while_a_waiter_queues() {
        let locks = PathLocks::new(true);
        let first = locks.lock(Path::new("/pods/a/vol")).await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(Path::new("/pods/a/vol")).await;
                tokio::time::sleep(Duration::from_millis(20)).await;
            })
        };
        while locks
            .locks
            .get(Path::new("/pods/a/vol"))
            .is_some_and(|m| Arc::strong_count(m.value()) < 3)
        {
            tokio::task::yield_now().await;
        }

        drop(first);
        assert_eq!(locks.locks.len(), 1);

        waiter.await.unwrap();
        assert!(locks.locks.is_empty());
    }

    #[tokio::test]
    async fn disabled_locks_are_noops() {
        let locks = PathLocks::new(false);
        assert!(locks.lock(Path::new("/stage/v1")).await.is_none());
    }
}
