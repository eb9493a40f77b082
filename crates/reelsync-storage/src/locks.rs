//! Per-sidecar locking.
//!
//! Two calls that would read or write the same `.progress` file take turns.
//! The map entry for a path lives only while someone holds or waits for it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One path's mutex and how many callers hold or await it.
struct Slot {
    lock: Arc<AsyncMutex<()>>,
    users: usize,
}

type LockMap = HashMap<PathBuf, Slot>;

/// Keyed lock set, one async mutex per sidecar path.
#[derive(Clone, Default)]
pub struct SidecarLocks {
    inner: Arc<Mutex<LockMap>>,
}

impl SidecarLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive use of `path`. Released when the guard drops.
    ///
    /// Dropping the returned future while it waits gives up the claim too.
    pub async fn acquire(&self, path: &Path) -> SidecarGuard {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            let slot = map.entry(path.to_path_buf()).or_insert_with(|| Slot {
                lock: Arc::default(),
                users: 0,
            });
            slot.users += 1;
            slot.lock.clone()
        };
        let claim = Claim {
            path: path.to_path_buf(),
            map: self.inner.clone(),
        };

        let guard = lock.lock_owned().await;
        tracing::trace!(path = %path.display(), "Sidecar lock acquired");

        SidecarGuard {
            _guard: guard,
            claim,
        }
    }

    /// Number of paths currently locked or awaited.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A registered interest in one path; evicts the entry when the last goes.
struct Claim {
    path: PathBuf,
    map: Arc<Mutex<LockMap>>,
}

impl Drop for Claim {
    fn drop(&mut self) {
        let mut map = self.map.lock().unwrap_or_else(PoisonError::into_inner);
        let idle = match map.get_mut(&self.path) {
            Some(slot) => {
                slot.users = slot.users.saturating_sub(1);
                slot.users == 0
            }
            None => false,
        };
        if idle {
            map.remove(&self.path);
            tracing::trace!(path = %self.path.display(), "Sidecar lock evicted");
        }
    }
}

/// Exclusive hold on one sidecar path.
pub struct SidecarGuard {
    // Field order matters: the mutex is released before the claim is dropped.
    _guard: OwnedMutexGuard<()>,
    claim: Claim,
}

impl SidecarGuard {
    pub fn path(&self) -> &Path {
        &self.claim.path
    }
}

impl std::fmt::Debug for SidecarGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SidecarGuard")
            .field("path", &self.claim.path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn entry_is_evicted_after_release() {
        let locks = SidecarLocks::new();
        {
            let guard = locks.acquire(Path::new("/v/a_b.mp4.progress")).await;
            assert_eq!(guard.path(), Path::new("/v/a_b.mp4.progress"));
            assert_eq!(locks.len(), 1);
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn same_path_is_serialized() {
        let locks = SidecarLocks::new();
        let path = PathBuf::from("/v/a_b.mp4.progress");

        let first = locks.acquire(&path).await;

        let waiter = {
            let locks = locks.clone();
            let path = path.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(&path).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(first);
        // The waiter still owns the entry, so it must not be evicted yet.
        waiter.await.unwrap();
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn different_paths_do_not_block() {
        let locks = SidecarLocks::new();
        let _a = locks.acquire(Path::new("/v/a_1.mp4.progress")).await;
        let _b = tokio::time::timeout(
            Duration::from_secs(1),
            locks.acquire(Path::new("/v/b_2.mp4.progress")),
        )
        .await
        .expect("independent path should not wait");
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn cancelled_waiter_does_not_leak_entry() {
        let locks = SidecarLocks::new();
        let path = PathBuf::from("/v/a_b.mp4.progress");

        let first = locks.acquire(&path).await;
        let waited =
            tokio::time::timeout(Duration::from_millis(20), locks.acquire(&path)).await;
        assert!(waited.is_err());
        assert_eq!(locks.len(), 1);

        drop(first);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn released_on_panic_path() {
        let locks = SidecarLocks::new();
        let path = PathBuf::from("/v/a_b.mp4.progress");
        let task = {
            let locks = locks.clone();
            let path = path.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(&path).await;
                panic!("transfer blew up");
            })
        };
        assert!(task.await.is_err());
        assert!(locks.is_empty());
        let _again = locks.acquire(&path).await;
    }
}
