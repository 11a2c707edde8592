//! Per-path async locks.
//!
//! The virtual key store and the namespace manager both serialize mutating
//! operations on the same logical path while letting disjoint paths proceed
//! in parallel. This module provides the shared lock table: a lazily grown
//! map from path to an `Arc<Mutex<()>>` whose guard is held for the duration
//! of the operation.
//!
//! Lock entries are never removed; the set of distinct paths a process
//! touches is bounded by its working set, and a stale entry is a single
//! `Arc` + mutex.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// A table of per-path async mutexes.
#[derive(Debug, Default)]
pub(crate) struct PathLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl PathLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `path`, creating it on first use.
    ///
    /// The returned guard releases the lock on drop. Callers that lock more
    /// than one path must acquire deeper paths first to keep the global
    /// acquisition order acyclic.
    pub(crate) async fn acquire(&self, path: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut table = self.inner.lock().await;
            Arc::clone(
                table
                    .entry(path.to_owned())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn same_path_serializes() {
        let locks = Arc::new(PathLocks::new());
        let guard = locks.acquire("a/b").await;

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.acquire("a/b").await;
            })
        };

        // The contender cannot finish while the guard is held.
        tokio::task::yield_now().await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.expect("contender task panicked");
    }

    #[tokio::test]
    async fn disjoint_paths_do_not_block() {
        let locks = PathLocks::new();
        let _a = locks.acquire("a").await;
        // Completes immediately despite `a` being held.
        let _b = locks.acquire("b").await;
    }
}
