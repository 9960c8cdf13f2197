//! Per-case write serialization.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use divel_types::CaseId;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::JoinError;

/// Exclusive write locks keyed by case id.
///
/// Appends to one case run one at a time; appends to different cases do
/// not contend beyond a brief map lookup. Lock entries are created on
/// demand and dropped again once no writer holds or awaits them.
#[derive(Default)]
pub struct CaseLocks {
    locks: Mutex<HashMap<CaseId, Arc<AsyncMutex<()>>>>,
}

impl CaseLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive write access to `case_id`.
    ///
    /// The lock is released when the returned guard drops, on every exit
    /// path including errors and cancellation.
    pub async fn acquire(&self, case_id: &CaseId) -> CaseGuard<'_> {
        let lock = {
            let mut map = self.map();
            Arc::clone(map.entry(case_id.clone()).or_default())
        };
        let guard = lock.lock_owned().await;
        CaseGuard {
            locks: self,
            case_id: case_id.clone(),
            guard: Some(guard),
        }
    }

    /// Number of cases with a live lock entry.
    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // The map only ever holds complete entries, so a poisoned lock is
    // still consistent.
    fn map(&self) -> MutexGuard<'_, HashMap<CaseId, Arc<AsyncMutex<()>>>> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Held while appending to one case.
pub struct CaseGuard<'a> {
    locks: &'a CaseLocks,
    case_id: CaseId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl CaseGuard<'_> {
    pub fn case_id(&self) -> &CaseId {
        &self.case_id
    }

    /// Run blocking `work` on the blocking pool with the case lock moved
    /// into it. If the caller is cancelled the lock stays held until
    /// `work` finishes, so no other writer observes its effects half done.
    pub(crate) async fn run_blocking<T, F>(&mut self, work: F) -> Result<T, JoinError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let held = self.guard.take();
        let (output, held) = tokio::task::spawn_blocking(move || (work(), held)).await?;
        self.guard = held;
        Ok(output)
    }
}

impl Drop for CaseGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut map = self.locks.map();
        if let Some(lock) = map.get(&self.case_id) {
            // Only the map itself still references the lock.
            if Arc::strong_count(lock) == 1 {
                map.remove(&self.case_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn case(id: &str) -> CaseId {
        CaseId::new(id).unwrap()
    }

    #[tokio::test]
    async fn entries_are_pruned_after_release() {
        let locks = CaseLocks::new();
        {
            let guard = locks.acquire(&case("C1")).await;
            assert_eq!(guard.case_id(), &case("C1"));
            assert_eq!(locks.len(), 1);
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn different_cases_do_not_block() {
        let locks = CaseLocks::new();
        let _a = locks.acquire(&case("C1")).await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.acquire(&case("C2"))).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn same_case_waits_for_release() {
        let locks = CaseLocks::new();
        let a = locks.acquire(&case("C1")).await;
        let blocked =
            tokio::time::timeout(Duration::from_millis(50), locks.acquire(&case("C1"))).await;
        assert!(blocked.is_err());
        // The abandoned waiter must not leave the entry pinned.
        drop(a);
        assert!(locks.is_empty());
        let again =
            tokio::time::timeout(Duration::from_millis(100), locks.acquire(&case("C1"))).await;
        assert!(again.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn serializes_concurrent_holders() {
        let locks = Arc::new(CaseLocks::new());
        let active = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..16 {
            let locks = Arc::clone(&locks);
            let active = Arc::clone(&active);
            tasks.spawn(async move {
                let _g = locks.acquire(&CaseId::new("C1").unwrap()).await;
                let now = active.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                assert_eq!(now, 0);
                tokio::time::sleep(Duration::from_millis(2)).await;
                active.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
            });
        }
        while let Some(res) = tasks.join_next().await {
            res.unwrap();
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn blocking_work_keeps_the_case_locked() {
        let locks = CaseLocks::new();
        let mut guard = locks.acquire(&case("C1")).await;
        let out = guard.run_blocking(|| 6 * 7).await.unwrap();
        assert_eq!(out, 42);

        // The lock came back to the guard.
        assert!(
            tokio::time::timeout(Duration::from_millis(20), locks.acquire(&case("C1")))
                .await
                .is_err()
        );
        drop(guard);
        assert!(locks.is_empty());
    }
}
