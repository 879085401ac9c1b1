//! Per-key execution guard
//!
//! [`Guardian`] serializes tasks that share a string key, typically an
//! account id. Concurrent executions against one account queue behind a
//! per-key async mutex while unrelated accounts proceed in parallel.

use cobro_core::error::AppError;
use cobro_core::AppResult;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Registry of per-key async locks
#[derive(Default)]
pub struct Guardian {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Guardian {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock();
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Run `task` while holding the key's lock
    pub async fn guard<F, Fut, T>(&self, key: &str, task: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let lock = self.lock_for(key);
        let _held = lock.lock().await;
        task().await
    }

    /// Run `task` while holding the key's lock, bounding how long the
    /// caller waits for the lock
    ///
    /// The timeout covers lock acquisition only: once the task starts it
    /// runs to completion, so a slow predecessor fails this caller rather
    /// than leaving a half-applied mutation behind.
    pub async fn guard_timed<F, Fut, T>(
        &self,
        key: &str,
        timeout: Duration,
        task: F,
    ) -> AppResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let lock = self.lock_for(key);
        let held = tokio::time::timeout(timeout, lock.lock())
            .await
            .map_err(|_| AppError::GuardTimeout(key.to_string()))?;
        let result = task().await;
        drop(held);
        result
    }

    /// Drop locks nobody is waiting on
    pub fn purge_idle(&self) {
        let mut locks = self.locks.lock();
        let before = locks.len();
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        let purged = before - locks.len();
        if purged > 0 {
            debug!(purged, "purged idle guard locks");
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_guard_serializes_same_key() {
        let guardian = Arc::new(Guardian::new());
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let guardian = guardian.clone();
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                guardian
                    .guard("1001", || async {
                        let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(current, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(2)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_guard_timed_expires() {
        let guardian = Arc::new(Guardian::new());
        let blocker = guardian.lock_for("1001");
        let _held = blocker.lock().await;

        let err = guardian
            .guard_timed("1001", Duration::from_millis(10), || async { Ok(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::GuardTimeout(key) if key == "1001"));

        // a different key is unaffected
        guardian
            .guard_timed("1002", Duration::from_millis(10), || async { Ok(()) })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_purge_idle() {
        let guardian = Guardian::new();
        guardian.guard("1001", || async {}).await;
        guardian.guard("1002", || async {}).await;
        assert_eq!(guardian.len(), 2);
        guardian.purge_idle();
        assert_eq!(guardian.len(), 0);
    }
}
