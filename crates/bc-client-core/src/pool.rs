//! Bounded pool of authenticated sessions with acquire/release, queued
//! acquirers with timeout, and idempotent shutdown. See spec.md §5.
//!
//! Generalizes the teacher's idle/pending connection bookkeeping
//! (`ironposh-client-core::connector::conntion_pool::ConnectionPool`) from a
//! synchronous id-state map to an async semaphore-gated pool of owned
//! session values.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{info, instrument};

use crate::error::BcClientError;

type SessionFactory<T> = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = Result<T, BcClientError>> + Send>> + Send + Sync>;

struct Inner<T> {
    idle: Mutex<VecDeque<T>>,
    semaphore: Arc<Semaphore>,
    factory: SessionFactory<T>,
    shutting_down: AtomicBool,
    max_connections: usize,
    queued: AtomicUsize,
}

/// Read-only point-in-time view of pool occupancy, mirroring the teacher's
/// `ConnectionPool` idle/pending bookkeeping for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionPoolStats {
    /// Sessions currently checked out (a live `PoolGuard` exists).
    pub active: usize,
    /// Sessions released and waiting to be reused.
    pub idle: usize,
    /// Acquirers currently blocked waiting for a permit.
    pub queued: usize,
}

/// A pool of `T` (typically a connected `SessionManager` plus whatever
/// transport handle it owns), bounded by `max_connections`.
pub struct SessionPool<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for SessionPool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> SessionPool<T> {
    /// `min_connections` is eagerly warmed on construction; `max_connections`
    /// bounds how many sessions can be checked out (idle + in-use) at once.
    pub async fn new<F, Fut>(min_connections: usize, max_connections: usize, factory: F) -> Result<Self, BcClientError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BcClientError>> + Send + 'static,
    {
        let factory: SessionFactory<T> = Arc::new(move || Box::pin(factory()));
        let inner = Arc::new(Inner {
            idle: Mutex::new(VecDeque::new()),
            semaphore: Arc::new(Semaphore::new(max_connections)),
            factory,
            shutting_down: AtomicBool::new(false),
            max_connections,
            queued: AtomicUsize::new(0),
        });
        let pool = Self { inner };

        for _ in 0..min_connections.min(max_connections) {
            let guard = pool.acquire(Duration::from_secs(30)).await?;
            pool.inner.idle.lock().expect("pool idle queue poisoned").push_back(guard.into_inner());
        }

        Ok(pool)
    }

    /// Check out a session, waiting up to `timeout` for a permit if the pool
    /// is at capacity. Rejects immediately if [`Self::shutdown`] has run.
    #[instrument(skip(self))]
    pub async fn acquire(&self, timeout: Duration) -> Result<PoolGuard<T>, BcClientError> {
        if self.inner.shutting_down.load(Ordering::SeqCst) {
            return Err(BcClientError::Shutdown("pool is shutting down, no new acquisitions accepted".to_string()));
        }

        self.inner.queued.fetch_add(1, Ordering::SeqCst);
        let wait = tokio::time::timeout(timeout, Arc::clone(&self.inner.semaphore).acquire_owned()).await;
        self.inner.queued.fetch_sub(1, Ordering::SeqCst);

        let permit = match wait {
            Ok(Ok(permit)) => permit,
            Ok(Err(_closed)) => {
                return Err(BcClientError::Shutdown("pool semaphore closed during shutdown".to_string()));
            }
            Err(_elapsed) => {
                return Err(BcClientError::Timeout {
                    operation: "pool_acquire".to_string(),
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                });
            }
        };

        let existing = self.inner.idle.lock().expect("pool idle queue poisoned").pop_front();
        let session = match existing {
            Some(session) => session,
            None => (self.inner.factory)().await?,
        };

        Ok(PoolGuard {
            session: Some(session),
            pool: Arc::clone(&self.inner),
            _permit: permit,
        })
    }

    /// Reject all queued and future acquirers; sessions already checked out
    /// finish normally and are dropped (not returned to the idle queue) on
    /// release. Calling this more than once is a no-op.
    #[instrument(skip(self))]
    pub fn shutdown(&self) {
        if self.inner.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.semaphore.close();
        self.inner.idle.lock().expect("pool idle queue poisoned").clear();
        info!("session pool shut down");
    }

    #[must_use]
    pub fn max_connections(&self) -> usize {
        self.inner.max_connections
    }

    /// Point-in-time occupancy snapshot. No lock is held across the read of
    /// `idle` and the semaphore/queued counters, so under concurrent
    /// acquire/release this is a best-effort snapshot, not a transaction.
    #[must_use]
    pub fn stats(&self) -> ConnectionPoolStats {
        let idle = self.inner.idle.lock().expect("pool idle queue poisoned").len();
        let active = self.inner.max_connections.saturating_sub(self.inner.semaphore.available_permits());
        let queued = self.inner.queued.load(Ordering::SeqCst);
        ConnectionPoolStats { active, idle, queued }
    }
}

/// An owned session on loan from the pool. On drop, returns the session to
/// the idle queue unless the pool has since been shut down.
pub struct PoolGuard<T> {
    session: Option<T>,
    pool: Arc<Inner<T>>,
    _permit: tokio::sync::OwnedSemaphorePermit,
}

impl<T> PoolGuard<T> {
    fn into_inner(mut self) -> T {
        self.session.take().expect("guard session taken twice")
    }
}

impl<T> std::ops::Deref for PoolGuard<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.session.as_ref().expect("guard session already dropped")
    }
}

impl<T> std::ops::DerefMut for PoolGuard<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.session.as_mut().expect("guard session already dropped")
    }
}

impl<T> Drop for PoolGuard<T> {
    fn drop(&mut self) {
        if self.pool.shutting_down.load(Ordering::SeqCst) {
            return;
        }
        if let Some(session) = self.session.take() {
            self.pool.idle.lock().expect("pool idle queue poisoned").push_back(session);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn warms_min_connections_without_exceeding_max() {
        let created = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&created);
        let pool: SessionPool<u32> = SessionPool::new(2, 4, move || {
            let counter = Arc::clone(&counter);
            async move { Ok(counter.fetch_add(1, Ordering::SeqCst) as u32) }
        })
        .await
        .unwrap();

        assert_eq!(created.load(Ordering::SeqCst), 2);
        assert_eq!(pool.max_connections(), 4);
    }

    #[tokio::test]
    async fn acquire_reuses_released_session() {
        let created = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&created);
        let pool: SessionPool<u32> = SessionPool::new(0, 1, move || {
            let counter = Arc::clone(&counter);
            async move { Ok(counter.fetch_add(1, Ordering::SeqCst) as u32) }
        })
        .await
        .unwrap();

        {
            let _guard = pool.acquire(Duration::from_secs(1)).await.unwrap();
        }
        let _guard = pool.acquire(Duration::from_secs(1)).await.unwrap();

        assert_eq!(created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn acquire_times_out_when_pool_is_exhausted() {
        let pool: SessionPool<u32> = SessionPool::new(0, 1, || async { Ok(0u32) }).await.unwrap();
        let _held = pool.acquire(Duration::from_secs(1)).await.unwrap();

        let result = pool.acquire(Duration::from_millis(20)).await;
        assert!(matches!(result, Err(BcClientError::Timeout { .. })));
    }

    #[tokio::test]
    async fn stats_reports_active_and_idle_counts() {
        let pool: SessionPool<u32> = SessionPool::new(1, 2, || async { Ok(0u32) }).await.unwrap();

        let stats = pool.stats();
        assert_eq!(stats.active, 0);
        assert_eq!(stats.idle, 1);
        assert_eq!(stats.queued, 0);

        let guard = pool.acquire(Duration::from_secs(1)).await.unwrap();
        let stats = pool.stats();
        assert_eq!(stats.active, 1);
        assert_eq!(stats.idle, 0);

        drop(guard);
        let stats = pool.stats();
        assert_eq!(stats.active, 0);
        assert_eq!(stats.idle, 1);
    }

    #[tokio::test]
    async fn shutdown_rejects_queued_and_future_acquirers() {
        let pool: SessionPool<u32> = SessionPool::new(0, 1, || async { Ok(0u32) }).await.unwrap();
        let held = pool.acquire(Duration::from_secs(1)).await.unwrap();

        let pool_clone = pool.clone();
        let waiter = tokio::spawn(async move { pool_clone.acquire(Duration::from_secs(5)).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        pool.shutdown();
        drop(held);

        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(BcClientError::Shutdown(_))));

        let result = pool.acquire(Duration::from_secs(1)).await;
        assert!(matches!(result, Err(BcClientError::Shutdown(_))));
    }
}
