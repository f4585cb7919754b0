use crate::error::{RegistryError, Result};
use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub const DEFAULT_POOL_SIZE: usize = 10;
pub const MAX_POOL_SIZE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of handles checked out at once
    pub max_handles: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_handles: DEFAULT_POOL_SIZE,
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn new(max_handles: usize) -> Self {
        Self {
            max_handles: max_handles.clamp(1, MAX_POOL_SIZE),
        }
    }

    /// Parse a pool size override; blank or unparsable input keeps the default.
    #[must_use]
    pub fn parse_max_handles(raw: Option<&str>, default_value: usize) -> usize {
        raw.map(str::trim)
            .filter(|v| !v.is_empty())
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(default_value)
            .clamp(1, MAX_POOL_SIZE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub limit: usize,
    pub in_flight: usize,
    pub waiters: usize,
    pub idle: usize,
}

type Factory<H> = Box<dyn Fn() -> Result<H> + Send + Sync>;

struct PoolInner<H> {
    semaphore: Arc<Semaphore>,
    idle: Mutex<Vec<H>>,
    factory: Factory<H>,
    limit: usize,
    in_flight: AtomicUsize,
    waiters: AtomicUsize,
}

/// A fixed-size pool of storage handles.
///
/// Handles are opened lazily through the factory, checked out with
/// [`Pool::acquire`], and returned when the [`PooledHandle`] guard drops.
pub struct Pool<H> {
    inner: Arc<PoolInner<H>>,
}

impl<H> Clone for Pool<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct WaiterGuard<'a>(&'a AtomicUsize);

impl<'a> WaiterGuard<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter)
    }
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

impl<H: Send + 'static> Pool<H> {
    pub fn new(
        config: PoolConfig,
        factory: impl Fn() -> Result<H> + Send + Sync + 'static,
    ) -> Self {
        let limit = config.max_handles.clamp(1, MAX_POOL_SIZE);
        Self {
            inner: Arc::new(PoolInner {
                semaphore: Arc::new(Semaphore::new(limit)),
                idle: Mutex::new(Vec::with_capacity(limit)),
                factory: Box::new(factory),
                limit,
                in_flight: AtomicUsize::new(0),
                waiters: AtomicUsize::new(0),
            }),
        }
    }

    /// Wait for a free slot and check out a handle.
    pub async fn acquire(&self) -> Result<PooledHandle<H>> {
        let waiter = WaiterGuard::new(&self.inner.waiters);
        let permit = Arc::clone(&self.inner.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| RegistryError::unavailable("connection pool is closed"))?;
        drop(waiter);

        let reused = self
            .inner
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        // The permit is released on the error path when it drops here.
        let handle = match reused {
            Some(handle) => handle,
            None => (self.inner.factory)()?,
        };

        self.inner.in_flight.fetch_add(1, Ordering::Relaxed);
        Ok(PooledHandle {
            handle: Some(handle),
            inner: Arc::clone(&self.inner),
            discard: false,
            _permit: permit,
        })
    }

    /// Refuse all further acquisitions. Handles already checked out stay valid.
    pub fn close(&self) {
        self.inner.semaphore.close();
        self.inner
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    #[must_use]
    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            limit: self.inner.limit,
            in_flight: self.inner.in_flight.load(Ordering::Relaxed),
            waiters: self.inner.waiters.load(Ordering::Relaxed),
            idle: self
                .inner
                .idle
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
        }
    }
}

/// A checked-out handle. Dropping it releases the pool slot; the handle goes
/// back to the idle list unless it was discarded or dropped during a panic.
pub struct PooledHandle<H> {
    handle: Option<H>,
    inner: Arc<PoolInner<H>>,
    discard: bool,
    _permit: OwnedSemaphorePermit,
}

impl<H> PooledHandle<H> {
    /// Do not return this handle to the pool; a fresh one is opened later.
    pub fn discard(&mut self) {
        self.discard = true;
    }
}

impl<H> Deref for PooledHandle<H> {
    type Target = H;

    fn deref(&self) -> &H {
        self.handle
            .as_ref()
            .unwrap_or_else(|| unreachable!("pooled handle used after release"))
    }
}

impl<H> DerefMut for PooledHandle<H> {
    fn deref_mut(&mut self) -> &mut H {
        self.handle
            .as_mut()
            .unwrap_or_else(|| unreachable!("pooled handle used after release"))
    }
}

impl<H> Drop for PooledHandle<H> {
    fn drop(&mut self) {
        self.inner.in_flight.fetch_sub(1, Ordering::Relaxed);
        let Some(handle) = self.handle.take() else {
            return;
        };
        if self.discard || std::thread::panicking() || self.inner.semaphore.is_closed() {
            return;
        }
        self.inner
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn counting_pool(limit: usize) -> (Pool<usize>, Arc<AtomicUsize>) {
        let opened = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&opened);
        let pool = Pool::new(PoolConfig::new(limit), move || {
            Ok(counter.fetch_add(1, Ordering::SeqCst))
        });
        (pool, opened)
    }

    #[test]
    fn parse_max_handles_defaults_and_clamps() {
        assert_eq!(PoolConfig::parse_max_handles(None, 10), 10);
        assert_eq!(PoolConfig::parse_max_handles(Some(""), 10), 10);
        assert_eq!(PoolConfig::parse_max_handles(Some("   "), 10), 10);
        assert_eq!(PoolConfig::parse_max_handles(Some("4"), 10), 4);
        assert_eq!(PoolConfig::parse_max_handles(Some("0"), 10), 1);
        assert_eq!(PoolConfig::parse_max_handles(Some("999"), 10), MAX_POOL_SIZE);
        assert_eq!(PoolConfig::parse_max_handles(Some("abc"), 10), 10);
        assert_eq!(PoolConfig::parse_max_handles(Some(" 5 "), 10), 5);
    }

    #[tokio::test]
    async fn handles_are_reused_after_release() {
        let (pool, opened) = counting_pool(2);
        {
            let first = pool.acquire().await.unwrap();
            assert_eq!(*first, 0);
            assert_eq!(pool.snapshot().in_flight, 1);
        }
        let again = pool.acquire().await.unwrap();
        assert_eq!(*again, 0);
        assert_eq!(opened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn discarded_handles_are_not_reused() {
        let (pool, opened) = counting_pool(1);
        {
            let mut handle = pool.acquire().await.unwrap();
            handle.discard();
        }
        let next = pool.acquire().await.unwrap();
        assert_eq!(*next, 1);
        assert_eq!(opened.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn acquire_waits_for_a_free_slot() {
        let (pool, _) = counting_pool(1);
        let held = pool.acquire().await.unwrap();

        let waiting = {
            let pool = pool.clone();
            tokio::spawn(async move { *pool.acquire().await.unwrap() })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(pool.snapshot().waiters, 1);
        assert!(!waiting.is_finished());

        drop(held);
        assert_eq!(waiting.await.unwrap(), 0);
        let snapshot = pool.snapshot();
        assert_eq!(snapshot.in_flight, 0);
        assert_eq!(snapshot.waiters, 0);
    }

    #[tokio::test]
    async fn factory_failure_releases_the_slot() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let pool: Pool<()> = Pool::new(PoolConfig::new(1), move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(RegistryError::unavailable("refused"))
            } else {
                Ok(())
            }
        });

        assert!(matches!(
            pool.acquire().await,
            Err(RegistryError::StorageUnavailable(_))
        ));
        assert!(pool.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn closed_pool_reports_unavailable() {
        let (pool, _) = counting_pool(1);
        pool.close();
        assert!(matches!(
            pool.acquire().await,
            Err(RegistryError::StorageUnavailable(_))
        ));
    }
}
