//! Read-through cache collaborators.
//!
//! The client only talks to a [`CacheStore`]; eviction and expiry belong to the store.
//! [`MemoryStore`] is the in-process store shipped with the crate.

use async_trait::async_trait;
use futures::future::BoxFuture;
use mini_moka::sync::Cache;
use std::{
    collections::HashMap,
    fmt::Debug,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use crate::{error::Result, model::RawResponse};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache store unavailable: {0}")]
    Unavailable(String),

    #[error("Cache store failed to read '{key}': {reason}")]
    Read { key: String, reason: String },

    #[error("Cache store failed to write '{key}': {reason}")]
    Write { key: String, reason: String },
}

/// Deferred network fetch handed to [`CacheStore::fetch_or_compute`].
pub type ComputeFuture<'a> = BoxFuture<'a, Result<RawResponse>>;

#[async_trait]
pub trait CacheStore: Send + Sync + Debug {
    async fn read(&self, key: &str) -> Result<Option<RawResponse>, CacheError>;

    async fn write(&self, key: &str, value: RawResponse, ttl: Duration) -> Result<(), CacheError>;

    /// Return the stored value for `key`, or run `compute`, store its output for `ttl`
    /// and return it. Errors from `compute` are returned as-is and nothing is stored.
    ///
    /// The provided version is a plain read-then-write. Stores that can guarantee a
    /// single in-flight compute per key should override it.
    async fn fetch_or_compute<'a>(
        &self,
        key: &str,
        ttl: Duration,
        compute: ComputeFuture<'a>,
    ) -> Result<RawResponse> {
        if let Some(hit) = self.read(key).await? {
            return Ok(hit);
        }

        let value = compute.await?;
        if let Err(e) = self.write(key, value.clone(), ttl).await {
            warn!("Failed to store Xweather response in cache: {e}");
        }
        Ok(value)
    }
}

#[derive(Clone)]
struct Entry {
    value: RawResponse,
    expires_at: Instant,
}

/// In-memory store with per-entry expiry and single-flight computes.
pub struct MemoryStore {
    entries: Cache<String, Entry>,
    in_flight: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl MemoryStore {
    pub const DEFAULT_CAPACITY: u64 = 1_000;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(max_entries: u64) -> Self {
        Self {
            entries: Cache::builder().max_capacity(max_entries).build(),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    fn lookup(&self, key: &str) -> Option<RawResponse> {
        let key = key.to_string();
        let entry = self.entries.get(&key)?;
        if entry.expires_at > Instant::now() {
            Some(entry.value)
        } else {
            self.entries.invalidate(&key);
            None
        }
    }

    fn store(&self, key: &str, value: RawResponse, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        self.entries.insert(key.to_string(), Entry { value, expires_at });
    }

    fn key_lock(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        in_flight.entry(key.to_string()).or_default().clone()
    }
}

/// Holds a per-key lock and removes it from the in-flight map when the last holder
/// goes away, including when the owning future is dropped mid-compute.
struct InFlight<'a> {
    store: &'a MemoryStore,
    key: &'a str,
    lock: Arc<AsyncMutex<()>>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let lock = std::mem::take(&mut self.lock);
        let mut in_flight = self.store.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        // Only the map and this holder still reference it.
        if Arc::strong_count(&lock) == 2 {
            in_flight.remove(self.key);
        }
        drop(lock);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn read(&self, key: &str) -> Result<Option<RawResponse>, CacheError> {
        Ok(self.lookup(key))
    }

    async fn write(&self, key: &str, value: RawResponse, ttl: Duration) -> Result<(), CacheError> {
        self.store(key, value, ttl);
        Ok(())
    }

    async fn fetch_or_compute<'a>(
        &self,
        key: &str,
        ttl: Duration,
        compute: ComputeFuture<'a>,
    ) -> Result<RawResponse> {
        if let Some(hit) = self.lookup(key) {
            return Ok(hit);
        }

        let in_flight = InFlight { store: self, key, lock: self.key_lock(key) };
        let _guard = in_flight.lock.lock().await;

        // Another caller may have filled the entry while we waited.
        if let Some(hit) = self.lookup(key) {
            return Ok(hit);
        }

        debug!(key, "computing cache entry");
        let computed = compute.await;
        if let Ok(value) = &computed {
            self.store(key, value.clone(), ttl);
        }
        computed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TTL: Duration = Duration::from_secs(600);

    #[tokio::test]
    async fn read_returns_written_value() {
        let store = MemoryStore::new();
        store.write("k", RawResponse::ok("[]"), TTL).await.expect("write");

        let hit = store.read("k").await.expect("read");
        assert_eq!(hit, Some(RawResponse::ok("[]")));
        assert_eq!(store.read("missing").await.expect("read"), None);
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let store = MemoryStore::new();
        store.write("k", RawResponse::ok("[]"), Duration::from_millis(20)).await.expect("write");

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(store.read("k").await.expect("read"), None);
    }

    #[tokio::test]
    async fn fetch_or_compute_runs_compute_once_per_key() {
        let store = MemoryStore::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = store
                .fetch_or_compute(
                    "k",
                    TTL,
                    async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(RawResponse::ok("[1]"))
                    }
                    .boxed(),
                )
                .await
                .expect("fetch");
            assert_eq!(value.body, "[1]");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_share_a_single_compute() {
        let store = Arc::new(MemoryStore::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                store
                    .fetch_or_compute(
                        "shared",
                        TTL,
                        async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Ok(RawResponse::ok("[\"once\"]"))
                        }
                        .boxed(),
                    )
                    .await
            }));
        }

        for handle in handles {
            let value = handle.await.expect("join").expect("fetch");
            assert_eq!(value.body, "[\"once\"]");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(store.in_flight.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn cancelled_compute_releases_its_key() {
        let store = MemoryStore::new();

        let pending = store.fetch_or_compute(
            "k",
            TTL,
            futures::future::pending::<Result<RawResponse>>().boxed(),
        );
        let timed_out = tokio::time::timeout(Duration::from_millis(20), pending).await;
        assert!(timed_out.is_err());
        assert!(store.in_flight.lock().expect("lock").is_empty());

        let value = store
            .fetch_or_compute("k", TTL, async { Ok(RawResponse::ok("[2]")) }.boxed())
            .await
            .expect("later caller should not block");
        assert_eq!(value.body, "[2]");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancelled_waiter_releases_its_key() {
        let store = Arc::new(MemoryStore::new());
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let leader = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .fetch_or_compute(
                        "k",
                        TTL,
                        async move {
                            let _ = release_rx.await;
                            Ok(RawResponse::ok("[\"leader\"]"))
                        }
                        .boxed(),
                    )
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let waiter = store.fetch_or_compute("k", TTL, async { Ok(RawResponse::ok("[]")) }.boxed());
        assert!(tokio::time::timeout(Duration::from_millis(20), waiter).await.is_err());

        release_tx.send(()).expect("leader still waiting");
        let value = leader.await.expect("join").expect("fetch");
        assert_eq!(value.body, "[\"leader\"]");
        assert!(store.in_flight.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn failed_compute_is_not_stored() {
        let store = MemoryStore::new();

        let err = store
            .fetch_or_compute(
                "k",
                TTL,
                async { Err(Error::Status { status: 500, body: "boom".into() }) }.boxed(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Status { status: 500, .. }));
        assert_eq!(store.read("k").await.expect("read"), None);
    }

    #[derive(Debug, Default)]
    struct WriteFailingStore;

    #[async_trait]
    impl CacheStore for WriteFailingStore {
        async fn read(&self, _key: &str) -> Result<Option<RawResponse>, CacheError> {
            Ok(None)
        }

        async fn write(&self, key: &str, _: RawResponse, _: Duration) -> Result<(), CacheError> {
            Err(CacheError::Write { key: key.into(), reason: "read-only".into() })
        }
    }

    #[tokio::test]
    async fn default_fetch_or_compute_returns_value_when_write_fails() {
        let value = WriteFailingStore
            .fetch_or_compute("k", TTL, async { Ok(RawResponse::ok("[]")) }.boxed())
            .await
            .expect("value should survive a failed write");
        assert_eq!(value.body, "[]");
    }
}
