//! Fetch engine: cache-aside lookups served by a fixed worker pool
//!
//! Jobs are handed off without queueing. Every idle worker is represented by
//! one permit of the `idle` semaphore; a caller that cannot take a permit
//! immediately fails with [`FetchError::PoolBusy`]. The permit travels with the
//! job and is returned by the worker just before it delivers the result, so a
//! caller that has its answer can always hand off its next job, and the idle
//! count can never drop below zero or drift.

use backendify_proxy::CompanySource;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{CacheKey, CacheKeyMode, CompanyCache};
use crate::error::FetchError;
use crate::model::Company;
use crate::protocol;

const DEFAULT_WORKERS: NonZeroUsize = NonZeroUsize::new(64).unwrap();

/// Configuration for the fetch engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of long-lived workers
    pub workers: NonZeroUsize,
    /// Longest a caller waits for its worker's result
    pub job_timeout: Duration,
    /// How cache entries are keyed
    pub cache_key_mode: CacheKeyMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            job_timeout: Duration::from_secs(10),
            cache_key_mode: CacheKeyMode::Id,
        }
    }
}

/// Unit of work handed to a worker
struct FetchJob {
    origin: String,
    id: String,
    key: CacheKey,
    reply: oneshot::Sender<Result<Company, FetchError>>,
    /// Idle slot claimed by the caller, returned before the result is delivered
    slot: OwnedSemaphorePermit,
}

/// Owns the worker pool and the company cache
pub struct FetchEngine {
    config: EngineConfig,
    cache: Arc<CompanyCache>,
    idle: Arc<Semaphore>,
    /// `None` once shutdown has started
    jobs: parking_lot::Mutex<Option<mpsc::Sender<FetchJob>>>,
    handles: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl FetchEngine {
    /// Spawn the worker pool. Must be called inside a tokio runtime.
    pub fn start(
        config: EngineConfig,
        cache: Arc<CompanyCache>,
        source: Arc<dyn CompanySource>,
    ) -> Self {
        let workers = config.workers.get();
        info!(
            "Starting fetch engine (workers: {}, job timeout: {:?}, cache key: {})",
            workers,
            config.job_timeout,
            config.cache_key_mode.as_str()
        );

        let (tx, rx) = mpsc::channel(workers);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let handles = (0..workers)
            .map(|worker_id| {
                tokio::spawn(run_worker(
                    worker_id,
                    rx.clone(),
                    cache.clone(),
                    source.clone(),
                ))
            })
            .collect();

        Self {
            config,
            cache,
            idle: Arc::new(Semaphore::new(workers)),
            jobs: parking_lot::Mutex::new(Some(tx)),
            handles: tokio::sync::Mutex::new(handles),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Resolve a company through the cache or, on a miss, an idle worker
    pub async fn fetch(&self, origin: &str, id: &str) -> Result<Company, FetchError> {
        let key = self.config.cache_key_mode.key(origin, id);

        if let Some(company) = self.cache.get(&key) {
            debug!("Cache hit for company: {}", key);
            return Ok(company);
        }

        let slot = match self.idle.clone().try_acquire_owned() {
            Ok(slot) => slot,
            Err(TryAcquireError::NoPermits) => {
                debug!("No idle worker for company: {}", key);
                return Err(FetchError::PoolBusy);
            }
            Err(TryAcquireError::Closed) => return Err(FetchError::ShuttingDown),
        };

        debug!("Cache miss for company: {}, handing off to worker", key);

        let (reply, result) = oneshot::channel();
        let job = FetchJob {
            origin: origin.to_string(),
            id: id.to_string(),
            key,
            reply,
            slot,
        };

        {
            let jobs = self.jobs.lock();
            let Some(tx) = jobs.as_ref() else {
                return Err(FetchError::ShuttingDown);
            };
            // Each queued job holds an idle slot, so the channel never fills
            if tx.try_send(job).is_err() {
                return Err(FetchError::ShuttingDown);
            }
        }

        match tokio::time::timeout(self.config.job_timeout, result).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(FetchError::UpstreamUnavailable(
                "worker dropped the job".to_string(),
            )),
            Err(_) => {
                warn!(
                    "Timed out after {:?} waiting for company {}",
                    self.config.job_timeout, id
                );
                Err(FetchError::Timeout)
            }
        }
    }

    /// Workers currently able to accept a job
    pub fn idle_workers(&self) -> usize {
        self.idle.available_permits()
    }

    pub fn workers(&self) -> usize {
        self.config.workers.get()
    }

    pub fn cache(&self) -> &Arc<CompanyCache> {
        &self.cache
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Stop accepting jobs and wait for every worker to exit.
    ///
    /// Jobs already handed off are still processed. Safe to call more than
    /// once; every caller returns only after the pool has drained.
    pub async fn shutdown(&self) {
        let mut handles = self.handles.lock().await;

        if !self.shut_down.swap(true, Ordering::AcqRel) {
            info!("Shutting down fetch engine");
        }
        self.idle.close();
        self.jobs.lock().take();

        for handle in handles.drain(..) {
            if let Err(e) = handle.await {
                warn!("Worker task failed: {}", e);
            }
        }

        info!("Fetch engine stopped");
    }
}

async fn run_worker(
    worker_id: usize,
    jobs: Arc<tokio::sync::Mutex<mpsc::Receiver<FetchJob>>>,
    cache: Arc<CompanyCache>,
    source: Arc<dyn CompanySource>,
) {
    debug!("Worker {} started", worker_id);

    loop {
        let job = jobs.lock().await.recv().await;
        let Some(FetchJob {
            origin,
            id,
            key,
            reply,
            slot,
        }) = job
        else {
            break;
        };

        let outcome = process(&origin, &id, key, &cache, source.as_ref()).await;
        if let Err(e) = &outcome {
            warn!(
                "Worker {} failed to fetch company {} from {}: {} ({})",
                worker_id,
                id,
                origin,
                e,
                e.reason()
            );
        }

        // Free before replying so the caller never sees its own job's slot taken.
        // The job channel holds one entry per slot, so nothing queues behind us.
        drop(slot);
        // The caller may have given up; the cache was still populated
        let _ = reply.send(outcome);
    }

    debug!("Worker {} exiting", worker_id);
}

async fn process(
    origin: &str,
    id: &str,
    key: CacheKey,
    cache: &CompanyCache,
    source: &dyn CompanySource,
) -> Result<Company, FetchError> {
    // Another worker may have resolved the same id in the meantime
    if let Some(company) = cache.peek(&key) {
        return Ok(company);
    }

    let response = source
        .get_company(origin, id)
        .await
        .map_err(|e| FetchError::UpstreamUnavailable(e.to_string()))?;

    if response.status == 404 {
        return Err(FetchError::NotFound);
    }
    if !response.is_success() {
        return Err(FetchError::UpstreamUnavailable(format!(
            "backend returned status {}",
            response.status
        )));
    }

    let company = protocol::normalize_now(response.content_type.as_deref(), &response.body, id)?;
    cache.put(key, company.clone());
    Ok(company)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use backendify_proxy::{BackendResponse, ProxyError};
    use bytes::Bytes;
    use std::sync::atomic::AtomicUsize;

    const ORIGIN: &str = "http://us.example";

    /// Scripted backend counting outbound calls, optionally holding every
    /// call until released
    struct ScriptedSource {
        calls: AtomicUsize,
        hold: Option<Arc<Semaphore>>,
        delay: Duration,
        response: fn(&str) -> Result<BackendResponse, ProxyError>,
    }

    impl ScriptedSource {
        fn new(response: fn(&str) -> Result<BackendResponse, ProxyError>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                hold: None,
                delay: Duration::ZERO,
                response,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CompanySource for ScriptedSource {
        async fn get_company(&self, _origin: &str, id: &str) -> Result<BackendResponse, ProxyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(hold) = &self.hold {
                let _ = hold.acquire().await.map(|p| p.forget());
            }
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            (self.response)(id)
        }
    }

    fn v1_company(id: &str) -> Result<BackendResponse, ProxyError> {
        Ok(BackendResponse {
            status: 200,
            content_type: Some("application/x-company-v1".to_string()),
            body: Bytes::from(format!(r#"{{"cn":"Company {id}"}}"#)),
        })
    }

    fn unsupported(_id: &str) -> Result<BackendResponse, ProxyError> {
        Ok(BackendResponse {
            status: 200,
            content_type: Some("text/html".to_string()),
            body: Bytes::from_static(b"<html></html>"),
        })
    }

    fn not_found(_id: &str) -> Result<BackendResponse, ProxyError> {
        Ok(BackendResponse {
            status: 404,
            content_type: None,
            body: Bytes::new(),
        })
    }

    fn refused(_id: &str) -> Result<BackendResponse, ProxyError> {
        Err(ProxyError::Unavailable("connection refused".to_string()))
    }

    /// Slots of abandoned or failed jobs come back asynchronously
    async fn wait_for_idle(engine: &FetchEngine, expected: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while engine.idle_workers() != expected {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("workers did not become idle");
    }

    fn engine_with(
        workers: usize,
        cache_capacity: usize,
        source: Arc<ScriptedSource>,
    ) -> FetchEngine {
        let config = EngineConfig {
            workers: NonZeroUsize::new(workers).unwrap(),
            job_timeout: Duration::from_secs(5),
            cache_key_mode: CacheKeyMode::Id,
        };
        let cache = Arc::new(CompanyCache::new(NonZeroUsize::new(cache_capacity).unwrap()));
        FetchEngine::start(config, cache, source)
    }

    #[tokio::test]
    async fn test_second_fetch_is_served_from_cache() {
        let source = Arc::new(ScriptedSource::new(v1_company));
        let engine = engine_with(2, 16, source.clone());

        let first = engine.fetch(ORIGIN, "42").await.unwrap();
        assert_eq!(first.id, "42");
        assert_eq!(first.name, "Company 42");
        assert!(first.active);
        assert_eq!(source.calls(), 1);

        let second = engine.fetch(ORIGIN, "42").await.unwrap();
        assert_eq!(second, first);
        assert_eq!(source.calls(), 1);

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let source = Arc::new(ScriptedSource::new(unsupported));
        let engine = engine_with(1, 16, source.clone());

        let err = engine.fetch(ORIGIN, "1").await.unwrap_err();
        assert!(matches!(err, FetchError::UnsupportedFormat(ct) if ct == "text/html"));
        assert!(engine.cache().is_empty());

        // A retry goes back to the backend
        wait_for_idle(&engine, 1).await;
        let _ = engine.fetch(ORIGIN, "1").await;
        assert_eq!(source.calls(), 2);

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_error_taxonomy() {
        let engine = engine_with(1, 4, Arc::new(ScriptedSource::new(not_found)));
        assert_eq!(engine.fetch(ORIGIN, "1").await, Err(FetchError::NotFound));
        engine.shutdown().await;

        let engine = engine_with(1, 4, Arc::new(ScriptedSource::new(refused)));
        let err = engine.fetch(ORIGIN, "1").await.unwrap_err();
        assert_eq!(err.reason(), "upstream_unavailable");
        // A failed job does not take its worker down
        wait_for_idle(&engine, 1).await;
        let err = engine.fetch(ORIGIN, "2").await.unwrap_err();
        assert_eq!(err.reason(), "upstream_unavailable");
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_excess_fetches_fail_fast_with_pool_busy() {
        let hold = Arc::new(Semaphore::new(0));
        let source = Arc::new(ScriptedSource {
            hold: Some(hold.clone()),
            ..ScriptedSource::new(v1_company)
        });
        let engine = Arc::new(engine_with(2, 16, source.clone()));

        let in_flight: Vec<_> = (0..2)
            .map(|i| {
                let engine = engine.clone();
                tokio::spawn(async move { engine.fetch(ORIGIN, &format!("busy-{i}")).await })
            })
            .collect();

        // Wait until both workers are stuck inside the backend call
        while source.calls() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(engine.idle_workers(), 0);

        let started = std::time::Instant::now();
        assert_eq!(engine.fetch(ORIGIN, "extra").await, Err(FetchError::PoolBusy));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(source.calls(), 2);

        hold.add_permits(2);
        for handle in in_flight {
            assert!(handle.await.unwrap().is_ok());
        }
        wait_for_idle(&engine, 2).await;

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_abandoned_fetch_still_populates_cache() {
        let source = Arc::new(ScriptedSource {
            delay: Duration::from_millis(100),
            ..ScriptedSource::new(v1_company)
        });
        let engine = Arc::new(engine_with(1, 16, source.clone()));

        let caller = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.fetch(ORIGIN, "7").await })
        };
        while source.calls() < 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        caller.abort();
        let _ = caller.await;

        wait_for_idle(&engine, 1).await;
        assert!(engine.cache().contains(&CacheKey::id("7")));
        assert!(engine.fetch(ORIGIN, "7").await.is_ok());
        assert_eq!(source.calls(), 1);

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_caller_timeout() {
        let hold = Arc::new(Semaphore::new(0));
        let source = Arc::new(ScriptedSource {
            hold: Some(hold.clone()),
            ..ScriptedSource::new(v1_company)
        });
        let config = EngineConfig {
            workers: NonZeroUsize::new(1).unwrap(),
            job_timeout: Duration::from_millis(50),
            cache_key_mode: CacheKeyMode::Id,
        };
        let cache = Arc::new(CompanyCache::new(NonZeroUsize::new(4).unwrap()));
        let engine = FetchEngine::start(config, cache, source);

        assert_eq!(engine.fetch(ORIGIN, "slow").await, Err(FetchError::Timeout));

        hold.add_permits(1);
        engine.shutdown().await;
        // The late result still landed in the cache
        assert!(engine.cache().contains(&CacheKey::id("slow")));
    }

    #[tokio::test]
    async fn test_composite_cache_key_separates_backends() {
        let source = Arc::new(ScriptedSource::new(v1_company));
        let config = EngineConfig {
            workers: NonZeroUsize::new(1).unwrap(),
            job_timeout: Duration::from_secs(5),
            cache_key_mode: CacheKeyMode::OriginAndId,
        };
        let cache = Arc::new(CompanyCache::new(NonZeroUsize::new(4).unwrap()));
        let engine = FetchEngine::start(config, cache, source.clone());

        engine.fetch("http://us.example", "1").await.unwrap();
        wait_for_idle(&engine, 1).await;
        engine.fetch("http://ru.example", "1").await.unwrap();
        assert_eq!(source.calls(), 2);
        assert_eq!(engine.cache().len(), 2);

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_drains_and_is_idempotent() {
        let source = Arc::new(ScriptedSource {
            delay: Duration::from_millis(50),
            ..ScriptedSource::new(v1_company)
        });
        let engine = Arc::new(engine_with(2, 16, source.clone()));

        let in_flight = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.fetch(ORIGIN, "drain").await })
        };
        while source.calls() < 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        tokio::join!(engine.shutdown(), engine.shutdown());

        assert!(engine.is_shut_down());
        // The job handed off before shutdown completed normally
        assert!(in_flight.await.unwrap().is_ok());
        assert!(engine.handles.lock().await.is_empty());

        // No new job can be claimed, but cache hits are still served
        assert_eq!(engine.fetch(ORIGIN, "new").await, Err(FetchError::ShuttingDown));
        assert!(engine.fetch(ORIGIN, "drain").await.is_ok());
        assert_eq!(source.calls(), 1);

        engine.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_sequential_caller_never_sees_pool_busy() {
        let source = Arc::new(ScriptedSource::new(v1_company));
        let engine = engine_with(1, 8, source.clone());

        // One fetch in flight at a time never exceeds the pool
        for i in 0..2000 {
            let result = engine.fetch(ORIGIN, &format!("seq-{i}")).await;
            assert!(result.is_ok(), "fetch {i} failed: {result:?}");
        }
        assert_eq!(source.calls(), 2000);

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_worker_recheck_does_not_count_a_second_miss() {
        let source = Arc::new(ScriptedSource::new(v1_company));
        let engine = engine_with(1, 8, source.clone());

        engine.fetch(ORIGIN, "1").await.unwrap();
        engine.fetch(ORIGIN, "1").await.unwrap();

        let stats = engine.cache().stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(source.calls(), 1);

        engine.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_idle_count_stays_in_bounds_under_stress() {
        let source = Arc::new(ScriptedSource {
            delay: Duration::from_millis(1),
            ..ScriptedSource::new(v1_company)
        });
        let engine = Arc::new(engine_with(4, 32, source.clone()));
        let stop = Arc::new(AtomicBool::new(false));

        let observer = {
            let engine = engine.clone();
            let stop = stop.clone();
            tokio::spawn(async move {
                let mut samples = 0usize;
                while !stop.load(Ordering::Relaxed) {
                    let idle = engine.idle_workers();
                    assert!(idle <= engine.workers(), "idle count {idle} above pool size");
                    samples += 1;
                    tokio::task::yield_now().await;
                }
                samples
            })
        };

        let callers = (0..200).map(|i| {
            let engine = engine.clone();
            async move { engine.fetch(ORIGIN, &(i % 64).to_string()).await }
        });
        let results = futures::future::join_all(callers).await;

        stop.store(true, Ordering::Relaxed);
        assert!(observer.await.unwrap() > 0);

        for result in results {
            match result {
                Ok(_) | Err(FetchError::PoolBusy) => {}
                Err(other) => panic!("unexpected failure: {other}"),
            }
        }
        assert!(engine.cache().len() <= 32);
        wait_for_idle(&engine, 4).await;

        engine.shutdown().await;
    }
}
