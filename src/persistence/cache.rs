//! Read-through cache for reconciliation jobs and timelines.
//!
//! Bounded by an LRU capacity per kind, with a TTL on every entry. The store
//! stays the source of truth; callers write the store first and then refresh
//! the cache.
//!
//! Readers that miss take a [`FillTicket`] before going to the store and
//! fill through [`ReconciliationCache::fill_job`] / [`ReconciliationCache::fill_timeline`].
//! A fill is dropped when any write or invalidation landed after the ticket
//! was taken, so a slow reader never replaces a newer value.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::entities::{ReconciliationJob, ReconciliationTimeline};

/// Cache performance statistics
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: usize,
}

impl CacheStats {
    /// Calculate hit rate as percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

struct Cached<T> {
    value: T,
    cached_at: Instant,
}

/// Cache generation observed before a store read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillTicket(u64);

struct Inner {
    jobs: LruCache<String, Cached<ReconciliationJob>>,
    timelines: LruCache<String, Cached<ReconciliationTimeline>>,
    stats: CacheStats,
    // Bumped by every write, invalidation and clear
    generation: u64,
}

impl Inner {
    fn size(&self) -> usize {
        self.jobs.len() + self.timelines.len()
    }

    fn bump(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }
}

pub struct ReconciliationCache {
    inner: Mutex<Inner>,
    ttl: Duration,
}

impl ReconciliationCache {
    /// `capacity` applies to jobs and timelines separately; zero is treated as one.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Inner {
                jobs: LruCache::new(capacity),
                timelines: LruCache::new(capacity),
                stats: CacheStats::default(),
                generation: 0,
            }),
            ttl,
        }
    }

    pub fn with_default_ttl() -> Self {
        Self::new(1000, Duration::from_secs(300)) // 5 minutes default
    }

    pub async fn get_job(&self, job_id: &str) -> Option<ReconciliationJob> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        let ttl = self.ttl;
        lookup(&mut inner.jobs, &mut inner.stats, job_id, ttl)
    }

    pub async fn set_job(&self, job: &ReconciliationJob) {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        inner.bump();
        insert(&mut inner.jobs, &mut inner.stats, job.id.clone(), job.clone());
    }

    /// Populate after a miss. Returns whether the entry was stored.
    pub async fn fill_job(&self, job: &ReconciliationJob, ticket: FillTicket) -> bool {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        if inner.generation != ticket.0 {
            debug!(job_id = %job.id, "Skipping stale cache fill");
            return false;
        }
        insert(&mut inner.jobs, &mut inner.stats, job.id.clone(), job.clone());
        true
    }

    pub async fn get_timeline(&self, job_id: &str) -> Option<ReconciliationTimeline> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        let ttl = self.ttl;
        lookup(&mut inner.timelines, &mut inner.stats, job_id, ttl)
    }

    pub async fn set_timeline(&self, timeline: &ReconciliationTimeline) {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        inner.bump();
        insert(
            &mut inner.timelines,
            &mut inner.stats,
            timeline.job_id.clone(),
            timeline.clone(),
        );
    }

    pub async fn fill_timeline(&self, timeline: &ReconciliationTimeline, ticket: FillTicket) -> bool {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        if inner.generation != ticket.0 {
            debug!(job_id = %timeline.job_id, "Skipping stale cache fill");
            return false;
        }
        insert(
            &mut inner.timelines,
            &mut inner.stats,
            timeline.job_id.clone(),
            timeline.clone(),
        );
        true
    }

    /// Take before reading the store on a miss.
    pub async fn fill_ticket(&self) -> FillTicket {
        FillTicket(self.inner.lock().await.generation)
    }

    /// Drop both the job and its timeline.
    pub async fn invalidate_job(&self, job_id: &str) {
        let mut inner = self.inner.lock().await;
        inner.bump();
        inner.jobs.pop(job_id);
        inner.timelines.pop(job_id);
        debug!(job_id = %job_id, "Invalidated cached reconciliation job");
    }

    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        let cleared = inner.size();
        inner.bump();
        inner.jobs.clear();
        inner.timelines.clear();
        debug!(cleared_entries = cleared, "Reconciliation cache cleared");
    }

    /// Get cache performance statistics
    pub async fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().await;
        CacheStats {
            size: inner.size(),
            ..inner.stats.clone()
        }
    }

    /// Reset cache statistics
    pub async fn reset_stats(&self) {
        self.inner.lock().await.stats = CacheStats::default();
        debug!("Cache statistics reset");
    }
}

fn lookup<T: Clone>(
    cache: &mut LruCache<String, Cached<T>>,
    stats: &mut CacheStats,
    key: &str,
    ttl: Duration,
) -> Option<T> {
    let state = cache
        .get(key)
        .map(|entry| (entry.cached_at.elapsed() < ttl).then(|| entry.value.clone()));

    match state {
        Some(Some(value)) => {
            stats.hits += 1;
            debug!(key, "Cache hit");
            Some(value)
        }
        Some(None) => {
            cache.pop(key);
            stats.evictions += 1;
            stats.misses += 1;
            debug!(key, "Cache miss (expired)");
            None
        }
        None => {
            stats.misses += 1;
            debug!(key, "Cache miss");
            None
        }
    }
}

fn insert<T>(cache: &mut LruCache<String, Cached<T>>, stats: &mut CacheStats, key: String, value: T) {
    let entry = Cached {
        value,
        cached_at: Instant::now(),
    };
    if let Some((evicted, _)) = cache.push(key.clone(), entry) {
        if evicted != key {
            stats.evictions += 1;
        }
    }
}
