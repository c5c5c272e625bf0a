//! Registry of self-expiring fixed-window counters.
//!
//! Every key gets its own [`Bucket`] on first use. A bucket owns one tokio
//! task that zeroes its counter at the end of every window and removes the
//! bucket from the registry after two full windows without a hit.
//!
//! The key map sits behind one mutex that is only held for lookup, insert
//! and removal. Counting itself goes through atomics on the bucket.

use crate::application::ports::WindowLimiter;
use crate::domain::limits::{Limits, LimitsError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Roughly 30 years; stands in for windows too long to schedule.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Counting state for one key.
#[derive(Debug)]
struct Bucket {
    key: String,
    limits: Limits,
    count: AtomicU64,
    /// Nanoseconds since the registry epoch.
    touched: AtomicU64,
}

#[derive(Debug)]
struct BucketEntry {
    bucket: Arc<Bucket>,
    stop: CancellationToken,
    task: JoinHandle<()>,
}

#[derive(Debug)]
struct Inner {
    buckets: Mutex<HashMap<String, BucketEntry>>,
    epoch: Instant,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, BucketEntry>> {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn offset(&self, now: Instant) -> u64 {
        let nanos = now.saturating_duration_since(self.epoch).as_nanos();
        u64::try_from(nanos).unwrap_or(u64::MAX)
    }

    /// Remove `bucket` if it has been idle for two windows.
    ///
    /// Returns true when the bucket is no longer registered and its task
    /// should end.
    fn remove_if_idle(&self, bucket: &Arc<Bucket>, now: Instant) -> bool {
        let mut buckets = self.lock();
        let registered = buckets
            .get(&bucket.key)
            .is_some_and(|entry| Arc::ptr_eq(&entry.bucket, bucket));
        if !registered {
            return true;
        }

        let idle = Duration::from_nanos(
            self.offset(now)
                .saturating_sub(bucket.touched.load(Ordering::Acquire)),
        );
        if idle < bucket.limits.idle_timeout() {
            return false;
        }

        buckets.remove(&bucket.key);
        tracing::debug!(key = %bucket.key, idle_ms = idle.as_millis() as u64, "bucket expired");
        true
    }
}

/// Fixed-window rate limiter keyed by opaque strings.
///
/// Must be created inside a tokio runtime; bucket tasks are spawned on that
/// runtime even when [`WindowRegistry::test_and_count`] is called from a
/// plain thread.
///
/// # Example
/// ```
/// use brute_guard::{Limits, WindowRegistry};
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let registry = WindowRegistry::new();
/// let limits = Limits::new(Duration::from_secs(1), 2).unwrap();
///
/// assert!(!registry.test_and_count("login_bob", limits).unwrap());
/// assert!(!registry.test_and_count("login_bob", limits).unwrap());
/// assert!(registry.test_and_count("login_bob", limits).unwrap());
///
/// registry.shutdown().await;
/// assert!(registry.is_empty());
/// # }
/// ```
#[derive(Debug)]
pub struct WindowRegistry {
    inner: Arc<Inner>,
    runtime: Handle,
}

impl WindowRegistry {
    /// Create an empty registry bound to the current tokio runtime.
    ///
    /// # Panics
    /// Panics if called outside a tokio runtime.
    pub fn new() -> Self {
        Self::with_runtime(Handle::current())
    }

    /// Create an empty registry whose bucket tasks run on `runtime`.
    pub fn with_runtime(runtime: Handle) -> Self {
        Self {
            inner: Arc::new(Inner {
                buckets: Mutex::new(HashMap::new()),
                epoch: Instant::now(),
            }),
            runtime,
        }
    }

    /// Count one event for `key`.
    ///
    /// Creates the bucket with `limits` if it does not exist yet. An existing
    /// bucket keeps the limits it was created with.
    ///
    /// # Returns
    /// `true` if the count in the current window is now past the limit
    ///
    /// # Errors
    /// Returns `LimitsError` if `limits` is not strictly positive.
    pub fn test_and_count(&self, key: &str, limits: Limits) -> Result<bool, LimitsError> {
        limits.validate()?;
        let now = Instant::now();

        let bucket = {
            let mut buckets = self.inner.lock();
            let bucket = match buckets.get(key) {
                Some(entry) => Arc::clone(&entry.bucket),
                None => {
                    let entry = self.spawn_bucket(key, limits, now);
                    let bucket = Arc::clone(&entry.bucket);
                    buckets.insert(key.to_string(), entry);
                    tracing::trace!(
                        key,
                        period_ms = limits.period.as_millis() as u64,
                        limit = limits.limit,
                        "bucket created"
                    );
                    bucket
                }
            };
            bucket.touched.store(self.inner.offset(now), Ordering::Release);
            bucket
        };

        let count = bucket.count.fetch_add(1, Ordering::AcqRel).saturating_add(1);
        Ok(bucket.limits.exceeded_by(count))
    }

    /// Remove the bucket for `key`.
    ///
    /// Waits until the bucket's task has stopped. Unknown keys return
    /// `false`.
    pub async fn reset_bucket(&self, key: &str) -> bool {
        let entry = self.inner.lock().remove(key);
        match entry {
            Some(entry) => {
                stop_entry(entry).await;
                tracing::debug!(key, "bucket reset");
                true
            }
            None => false,
        }
    }

    /// Stop every bucket task and clear the registry.
    ///
    /// Completes as soon as the tasks acknowledge cancellation, regardless of
    /// the window lengths.
    pub async fn shutdown(&self) {
        let entries: Vec<BucketEntry> = self.inner.lock().drain().map(|(_, e)| e).collect();
        let stopped = entries.len();

        for entry in &entries {
            entry.stop.cancel();
        }
        for entry in entries {
            stop_entry(entry).await;
        }
        tracing::debug!(stopped, "window registry shut down");
    }

    /// Number of live buckets.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Keys of the live buckets, in no particular order.
    pub fn keys(&self) -> Vec<String> {
        self.inner.lock().keys().cloned().collect()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.lock().contains_key(key)
    }

    fn spawn_bucket(&self, key: &str, limits: Limits, now: Instant) -> BucketEntry {
        let bucket = Arc::new(Bucket {
            key: key.to_string(),
            limits,
            count: AtomicU64::new(0),
            touched: AtomicU64::new(self.inner.offset(now)),
        });
        let stop = CancellationToken::new();
        let task = self.runtime.spawn(run_bucket(
            Arc::downgrade(&self.inner),
            Arc::clone(&bucket),
            stop.clone(),
            first_tick(now, limits.period),
        ));

        BucketEntry { bucket, stop, task }
    }
}

impl Default for WindowRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WindowRegistry {
    fn drop(&mut self) {
        for entry in self.inner.lock().values() {
            entry.stop.cancel();
        }
    }
}

#[async_trait]
impl WindowLimiter for WindowRegistry {
    fn test_and_count(&self, key: &str, limits: Limits) -> Result<bool, LimitsError> {
        WindowRegistry::test_and_count(self, key, limits)
    }

    async fn reset_bucket(&self, key: &str) -> bool {
        WindowRegistry::reset_bucket(self, key).await
    }
}

/// End of the first window, clamped for periods past the clock's range.
fn first_tick(now: Instant, period: Duration) -> Instant {
    now.checked_add(period).unwrap_or_else(|| now + FAR_FUTURE)
}

async fn stop_entry(entry: BucketEntry) {
    entry.stop.cancel();
    if let Err(e) = entry.task.await {
        tracing::warn!(key = %entry.bucket.key, error = %e, "bucket task ended abnormally");
    }
}

async fn run_bucket(
    registry: Weak<Inner>,
    bucket: Arc<Bucket>,
    stop: CancellationToken,
    first_tick: Instant,
) {
    let mut ticker = interval_at(first_tick, bucket.limits.period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            tick = ticker.tick() => {
                bucket.count.store(0, Ordering::Release);
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                if registry.remove_if_idle(&bucket, tick) {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(period_ms: u64, limit: u64) -> Limits {
        Limits::new(Duration::from_millis(period_ms), limit).unwrap()
    }

    #[tokio::test]
    async fn test_limit_boundary() {
        let registry = WindowRegistry::new();
        let l = limits(1000, 10);

        for i in 1..=10 {
            assert!(
                !registry.test_and_count("login_bob", l).unwrap(),
                "call {i} should be admitted"
            );
        }
        assert!(registry.test_and_count("login_bob", l).unwrap());
        assert!(registry.test_and_count("login_bob", l).unwrap());

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_limits_create_nothing() {
        let registry = WindowRegistry::new();
        let zero_limit = Limits {
            period: Duration::from_secs(1),
            limit: 0,
        };
        let zero_period = Limits {
            period: Duration::ZERO,
            limit: 5,
        };

        assert_eq!(
            registry.test_and_count("k", zero_limit),
            Err(LimitsError::ZeroLimit)
        );
        assert_eq!(
            registry.test_and_count("k", zero_period),
            Err(LimitsError::ZeroPeriod)
        );
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_unbounded_period_is_accepted() {
        let registry = WindowRegistry::new();
        let l = Limits::new(Duration::MAX, 1).unwrap();

        assert!(!registry.test_and_count("k", l).unwrap());
        assert!(registry.test_and_count("k", l).unwrap());
        assert_eq!(registry.len(), 1);

        registry.shutdown().await;
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let registry = WindowRegistry::new();
        let l = limits(1000, 1);

        assert!(!registry.test_and_count("login_a", l).unwrap());
        assert!(!registry.test_and_count("login_b", l).unwrap());
        assert!(registry.test_and_count("login_a", l).unwrap());

        let mut keys = registry.keys();
        keys.sort();
        assert_eq!(keys, vec!["login_a", "login_b"]);

        registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_counter_resets_each_window() {
        let registry = WindowRegistry::new();
        let l = limits(100, 2);

        for _ in 0..2 {
            registry.test_and_count("k", l).unwrap();
        }
        assert!(registry.test_and_count("k", l).unwrap());

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(!registry.test_and_count("k", l).unwrap());
        assert_eq!(registry.len(), 1);

        registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_existing_bucket_keeps_its_limits() {
        let registry = WindowRegistry::new();

        assert!(!registry.test_and_count("k", limits(1000, 1)).unwrap());
        // The second call asks for a larger limit, but the bucket already exists.
        assert!(registry.test_and_count("k", limits(1000, 100)).unwrap());

        registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_bucket_expires_after_two_windows() {
        let registry = WindowRegistry::new();
        registry.test_and_count("k", limits(100, 5)).unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(registry.contains_key("k"));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!registry.contains_key("k"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_keeps_bucket_alive() {
        let registry = WindowRegistry::new();
        let l = limits(100, 50);

        for _ in 0..10 {
            registry.test_and_count("k", l).unwrap();
            tokio::time::sleep(Duration::from_millis(90)).await;
        }
        assert!(registry.contains_key("k"));

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_reset_bucket() {
        let registry = WindowRegistry::new();
        let l = limits(60_000, 1);

        registry.test_and_count("login_alice", l).unwrap();
        assert!(registry.test_and_count("login_alice", l).unwrap());

        assert!(registry.reset_bucket("login_alice").await);
        assert!(!registry.contains_key("login_alice"));
        assert!(!registry.test_and_count("login_alice", l).unwrap());

        assert!(!registry.reset_bucket("login_nobody").await);

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_count_from_plain_thread() {
        let registry = Arc::new(WindowRegistry::new());
        let l = limits(60_000, 100);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        registry.test_and_count("shared", l).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(registry.len(), 1);
        // 100 hits so far; the next one is over the limit.
        assert!(registry.test_and_count("shared", l).unwrap());

        registry.shutdown().await;
    }
}
