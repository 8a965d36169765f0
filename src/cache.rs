use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::models::MediaKey;

/// Key for every cached category, rendered to a namespaced string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Personalized home feed, keyed per user
    Recommendations(String),
    /// Item-detail recommendations, optionally personalized
    ItemRecommendations {
        key: MediaKey,
        user: Option<String>,
    },
    /// Search results for a canonicalized query + filters + page string
    Search(String),
    /// Aggregated item details
    Details(MediaKey),
    /// Trending listing per window ("day" | "week")
    Trending(String),
    /// Search suggestions per prefix
    Suggestions(String),
    /// Pass-through proxy, keyed by path + query
    Proxy(String),
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::Recommendations(user) => write!(f, "recs:user:{}", user),
            CacheKey::ItemRecommendations { key, user } => {
                write!(f, "recs:item:{}:{}", key, user.as_deref().unwrap_or("anon"))
            }
            CacheKey::Search(query) => write!(f, "search:{}", query.to_lowercase()),
            CacheKey::Details(key) => write!(f, "details:{}", key),
            CacheKey::Trending(window) => write!(f, "trending:{}", window),
            CacheKey::Suggestions(prefix) => write!(f, "suggest:{}", prefix.to_lowercase()),
            CacheKey::Proxy(path) => write!(f, "proxy:{}", path),
        }
    }
}

/// A cache read result carrying the hit indicator callers surface.
#[derive(Debug, Clone)]
pub struct Cached<T> {
    pub value: T,
    pub from_cache: bool,
}

struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

type PendingFuture = Shared<BoxFuture<'static, Result<Value, AppError>>>;

/// In-memory compute-or-serve cache with per-entry expiry.
///
/// Values are stored as JSON so heterogeneous result types share one
/// map. Concurrent misses for the same key are coalesced through a
/// pending-future map: the producer runs once and every waiter shares
/// its outcome. Nothing is cached on producer failure.
pub struct ResponseCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    pending: Mutex<HashMap<String, PendingFuture>>,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Recover the guard from a poisoned lock; entries are plain data and
/// stay consistent even if a panicking thread held the mutex.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ResponseCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Serve `key` from the cache, or run `producer` to fill it.
    ///
    /// On a hit the stored value is returned immediately with
    /// `from_cache = true`; there is no background revalidation. On a
    /// miss the producer runs (shared with any concurrent miss for the
    /// same key) and its result is stored under `ttl`. Producer failure
    /// propagates and leaves the cache untouched.
    pub async fn get_or_compute<T, F, Fut>(
        &self,
        key: &CacheKey,
        ttl: Duration,
        producer: F,
    ) -> AppResult<Cached<T>>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = AppResult<T>> + Send + 'static,
    {
        let key_str = key.to_string();

        if let Some(value) = self.get_from_cache::<T>(key)? {
            tracing::debug!(key = %key_str, "Cache hit");
            return Ok(Cached {
                value,
                from_cache: true,
            });
        }

        // Join an in-flight computation for this key, or become its owner.
        let (shared, owner) = {
            let mut pending = lock(&self.pending);
            match pending.get(&key_str) {
                Some(shared) => (shared.clone(), false),
                None => {
                    let fut = async move {
                        let value = producer().await?;
                        serde_json::to_value(&value).map_err(|e| {
                            AppError::Internal(format!("Cache serialization error: {}", e))
                        })
                    }
                    .boxed()
                    .shared();
                    pending.insert(key_str.clone(), fut.clone());
                    (fut, true)
                }
            }
        };

        if !owner {
            tracing::debug!(key = %key_str, "Joining in-flight computation");
        }

        let result = shared.await;

        if owner {
            if let Ok(value) = &result {
                lock(&self.entries).insert(
                    key_str.clone(),
                    CacheEntry {
                        value: value.clone(),
                        expires_at: Instant::now() + ttl,
                    },
                );
            }
            lock(&self.pending).remove(&key_str);
        }

        let value = serde_json::from_value(result?)
            .map_err(|e| AppError::Internal(format!("Cache deserialization error: {}", e)))?;

        Ok(Cached {
            value,
            from_cache: false,
        })
    }

    /// Retrieves a value from the cache by key
    ///
    /// Expired entries are evicted on read and reported as a miss.
    pub fn get_from_cache<T: DeserializeOwned>(&self, key: &CacheKey) -> AppResult<Option<T>> {
        let key_str = key.to_string();
        let mut entries = lock(&self.entries);

        match entries.get(&key_str) {
            Some(entry) if entry.expires_at > Instant::now() => {
                let value = serde_json::from_value(entry.value.clone()).map_err(|e| {
                    AppError::Internal(format!("Cache deserialization error: {}", e))
                })?;
                Ok(Some(value))
            }
            Some(_) => {
                entries.remove(&key_str);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Stores a value in the cache under the given TTL
    pub fn set<T: Serialize>(&self, key: &CacheKey, value: &T, ttl: Duration) {
        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(error = %e, "Cache serialization error");
                return;
            }
        };

        lock(&self.entries).insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Removes an entry immediately.
    ///
    /// Called when caller-side state changes invalidate a derived value,
    /// e.g. a watch-history mutation invalidating that user's feed.
    pub fn invalidate(&self, key: &CacheKey) {
        let removed = lock(&self.entries).remove(&key.to_string()).is_some();
        tracing::debug!(key = %key, removed, "Cache invalidate");
    }
}

/// Checks the cache for a value before computing it.
///
/// Evaluates to the cached value when present, otherwise runs the block,
/// stores the result under the TTL and evaluates to it. For call sites
/// that need the hit indicator use [`ResponseCache::get_or_compute`]
/// instead.
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $block:expr) => {{
        if let Some(cached) = $cache.get_from_cache(&$key)? {
            Ok(cached)
        } else {
            let value = $block.await?;
            $cache.set(&$key, &value, $ttl);
            Ok(value)
        }
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MediaType;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn test_key(name: &str) -> CacheKey {
        CacheKey::Search(name.to_string())
    }

    #[test]
    fn test_cache_key_display_namespaces() {
        assert_eq!(
            format!("{}", CacheKey::Recommendations("alice".to_string())),
            "recs:user:alice"
        );
        assert_eq!(
            format!(
                "{}",
                CacheKey::ItemRecommendations {
                    key: MediaKey {
                        media_type: MediaType::Movie,
                        id: 603
                    },
                    user: None
                }
            ),
            "recs:item:movie:603:anon"
        );
        assert_eq!(
            format!("{}", CacheKey::Search("The MATRIX".to_string())),
            "search:the matrix"
        );
        assert_eq!(
            format!("{}", CacheKey::Trending("day".to_string())),
            "trending:day"
        );
    }

    #[tokio::test]
    async fn test_second_read_within_ttl_is_a_hit() {
        let cache = ResponseCache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        for expected_from_cache in [false, true] {
            let calls = calls.clone();
            let result: Cached<u32> = cache
                .get_or_compute(&test_key("hit"), Duration::from_secs(60), move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(7)
                })
                .await
                .unwrap();
            assert_eq!(result.value, 7);
            assert_eq!(result.from_cache, expected_from_cache);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_recompute() {
        let cache = ResponseCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = test_key("invalidate");

        for _ in 0..2 {
            let calls = calls.clone();
            let _: Cached<u32> = cache
                .get_or_compute(&key, Duration::from_secs(60), move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(1)
                })
                .await
                .unwrap();
            cache.invalidate(&key);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_expired_entry_recomputes() {
        let cache = ResponseCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = test_key("expiry");

        for _ in 0..2 {
            let calls = calls.clone();
            let _: Cached<u32> = cache
                .get_or_compute(&key, Duration::from_millis(10), move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(1)
                })
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(25)).await;
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_producer_failure_is_not_cached() {
        let cache = ResponseCache::new();
        let key = test_key("failure");

        let result: AppResult<Cached<u32>> = cache
            .get_or_compute(&key, Duration::from_secs(60), || async {
                Err(AppError::Internal("boom".to_string()))
            })
            .await;
        assert!(result.is_err());

        let result: Cached<u32> = cache
            .get_or_compute(&key, Duration::from_secs(60), || async { Ok(9) })
            .await
            .unwrap();
        assert_eq!(result.value, 9);
        assert!(!result.from_cache);
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_producer_run() {
        let cache = Arc::new(ResponseCache::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let key = test_key("coalesce");

        let mut handles = Vec::new();
        for _ in 0..4 {
            let cache = cache.clone();
            let calls = calls.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                let result: Cached<u32> = cache
                    .get_or_compute(&key, Duration::from_secs(60), move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(11)
                    })
                    .await
                    .unwrap();
                result.value
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), 11);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cached_macro_round_trip() {
        let cache = ResponseCache::new();
        let key = test_key("macro");

        let first: AppResult<Vec<String>> = async {
            cached!(cache, key, Duration::from_secs(60), async {
                Ok::<_, AppError>(vec!["one".to_string()])
            })
        }
        .await;
        assert_eq!(first.unwrap(), vec!["one".to_string()]);

        // Second read must come from the cache, not the block.
        let second: AppResult<Vec<String>> = async {
            cached!(cache, key, Duration::from_secs(60), async {
                Ok::<_, AppError>(vec!["two".to_string()])
            })
        }
        .await;
        assert_eq!(second.unwrap(), vec!["one".to_string()]);
    }
}
