//! Mount-handle cache with single-flight builds.
//!
//! Status machine per key: `pending` holds a shared future every
//! concurrent caller awaits; success becomes `ready` for the TTL;
//! deterministic failures are pinned as `failed` for the TTL; transient
//! failures delete the entry so the next caller retries.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;

use crate::config::CacheConfig;
use crate::mount::{MountError, MountHandle};

type BuildFuture = Shared<BoxFuture<'static, Result<MountHandle, MountError>>>;

/// Cache key: download URL, category, optional episode marker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MountKey {
    pub download_url: String,
    pub category: String,
    pub episode: Option<String>,
}

impl MountKey {
    fn as_string(&self) -> String {
        format!(
            "{}|{}|{}",
            self.download_url,
            self.category,
            self.episode.as_deref().unwrap_or("-")
        )
    }
}

enum EntryState {
    Pending(BuildFuture),
    Ready(MountHandle, Instant),
    Failed(MountError, Instant),
}

/// The mount-handle cache.
pub struct MountHandleCache {
    entries: Mutex<HashMap<String, EntryState>>,
    ttl: Duration,
}

impl MountHandleCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: Duration::from_secs(config.mount_ttl_minutes * 60),
        }
    }

    /// Resolve the mount for a key, building at most once concurrently.
    ///
    /// The builder future runs under single-flight: K concurrent
    /// callers for the same key all await the same build.
    pub async fn get_or_build<F>(
        &self,
        key: &MountKey,
        build: F,
    ) -> Result<MountHandle, MountError>
    where
        F: FnOnce() -> BoxFuture<'static, Result<MountHandle, MountError>>,
    {
        let key_str = key.as_string();

        let fut: BuildFuture = {
            let mut entries = self.entries.lock().expect("mount cache lock poisoned");
            match entries.get(&key_str) {
                Some(EntryState::Ready(handle, at)) if at.elapsed() < self.ttl => {
                    return Ok(handle.clone());
                }
                Some(EntryState::Failed(error, at)) if at.elapsed() < self.ttl => {
                    return Err(error.clone());
                }
                Some(EntryState::Pending(fut)) => fut.clone(),
                _ => {
                    // Expired or absent: start a fresh build.
                    let fut = build().shared();
                    entries.insert(key_str.clone(), EntryState::Pending(fut.clone()));
                    fut
                }
            }
        };

        let result = fut.await;

        let mut entries = self.entries.lock().expect("mount cache lock poisoned");
        // Only transition the entry if it is still the pending build we
        // awaited; a concurrent flush may have removed it.
        if matches!(entries.get(&key_str), Some(EntryState::Pending(_))) {
            match &result {
                Ok(handle) => {
                    entries.insert(
                        key_str,
                        EntryState::Ready(handle.clone(), Instant::now()),
                    );
                }
                Err(e) if e.is_deterministic() => {
                    entries.insert(key_str, EntryState::Failed(e.clone(), Instant::now()));
                }
                Err(_) => {
                    entries.remove(&key_str);
                }
            }
        }

        result
    }

    /// Peek without building.
    pub fn get_ready(&self, key: &MountKey) -> Option<MountHandle> {
        let entries = self.entries.lock().expect("mount cache lock poisoned");
        match entries.get(&key.as_string()) {
            Some(EntryState::Ready(handle, at)) if at.elapsed() < self.ttl => {
                Some(handle.clone())
            }
            _ => None,
        }
    }

    pub fn flush(&self) {
        self.entries
            .lock()
            .expect("mount cache lock poisoned")
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("mount cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn test_cache() -> MountHandleCache {
        MountHandleCache::new(&CacheConfig {
            stream_ttl_minutes: 60,
            stream_max_size_mb: 1,
            verified_nzb_ttl_minutes: 60,
            verified_nzb_max_size_mb: 1,
            mount_ttl_minutes: 30,
        })
    }

    fn key(url: &str) -> MountKey {
        MountKey {
            download_url: url.to_string(),
            category: "movies".to_string(),
            episode: None,
        }
    }

    fn handle(path: &str) -> MountHandle {
        MountHandle {
            mount_path: path.to_string(),
            filename: "movie.mkv".to_string(),
            file_size: 1024,
            category: "movies".to_string(),
            job_id: "job-1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_single_flight_builds_once() {
        let cache = Arc::new(test_cache());
        let builds = Arc::new(AtomicU32::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let builds = builds.clone();
            tasks.push(tokio::spawn(async move {
                cache
                    .get_or_build(&key("https://x/get/1"), move || {
                        async move {
                            builds.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Ok(handle("/mnt/movie.mkv"))
                        }
                        .boxed()
                    })
                    .await
            }));
        }

        for task in tasks {
            let result = task.await.unwrap().unwrap();
            assert_eq!(result.mount_path, "/mnt/movie.mkv");
        }
        assert_eq!(builds.load(Ordering::SeqCst), 1, "builder ran exactly once");
    }

    #[tokio::test]
    async fn test_ready_entry_served_without_building() {
        let cache = test_cache();
        cache
            .get_or_build(&key("u"), || async { Ok(handle("/mnt/a.mkv")) }.boxed())
            .await
            .unwrap();

        let second = cache
            .get_or_build(&key("u"), || {
                async { panic!("must not rebuild a ready entry") }.boxed()
            })
            .await
            .unwrap();
        assert_eq!(second.mount_path, "/mnt/a.mkv");
        assert!(cache.get_ready(&key("u")).is_some());
    }

    #[tokio::test]
    async fn test_deterministic_failure_pinned() {
        let cache = test_cache();
        let builds = Arc::new(AtomicU32::new(0));

        let builds_a = builds.clone();
        let result = cache
            .get_or_build(&key("u"), move || {
                async move {
                    builds_a.fetch_add(1, Ordering::SeqCst);
                    Err(MountError::JobFailed("bad nzb".into()))
                }
                .boxed()
            })
            .await;
        assert!(matches!(result, Err(MountError::JobFailed(_))));

        // Pinned: the next call gets the cached failure, no rebuild.
        let builds_b = builds.clone();
        let result = cache
            .get_or_build(&key("u"), move || {
                async move {
                    builds_b.fetch_add(1, Ordering::SeqCst);
                    Ok(handle("/mnt/x.mkv"))
                }
                .boxed()
            })
            .await;
        assert!(matches!(result, Err(MountError::JobFailed(_))));
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_retried() {
        let cache = test_cache();
        let builds = Arc::new(AtomicU32::new(0));

        let builds_a = builds.clone();
        let result = cache
            .get_or_build(&key("u"), move || {
                async move {
                    builds_a.fetch_add(1, Ordering::SeqCst);
                    Err(MountError::Timeout)
                }
                .boxed()
            })
            .await;
        assert!(matches!(result, Err(MountError::Timeout)));

        // Entry was deleted: the next caller rebuilds and succeeds.
        let builds_b = builds.clone();
        let result = cache
            .get_or_build(&key("u"), move || {
                async move {
                    builds_b.fetch_add(1, Ordering::SeqCst);
                    Ok(handle("/mnt/retry.mkv"))
                }
                .boxed()
            })
            .await
            .unwrap();
        assert_eq!(result.mount_path, "/mnt/retry.mkv");
        assert_eq!(builds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_distinct_keys_build_separately() {
        let cache = test_cache();
        let builds = Arc::new(AtomicU32::new(0));

        for url in ["u1", "u2"] {
            let builds = builds.clone();
            cache
                .get_or_build(&key(url), move || {
                    async move {
                        builds.fetch_add(1, Ordering::SeqCst);
                        Ok(handle("/mnt/x.mkv"))
                    }
                    .boxed()
                })
                .await
                .unwrap();
        }
        assert_eq!(builds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_flush_clears_entries() {
        let cache = test_cache();
        cache
            .get_or_build(&key("u"), || async { Ok(handle("/mnt/a.mkv")) }.boxed())
            .await
            .unwrap();
        assert_eq!(cache.len(), 1);
        cache.flush();
        assert!(cache.is_empty());
    }
}
