use crate::feed::fetcher::FetchResult;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Key→result store for fetched feeds.
///
/// Keys are the raw URL strings exactly as callers supplied them, so two
/// spellings of the same address occupy two entries. Values are shared
/// immutable [`FetchResult`]s.
///
/// All access goes through one mutex that is held only for the duration of a
/// map operation, never across an `.await`, so a reader cannot observe a
/// half-written entry. By default the cache is unbounded with no expiry;
/// [`FeedCache::with_capacity`] adds least-recently-used eviction.
pub struct FeedCache {
    entries: Mutex<LruCache<String, Arc<FetchResult>>>,
}

impl FeedCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(LruCache::unbounded()),
        }
    }

    /// Bounded cache; `0` means unbounded.
    pub fn with_capacity(capacity: usize) -> Self {
        match NonZeroUsize::new(capacity) {
            Some(cap) => Self {
                entries: Mutex::new(LruCache::new(cap)),
            },
            None => Self::new(),
        }
    }

    /// Returns the stored result for `key`, if any. Absence means "go fetch".
    pub fn get(&self, key: &str) -> Option<Arc<FetchResult>> {
        self.entries.lock().get(key).cloned()
    }

    /// Stores `result` under `key`, replacing any previous entry.
    pub fn put(&self, key: &str, result: Arc<FetchResult>) {
        if let Some((evicted, _)) = self.entries.lock().push(key.to_owned(), result) {
            if evicted != key {
                tracing::debug!(url = %evicted, "Evicted feed from cache");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl Default for FeedCache {
    fn default() -> Self {
        Self::new()
    }
}
