use std::collections::VecDeque;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use super::{new_image_id, CachedImage};

#[derive(Debug)]
struct Entry {
    bytes: Bytes,
    content_type: String,
    stored_at: Instant,
}

#[derive(Debug, Default)]
struct Inner {
    entries: FxHashMap<String, Entry>,
    order: VecDeque<String>,
}

/// Process-memory image store bounded by entry count and age.
///
/// Entries are evicted oldest-first once `max_entries` is reached and are
/// dropped once older than the TTL. A zero bound disables that limit.
#[derive(Debug)]
pub struct MemoryImageCache {
    inner: Mutex<Inner>,
    max_entries: usize,
    ttl: Option<Duration>,
}

impl MemoryImageCache {
    #[must_use]
    pub fn new(max_entries: usize, ttl_secs: u64) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            max_entries,
            ttl: (ttl_secs > 0).then(|| Duration::from_secs(ttl_secs)),
        }
    }

    pub fn store(&self, bytes: Bytes, content_type: &str) -> String {
        self.store_at(bytes, content_type, Instant::now())
    }

    #[must_use]
    pub fn fetch(&self, id: &str) -> Option<CachedImage> {
        self.fetch_at(id, Instant::now())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_expired(&self, entry: &Entry, now: Instant) -> bool {
        self.ttl
            .is_some_and(|ttl| now.saturating_duration_since(entry.stored_at) >= ttl)
    }

    fn store_at(&self, bytes: Bytes, content_type: &str, now: Instant) -> String {
        let id = new_image_id();
        let mut inner = self.inner.lock();

        // `order` is insertion order, so expired entries sit at the front.
        while let Some(oldest) = inner.order.front() {
            let expired = inner
                .entries
                .get(oldest)
                .map_or(true, |entry| self.is_expired(entry, now));
            if !expired {
                break;
            }
            if let Some(key) = inner.order.pop_front() {
                inner.entries.remove(&key);
            }
        }

        if self.max_entries > 0 {
            while inner.entries.len() >= self.max_entries {
                let Some(key) = inner.order.pop_front() else {
                    break;
                };
                inner.entries.remove(&key);
            }
        }

        inner.entries.insert(
            id.clone(),
            Entry {
                bytes,
                content_type: content_type.to_string(),
                stored_at: now,
            },
        );
        inner.order.push_back(id.clone());
        id
    }

    fn fetch_at(&self, id: &str, now: Instant) -> Option<CachedImage> {
        let mut inner = self.inner.lock();
        let entry = inner.entries.get(id)?;
        if self.is_expired(entry, now) {
            inner.entries.remove(id);
            inner.order.retain(|key| key != id);
            return None;
        }
        Some(CachedImage {
            id: id.to_string(),
            bytes: entry.bytes.clone(),
            content_type: entry.content_type.clone(),
        })
    }
}
