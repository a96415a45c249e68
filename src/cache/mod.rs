//! Generated image storage keyed by opaque identifiers.

mod disk;
mod memory;

pub use disk::DiskImageCache;
pub use memory::MemoryImageCache;

use bytes::Bytes;

use crate::config::{CacheConfig, CacheKind};
use crate::error::ProxyError;

/// An image held by the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedImage {
    pub id: String,
    pub bytes: Bytes,
    pub content_type: String,
}

/// Result cache with a memory-backed or disk-backed store.
#[derive(Debug)]
pub enum ImageCache {
    Memory(MemoryImageCache),
    Disk(DiskImageCache),
}

impl ImageCache {
    #[must_use]
    pub fn from_config(config: &CacheConfig) -> Self {
        match config.kind {
            CacheKind::Memory => Self::Memory(MemoryImageCache::new(
                config.max_entries,
                config.ttl_secs,
            )),
            CacheKind::Disk => Self::Disk(DiskImageCache::new(&config.dir)),
        }
    }

    /// Store image bytes and return the freshly minted id.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Internal`] when the disk store cannot write the file.
    pub async fn store(&self, bytes: Bytes, content_type: &str) -> Result<String, ProxyError> {
        match self {
            Self::Memory(cache) => Ok(cache.store(bytes, content_type)),
            Self::Disk(cache) => cache.store(bytes, content_type).await,
        }
    }

    /// Look up an image by id; `None` when it was never stored or is gone.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Internal`] when the disk store fails to read an existing file.
    pub async fn fetch(&self, id: &str) -> Result<Option<CachedImage>, ProxyError> {
        match self {
            Self::Memory(cache) => Ok(cache.fetch(id)),
            Self::Disk(cache) => cache.fetch(id).await,
        }
    }
}

/// Mint a new image id: 128 random bits rendered as 32 lowercase hex chars.
#[must_use]
pub(crate) fn new_image_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[must_use]
pub(crate) fn is_valid_image_id(id: &str) -> bool {
    id.len() == 32 && id.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
