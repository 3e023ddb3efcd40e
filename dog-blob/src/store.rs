use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{BlobError, BlobResult, ByteStream, Digest, StagedFile};

/// Content-addressed persistent store keyed by [`Digest`].
///
/// Every method must be safe under concurrent callers. In particular two
/// `publish` calls racing on the same digest must both succeed and result in
/// at most one physical write.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Whether a blob is published under `digest`.
    async fn exists(&self, digest: &Digest) -> BlobResult<bool>;

    /// Move verified staged content into the store under `digest`.
    ///
    /// On success the staged file is consumed (moved or discarded). On
    /// failure it is left where it was so the upload can be retried.
    async fn publish(&self, staged: &StagedFile, digest: &Digest) -> BlobResult<Published>;

    /// Stream a published blob. `NotFound` if absent.
    async fn read(&self, digest: &Digest) -> BlobResult<BlobReader>;

    /// Remove a blob. Removing an absent blob succeeds.
    async fn delete(&self, digest: &Digest) -> BlobResult<()>;

    /// Add a reference to a published blob, returning the new count.
    async fn retain(&self, digest: &Digest) -> BlobResult<u64>;

    /// Drop a reference, returning the new count (never below zero).
    async fn release(&self, digest: &Digest) -> BlobResult<u64>;

    /// Current reference count (0 when refcounting is disabled).
    async fn ref_count(&self, digest: &Digest) -> BlobResult<u64>;
}

/// Outcome of [`ContentStore::publish`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Published {
    /// The staged content became the stored blob.
    Written,
    /// Identical content was already stored; the staged copy was discarded.
    AlreadyPresent,
}

/// A readable published blob.
pub struct BlobReader {
    pub digest: Digest,
    pub size_bytes: u64,
    pub stream: ByteStream,
}

/// Reference counts shared by the store implementations.
#[derive(Debug, Default)]
pub(crate) struct RefCounts {
    enabled: bool,
    counts: Mutex<HashMap<Digest, u64>>,
}

impl RefCounts {
    pub(crate) fn new(enabled: bool) -> Self {
        Self {
            enabled,
            counts: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn retain(&self, digest: &Digest) -> u64 {
        if !self.enabled {
            return 0;
        }
        let mut counts = self.counts.lock();
        let n = counts.entry(digest.clone()).or_insert(0);
        *n += 1;
        *n
    }

    pub(crate) fn release(&self, digest: &Digest) -> u64 {
        if !self.enabled {
            return 0;
        }
        let mut counts = self.counts.lock();
        match counts.get_mut(digest) {
            Some(n) if *n > 1 => {
                *n -= 1;
                *n
            }
            Some(_) => {
                counts.remove(digest);
                0
            }
            None => 0,
        }
    }

    pub(crate) fn get(&self, digest: &Digest) -> u64 {
        self.counts.lock().get(digest).copied().unwrap_or(0)
    }

    /// Refuse deletion while references are held.
    pub(crate) fn check_deletable(&self, digest: &Digest) -> BlobResult<()> {
        match self.get(digest) {
            0 => Ok(()),
            refs => Err(BlobError::Referenced {
                digest: digest.to_string(),
                refs,
            }),
        }
    }

    pub(crate) fn forget(&self, digest: &Digest) {
        self.counts.lock().remove(digest);
    }
}
