use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use crate::store::RefCounts;
use crate::{BlobError, BlobReader, BlobResult, ContentStore, Digest, Published, StagedFile};

const READ_CHUNK_BYTES: usize = 64 * 1024;

/// In-process content store, for tests and embedders that keep blobs in RAM.
pub struct MemoryContentStore {
    blobs: RwLock<HashMap<Digest, Bytes>>,
    refs: RefCounts,
}

impl Default for MemoryContentStore {
    fn default() -> Self {
        Self::new(false)
    }
}

impl MemoryContentStore {
    pub fn new(refcount: bool) -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
            refs: RefCounts::new(refcount),
        }
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }

    /// Store `data` directly, bypassing the upload protocol.
    pub fn insert(&self, data: impl Into<Bytes>) -> Digest {
        let data: Bytes = data.into();
        let digest = Digest::of(crate::Algorithm::Sha256, &data);
        self.blobs.write().entry(digest.clone()).or_insert(data);
        digest
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn exists(&self, digest: &Digest) -> BlobResult<bool> {
        Ok(self.blobs.read().contains_key(digest))
    }

    async fn publish(&self, staged: &StagedFile, digest: &Digest) -> BlobResult<Published> {
        if self.blobs.read().contains_key(digest) {
            staged.remove().await?;
            return Ok(Published::AlreadyPresent);
        }

        let data = Bytes::from(tokio::fs::read(staged.path()).await?);
        let published = {
            let mut blobs = self.blobs.write();
            if blobs.contains_key(digest) {
                Published::AlreadyPresent
            } else {
                blobs.insert(digest.clone(), data);
                Published::Written
            }
        };
        staged.remove().await?;
        Ok(published)
    }

    async fn read(&self, digest: &Digest) -> BlobResult<BlobReader> {
        let data = self
            .blobs
            .read()
            .get(digest)
            .cloned()
            .ok_or_else(|| BlobError::not_found(digest.to_string()))?;
        let size_bytes = data.len() as u64;

        // Slices share the stored buffer; nothing is copied.
        let stream = async_stream::stream! {
            let mut rest = data;
            while !rest.is_empty() {
                let n = rest.len().min(READ_CHUNK_BYTES);
                yield Ok::<Bytes, std::io::Error>(rest.split_to(n));
            }
        };

        Ok(BlobReader {
            digest: digest.clone(),
            size_bytes,
            stream: Box::pin(stream),
        })
    }

    async fn delete(&self, digest: &Digest) -> BlobResult<()> {
        self.refs.check_deletable(digest)?;
        self.blobs.write().remove(digest);
        self.refs.forget(digest);
        Ok(())
    }

    async fn retain(&self, digest: &Digest) -> BlobResult<u64> {
        if !self.blobs.read().contains_key(digest) {
            return Err(BlobError::not_found(digest.to_string()));
        }
        Ok(self.refs.retain(digest))
    }

    async fn release(&self, digest: &Digest) -> BlobResult<u64> {
        Ok(self.refs.release(digest))
    }

    async fn ref_count(&self, digest: &Digest) -> BlobResult<u64> {
        Ok(self.refs.get(digest))
    }
}
