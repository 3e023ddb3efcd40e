use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio_util::io::ReaderStream;

use crate::locks::KeyedLocks;
use crate::store::RefCounts;
use crate::{BlobError, BlobReader, BlobResult, ContentStore, Digest, Published, StagedFile};

/// Blobs stored as files under `<root>/<aa>/<hex>`.
///
/// Publishing renames the staged file into place, so readers never observe a
/// partially written blob.
pub struct FileContentStore {
    root: PathBuf,
    refs: RefCounts,
    publish_locks: KeyedLocks<Digest>,
}

impl FileContentStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn new<P: Into<PathBuf>>(root: P, refcount: bool) -> BlobResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            refs: RefCounts::new(refcount),
            publish_locks: KeyedLocks::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, digest: &Digest) -> PathBuf {
        self.root.join(digest.shard_path())
    }

    async fn move_into_place(&self, staged: &Path, dest: &Path) -> BlobResult<()> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        if fs::rename(staged, dest).await.is_ok() {
            return Ok(());
        }

        // Staging on another filesystem: copy beside the target, then rename.
        let tmp = dest.with_extension(format!("tmp-{}", uuid::Uuid::new_v4().simple()));
        if let Err(e) = copy_synced(staged, &tmp).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(BlobError::store_failure(e));
        }
        if let Err(e) = fs::rename(&tmp, dest).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(BlobError::store_failure(e));
        }
        if let Err(e) = fs::remove_file(staged).await {
            tracing::warn!(path = %staged.display(), error = %e, "failed to remove staged copy");
        }
        Ok(())
    }
}

async fn copy_synced(from: &Path, to: &Path) -> std::io::Result<()> {
    fs::copy(from, to).await?;
    fs::OpenOptions::new().write(true).open(to).await?.sync_all().await
}

#[async_trait]
impl ContentStore for FileContentStore {
    async fn exists(&self, digest: &Digest) -> BlobResult<bool> {
        Ok(fs::try_exists(self.blob_path(digest)).await?)
    }

    async fn publish(&self, staged: &StagedFile, digest: &Digest) -> BlobResult<Published> {
        let _guard = self.publish_locks.lock(digest).await;
        let dest = self.blob_path(digest);

        if fs::try_exists(&dest).await? {
            staged.remove().await?;
            tracing::debug!(%digest, "blob already present, staged copy discarded");
            return Ok(Published::AlreadyPresent);
        }

        staged.sync().await?;
        self.move_into_place(staged.path(), &dest).await?;
        tracing::info!(%digest, path = %dest.display(), "blob published");
        Ok(Published::Written)
    }

    async fn read(&self, digest: &Digest) -> BlobResult<BlobReader> {
        let file = match fs::File::open(self.blob_path(digest)).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BlobError::not_found(digest.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let size_bytes = file.metadata().await?.len();

        Ok(BlobReader {
            digest: digest.clone(),
            size_bytes,
            stream: Box::pin(ReaderStream::new(file)),
        })
    }

    async fn delete(&self, digest: &Digest) -> BlobResult<()> {
        let _guard = self.publish_locks.lock(digest).await;
        self.refs.check_deletable(digest)?;

        match fs::remove_file(self.blob_path(digest)).await {
            Ok(()) => {
                tracing::info!(%digest, "blob deleted");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.refs.forget(digest);
        Ok(())
    }

    async fn retain(&self, digest: &Digest) -> BlobResult<u64> {
        if !self.exists(digest).await? {
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
