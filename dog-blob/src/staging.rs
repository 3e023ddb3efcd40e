use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::{Algorithm, BlobError, BlobResult, ByteStream, Digest, Digester, UploadId};

const HASH_BUF_BYTES: usize = 64 * 1024;

/// Directory holding the partial content of in-progress uploads.
#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    /// Use `root` for staging files, creating it if needed.
    pub fn new<P: Into<PathBuf>>(root: P) -> BlobResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the empty staging file owned by `upload_id`.
    pub async fn create(&self, upload_id: &UploadId) -> BlobResult<StagedFile> {
        let path = self.root.join(upload_id.to_string());
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        Ok(StagedFile { path })
    }
}

/// Staging file of one upload session. Only that session writes to it.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `body` starting at `offset`, refusing more than `limit` bytes.
    ///
    /// Anything past `offset` from an earlier interrupted write is discarded
    /// first. On error the file is cut back to `offset`.
    pub async fn append(&self, offset: u64, body: ByteStream, limit: u64) -> BlobResult<u64> {
        let result = self.write_at(offset, body, limit).await;
        if result.is_err() {
            if let Err(e) = self.truncate(offset).await {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to roll back staged chunk");
            }
        }
        result
    }

    async fn write_at(&self, offset: u64, mut body: ByteStream, limit: u64) -> BlobResult<u64> {
        let mut file = OpenOptions::new().write(true).open(&self.path).await?;
        file.set_len(offset).await?;
        file.seek(SeekFrom::Start(offset)).await?;

        let mut written = 0u64;
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            written += chunk.len() as u64;
            if written > limit {
                return Err(BlobError::malformed_range(
                    format!("{written}+ bytes"),
                    format!("chunk exceeds the {limit} byte limit"),
                ));
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(written)
    }

    /// Cut the file back to `len` bytes.
    pub async fn truncate(&self, len: u64) -> BlobResult<()> {
        let file = OpenOptions::new().write(true).open(&self.path).await?;
        file.set_len(len).await?;
        Ok(())
    }

    /// Hash the first `len` bytes without loading them into memory.
    pub async fn digest(&self, algorithm: Algorithm, len: u64) -> BlobResult<Digest> {
        let file = fs::File::open(&self.path).await?;
        let mut reader = file.take(len);
        let mut hasher = Digester::new(algorithm);
        let mut buf = vec![0u8; HASH_BUF_BYTES];
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(hasher.finish())
    }

    /// Flush the staged bytes to disk.
    pub async fn sync(&self) -> BlobResult<()> {
        let file = OpenOptions::new().write(true).open(&self.path).await?;
        file.sync_all().await?;
        Ok(())
    }

    /// Delete the file. Already gone counts as success.
    pub async fn remove(&self) -> BlobResult<()> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
