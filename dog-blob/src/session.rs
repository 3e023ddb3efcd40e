use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::{
    BlobError, BlobResult, ByteRange, ByteStream, ContentStore, Digest, Published, StagedFile,
    StagingArea, UploadId,
};

/// Lifecycle of an upload session.
///
/// `Created → Uploading → Committed`, with `Aborted` reachable from either
/// non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadState {
    Created,
    Uploading,
    Committed,
    Aborted,
}

impl UploadState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadState::Committed | UploadState::Aborted)
    }
}

/// One in-progress resumable upload.
#[derive(Debug)]
pub struct UploadSession {
    id: UploadId,
    offset: u64,
    state: UploadState,
    staging: StagedFile,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UploadSession {
    fn new(id: UploadId, staging: StagedFile) -> Self {
        let now = Utc::now();
        Self {
            id,
            offset: 0,
            state: UploadState::Created,
            staging,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> UploadId {
        self.id
    }

    /// Bytes committed so far; the next chunk must start here.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn state(&self) -> UploadState {
        self.state
    }

    pub fn staging(&self) -> &StagedFile {
        &self.staging
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Append one contiguous chunk and return the new offset.
    ///
    /// A specified range must start at the current offset and cover exactly
    /// the bytes in `body`. Without a range the body is appended as is.
    pub async fn append_chunk(
        &mut self,
        range: Option<ByteRange>,
        body: ByteStream,
        limit: u64,
    ) -> BlobResult<u64> {
        if self.state.is_terminal() {
            return Err(BlobError::unknown_session(self.id.to_string()));
        }
        if let Some(range) = range {
            if range.start() != self.offset {
                return Err(BlobError::RangeConflict {
                    start: range.start(),
                    offset: self.offset,
                });
            }
        }

        let limit = range.map_or(limit, |r| r.len().min(limit));
        let written = self.staging.append(self.offset, body, limit).await?;

        if let Some(range) = range {
            if written != range.len() {
                self.staging.truncate(self.offset).await?;
                return Err(BlobError::malformed_range(
                    range.to_string(),
                    format!("range covers {} bytes but body has {written}", range.len()),
                ));
            }
        }

        self.offset += written;
        self.state = UploadState::Uploading;
        self.updated_at = Utc::now();
        Ok(self.offset)
    }

    /// Check the staged bytes against `expected`.
    ///
    /// On mismatch the session is left as it was so the caller can retry.
    pub async fn verify(&self, expected: &Digest) -> BlobResult<()> {
        self.staging.truncate(self.offset).await?;
        let actual = self.staging.digest(expected.algorithm(), self.offset).await?;
        if actual != *expected {
            tracing::warn!(upload_id = %self.id, %expected, %actual, "staged content does not match digest");
            return Err(BlobError::DigestMismatch {
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }
        Ok(())
    }
}

/// Shared handle to a session; the mutex serialises everything that touches
/// its offset or staging file.
pub type SessionHandle = Arc<AsyncMutex<UploadSession>>;

/// Exclusive access to one session.
pub type SessionGuard = OwnedMutexGuard<UploadSession>;

/// Registry of live upload sessions.
///
/// The map lock is held only for lookups; per-session work happens under the
/// session's own lock so unrelated uploads never wait on each other.
pub struct UploadSessions {
    staging: StagingArea,
    sessions: Mutex<HashMap<UploadId, SessionHandle>>,
}

impl UploadSessions {
    pub fn new(staging: StagingArea) -> Self {
        Self {
            staging,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    pub fn contains(&self, upload_id: &UploadId) -> bool {
        self.sessions.lock().contains_key(upload_id)
    }

    /// Start a new session with an empty staging file at offset 0.
    pub async fn create(&self) -> BlobResult<UploadId> {
        let upload_id = UploadId::new();
        let staged = self.staging.create(&upload_id).await?;
        let session = UploadSession::new(upload_id, staged);

        self.sessions
            .lock()
            .insert(upload_id, Arc::new(AsyncMutex::new(session)));
        tracing::info!(%upload_id, "upload session created");
        Ok(upload_id)
    }

    pub fn get(&self, upload_id: &UploadId) -> BlobResult<SessionHandle> {
        self.sessions
            .lock()
            .get(upload_id)
            .cloned()
            .ok_or_else(|| BlobError::unknown_session(upload_id.to_string()))
    }

    /// Wait for exclusive access. Fails if the session ended while waiting.
    pub async fn lock(&self, handle: &SessionHandle) -> BlobResult<SessionGuard> {
        let guard = Arc::clone(handle).lock_owned().await;
        if guard.state.is_terminal() {
            return Err(BlobError::unknown_session(guard.id.to_string()));
        }
        Ok(guard)
    }

    /// Verify the staged content against `digest` and publish it.
    ///
    /// The session is removed only once the store has accepted the content;
    /// any failure leaves it resumable.
    pub async fn commit(
        &self,
        session: &mut SessionGuard,
        digest: &Digest,
        store: &dyn ContentStore,
    ) -> BlobResult<Published> {
        session.verify(digest).await?;
        let published = store.publish(&session.staging, digest).await?;

        session.state = UploadState::Committed;
        session.updated_at = Utc::now();
        self.sessions.lock().remove(&session.id);
        tracing::info!(upload_id = %session.id, %digest, bytes = session.offset, ?published, "upload committed");
        Ok(published)
    }

    /// Abandon a session and delete its staging file.
    pub async fn abort(&self, upload_id: &UploadId) -> BlobResult<()> {
        let handle = self.get(upload_id)?;
        let mut session = self.lock(&handle).await?;

        session.state = UploadState::Aborted;
        session.updated_at = Utc::now();
        self.sessions.lock().remove(upload_id);

        if let Err(e) = session.staging.remove().await {
            tracing::warn!(%upload_id, error = %e, "failed to remove staging file");
        }
        tracing::info!(%upload_id, "upload aborted");
        Ok(())
    }

    /// Committed offset of a live session.
    pub async fn offset(&self, upload_id: &UploadId) -> BlobResult<u64> {
        let handle = self.get(upload_id)?;
        let session = self.lock(&handle).await?;
        Ok(session.offset)
    }
}
