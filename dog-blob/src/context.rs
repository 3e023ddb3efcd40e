use std::sync::Arc;

use crate::{
    BlobConfig, BlobRequest, ByteRange, ContentStore, Digest, Published, SessionHandle, UploadId,
    UploadSessions,
};

/// Per-request scratch space shared by the stages of one pipeline run.
pub struct BlobContext {
    pub store: Arc<dyn ContentStore>,
    pub uploads: Arc<UploadSessions>,
    pub config: Arc<BlobConfig>,
    pub request: BlobRequest,

    pub digest: Option<Digest>,
    pub upload_id: Option<UploadId>,
    pub session: Option<SessionHandle>,
    /// `None` means no range was sent: append at the current offset.
    pub range: Option<ByteRange>,
    pub outcome: Option<Outcome>,
}

/// What the request phase decided; read by the response handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    UploadStarted(UploadId),
    ChunkAccepted { upload_id: UploadId, offset: u64 },
    /// Dedup fast path: the digest is already stored.
    AlreadyExists(Digest),
    Committed { digest: Digest, published: Published },
    Deleted(Digest),
    Status { upload_id: UploadId, offset: u64 },
    Aborted(UploadId),
}

impl BlobContext {
    pub fn new(
        store: Arc<dyn ContentStore>,
        uploads: Arc<UploadSessions>,
        config: Arc<BlobConfig>,
        request: BlobRequest,
    ) -> Self {
        Self {
            store,
            uploads,
            config,
            request,
            digest: None,
            upload_id: None,
            session: None,
            range: None,
            outcome: None,
        }
    }
}
