use std::sync::Arc;

use anyhow::Result;
use dog_core::pipeline::Pipeline;

use crate::handlers::{
    AbortUpload, Accepted, CommitUpload, CreateUpload, DeleteBlob, DownloadBlob,
    EnsureDigestNotExists, InspectUpload, NoContent, OkOctetStream, ParseContentRange,
    ParseDigest, ParseDigestFromQuery, ParseUploadId, ReturnUploadLocation, ReturnUploadStatus,
    UploadBlobChunk,
};
use crate::{
    BlobConfig, BlobContext, BlobRequest, BlobResponse, BlobResult, ContentStore,
    FileContentStore, StagingArea, UploadSessions,
};

type BlobPipeline = Pipeline<BlobContext, BlobResponse>;

/// The blob operations, each assembled as a pipeline of stages.
///
/// Transport adapters translate their request into a [`BlobRequest`], call
/// one of the operations and render the returned [`BlobResponse`]. Errors
/// come back as `anyhow::Error` carrying a [`crate::BlobError`].
#[derive(Clone)]
pub struct BlobServer {
    store: Arc<dyn ContentStore>,
    uploads: Arc<UploadSessions>,
    config: Arc<BlobConfig>,
}

impl BlobServer {
    pub fn new(
        store: Arc<dyn ContentStore>,
        uploads: Arc<UploadSessions>,
        config: BlobConfig,
    ) -> Self {
        Self {
            store,
            uploads,
            config: Arc::new(config),
        }
    }

    /// File-backed server using the directories named in `config`.
    pub fn from_config(config: BlobConfig) -> BlobResult<Self> {
        let store = FileContentStore::new(&config.cache_dir, config.refcount)?;
        let staging = StagingArea::new(&config.upload_dir)?;
        tracing::info!(
            cache_dir = %config.cache_dir.display(),
            upload_dir = %config.upload_dir.display(),
            refcount = config.refcount,
            "blob store opened"
        );
        Ok(Self::new(
            Arc::new(store),
            Arc::new(UploadSessions::new(staging)),
            config,
        ))
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    pub fn uploads(&self) -> &Arc<UploadSessions> {
        &self.uploads
    }

    pub fn config(&self) -> &BlobConfig {
        &self.config
    }

    /// `GET /blobs/{digest}`
    pub async fn get_blob(&self, request: BlobRequest) -> Result<BlobResponse> {
        let mut p = self.pipeline("get_blob", request);
        p.add_request_handler(Arc::new(ParseDigest))
            .add_response_handler(Arc::new(DownloadBlob))
            .add_response_handler(Arc::new(OkOctetStream));
        run(p).await
    }

    /// `POST /blobs/uploads[?digest=]`
    pub async fn post_upload(&self, request: BlobRequest) -> Result<BlobResponse> {
        let mut p = self.pipeline("post_upload", request);
        p.add_request_handler(Arc::new(ParseDigestFromQuery::optional()))
            .add_request_handler(Arc::new(EnsureDigestNotExists))
            .add_request_handler(Arc::new(CreateUpload))
            .add_response_handler(Arc::new(ReturnUploadLocation));
        run(p).await
    }

    /// `PATCH /blobs/uploads/{uuid}[?digest=]`
    pub async fn patch_upload(&self, request: BlobRequest) -> Result<BlobResponse> {
        let mut p = self.pipeline("patch_upload", request);
        p.add_request_handler(Arc::new(ParseUploadId))
            .add_request_handler(Arc::new(ParseContentRange))
            .add_request_handler(Arc::new(ParseDigestFromQuery::optional()))
            .add_request_handler(Arc::new(EnsureDigestNotExists))
            .add_request_handler(Arc::new(UploadBlobChunk))
            .add_response_handler(Arc::new(ReturnUploadLocation));
        run(p).await
    }

    /// `PUT /blobs/uploads/{uuid}?digest=`
    pub async fn put_upload(&self, request: BlobRequest) -> Result<BlobResponse> {
        let mut p = self.pipeline("put_upload", request);
        p.add_request_handler(Arc::new(ParseDigestFromQuery::required()))
            .add_request_handler(Arc::new(ParseUploadId))
            .add_request_handler(Arc::new(ParseContentRange))
            .add_request_handler(Arc::new(CommitUpload))
            .add_response_handler(Arc::new(ReturnUploadLocation));
        run(p).await
    }

    /// `DELETE /blobs/{digest}`
    pub async fn delete_blob(&self, request: BlobRequest) -> Result<BlobResponse> {
        let mut p = self.pipeline("delete_blob", request);
        p.add_request_handler(Arc::new(ParseDigest))
            .add_request_handler(Arc::new(DeleteBlob))
            .add_response_handler(Arc::new(Accepted));
        run(p).await
    }

    /// `GET /blobs/uploads/{uuid}`
    pub async fn upload_status(&self, request: BlobRequest) -> Result<BlobResponse> {
        let mut p = self.pipeline("upload_status", request);
        p.add_request_handler(Arc::new(ParseUploadId))
            .add_request_handler(Arc::new(InspectUpload))
            .add_response_handler(Arc::new(ReturnUploadStatus));
        run(p).await
    }

    /// `DELETE /blobs/uploads/{uuid}`
    pub async fn abort_upload(&self, request: BlobRequest) -> Result<BlobResponse> {
        let mut p = self.pipeline("abort_upload", request);
        p.add_request_handler(Arc::new(ParseUploadId))
            .add_request_handler(Arc::new(AbortUpload))
            .add_response_handler(Arc::new(NoContent));
        run(p).await
    }

    fn pipeline(&self, operation: &'static str, request: BlobRequest) -> BlobPipeline {
        let ctx = BlobContext::new(
            Arc::clone(&self.store),
            Arc::clone(&self.uploads),
            Arc::clone(&self.config),
            request,
        );
        Pipeline::new(operation, ctx)
    }
}

async fn run(pipeline: BlobPipeline) -> Result<BlobResponse> {
    let mut out = BlobResponse::new();
    pipeline.run(&mut out).await?;
    Ok(out)
}
