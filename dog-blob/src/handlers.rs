//! Pipeline stages for the blob operations.
//!
//! Request handlers parse and validate into [`BlobContext`] or perform the
//! side effect of the operation; response handlers render the recorded
//! [`Outcome`] into a [`BlobResponse`].

use anyhow::Result;
use async_trait::async_trait;
use dog_core::errors::DogError;
use dog_core::pipeline::{Flow, RequestHandler, ResponseHandler};

use crate::{
    BlobContext, BlobError, BlobResponse, ByteRange, ByteStream, Digest, Outcome, SessionHandle,
    UploadId,
};

pub const DIGEST_PARAM: &str = "digest";
pub const UUID_PARAM: &str = "uuid";
pub const DIGEST_QUERY: &str = "digest";
pub const CONTENT_RANGE: &str = "content-range";

pub fn blob_location(digest: &Digest) -> String {
    format!("/blobs/{digest}")
}

pub fn upload_location(upload_id: &UploadId) -> String {
    format!("/blobs/uploads/{upload_id}")
}

fn require_digest(ctx: &BlobContext) -> Result<Digest> {
    ctx.digest
        .clone()
        .ok_or_else(|| BlobError::malformed_digest("", "no digest given").into())
}

fn require_session(ctx: &BlobContext) -> Result<(UploadId, SessionHandle)> {
    match (ctx.upload_id, ctx.session.clone()) {
        (Some(id), Some(handle)) => Ok((id, handle)),
        _ => Err(BlobError::unknown_session("").into()),
    }
}

fn take_body(ctx: &mut BlobContext) -> ByteStream {
    ctx.request
        .take_body()
        .unwrap_or_else(|| Box::pin(futures_util::stream::empty()))
}

/// Digest from the `{digest}` path segment.
pub struct ParseDigest;

#[async_trait]
impl RequestHandler<BlobContext> for ParseDigest {
    async fn handle(&self, ctx: &mut BlobContext) -> Result<Flow> {
        let raw = ctx.request.param(DIGEST_PARAM).unwrap_or_default();
        ctx.digest = Some(Digest::parse(raw)?);
        Ok(Flow::Continue)
    }
}

/// Digest from the `?digest=` query parameter.
pub struct ParseDigestFromQuery {
    required: bool,
}

impl ParseDigestFromQuery {
    /// Missing digest is `MalformedDigest`.
    pub fn required() -> Self {
        Self { required: true }
    }

    /// Missing digest is fine; a present but invalid one is not.
    pub fn optional() -> Self {
        Self { required: false }
    }
}

#[async_trait]
impl RequestHandler<BlobContext> for ParseDigestFromQuery {
    async fn handle(&self, ctx: &mut BlobContext) -> Result<Flow> {
        match ctx.request.query(DIGEST_QUERY) {
            Some(raw) => ctx.digest = Some(Digest::parse(raw)?),
            None if self.required => {
                return Err(BlobError::malformed_digest("", "digest query parameter is required").into());
            }
            None => {}
        }
        Ok(Flow::Continue)
    }
}

/// Dedup fast path: if the digest is already stored there is nothing to upload.
pub struct EnsureDigestNotExists;

#[async_trait]
impl RequestHandler<BlobContext> for EnsureDigestNotExists {
    async fn handle(&self, ctx: &mut BlobContext) -> Result<Flow> {
        let Some(digest) = ctx.digest.clone() else {
            return Ok(Flow::Continue);
        };
        if ctx.store.exists(&digest).await? {
            tracing::debug!(%digest, "digest already stored, skipping upload");
            ctx.outcome = Some(Outcome::AlreadyExists(digest));
            return Ok(Flow::Respond);
        }
        Ok(Flow::Continue)
    }
}

/// Allocate a new upload session.
pub struct CreateUpload;

#[async_trait]
impl RequestHandler<BlobContext> for CreateUpload {
    async fn handle(&self, ctx: &mut BlobContext) -> Result<Flow> {
        let upload_id = ctx.uploads.create().await?;
        ctx.upload_id = Some(upload_id);
        ctx.outcome = Some(Outcome::UploadStarted(upload_id));
        Ok(Flow::Continue)
    }
}

/// Session id from the `{uuid}` path segment, resolved to a live session.
pub struct ParseUploadId;

#[async_trait]
impl RequestHandler<BlobContext> for ParseUploadId {
    async fn handle(&self, ctx: &mut BlobContext) -> Result<Flow> {
        let raw = ctx.request.param(UUID_PARAM).unwrap_or_default();
        let upload_id = UploadId::parse(raw)?;
        ctx.session = Some(ctx.uploads.get(&upload_id)?);
        ctx.upload_id = Some(upload_id);
        Ok(Flow::Continue)
    }
}

/// Optional `Content-Range` header.
pub struct ParseContentRange;

#[async_trait]
impl RequestHandler<BlobContext> for ParseContentRange {
    async fn handle(&self, ctx: &mut BlobContext) -> Result<Flow> {
        ctx.range = match ctx.request.header(CONTENT_RANGE) {
            Some(raw) => Some(ByteRange::parse(raw)?),
            None => None,
        };
        Ok(Flow::Continue)
    }
}

/// Append the request body as the next chunk of the session.
pub struct UploadBlobChunk;

#[async_trait]
impl RequestHandler<BlobContext> for UploadBlobChunk {
    async fn handle(&self, ctx: &mut BlobContext) -> Result<Flow> {
        let (upload_id, handle) = require_session(ctx)?;
        let body = take_body(ctx);
        let limit = ctx.config.max_chunk_bytes;

        let mut session = ctx.uploads.lock(&handle).await?;
        let offset = session.append_chunk(ctx.range, body, limit).await?;
        tracing::debug!(%upload_id, offset, "chunk accepted");

        ctx.outcome = Some(Outcome::ChunkAccepted { upload_id, offset });
        Ok(Flow::Continue)
    }
}

/// Take an optional final chunk, verify the digest, publish.
pub struct CommitUpload;

#[async_trait]
impl RequestHandler<BlobContext> for CommitUpload {
    async fn handle(&self, ctx: &mut BlobContext) -> Result<Flow> {
        let digest = require_digest(ctx)?;
        let (_, handle) = require_session(ctx)?;
        let body = ctx.request.take_body();
        let limit = ctx.config.max_chunk_bytes;

        let mut session = ctx.uploads.lock(&handle).await?;
        if let Some(body) = body {
            session.append_chunk(ctx.range, body, limit).await?;
        } else if ctx.range.is_some() {
            return Err(BlobError::malformed_range(
                ctx.range.map(|r| r.to_string()).unwrap_or_default(),
                "range given without a body",
            )
            .into());
        }

        let published = ctx
            .uploads
            .commit(&mut session, &digest, ctx.store.as_ref())
            .await?;

        ctx.outcome = Some(Outcome::Committed { digest, published });
        Ok(Flow::Continue)
    }
}

/// Remove a blob; absent blobs are not an error.
pub struct DeleteBlob;

#[async_trait]
impl RequestHandler<BlobContext> for DeleteBlob {
    async fn handle(&self, ctx: &mut BlobContext) -> Result<Flow> {
        let digest = require_digest(ctx)?;
        ctx.store.delete(&digest).await?;
        ctx.outcome = Some(Outcome::Deleted(digest));
        Ok(Flow::Continue)
    }
}

/// Report the committed offset of a session.
pub struct InspectUpload;

#[async_trait]
impl RequestHandler<BlobContext> for InspectUpload {
    async fn handle(&self, ctx: &mut BlobContext) -> Result<Flow> {
        let (upload_id, handle) = require_session(ctx)?;
        let offset = ctx.uploads.lock(&handle).await?.offset();
        ctx.outcome = Some(Outcome::Status { upload_id, offset });
        Ok(Flow::Continue)
    }
}

/// Abandon a session and its staged bytes.
pub struct AbortUpload;

#[async_trait]
impl RequestHandler<BlobContext> for AbortUpload {
    async fn handle(&self, ctx: &mut BlobContext) -> Result<Flow> {
        let (upload_id, _) = require_session(ctx)?;
        ctx.uploads.abort(&upload_id).await?;
        ctx.outcome = Some(Outcome::Aborted(upload_id));
        Ok(Flow::Continue)
    }
}

/// Stream the blob named by the parsed digest into the response.
pub struct DownloadBlob;

#[async_trait]
impl ResponseHandler<BlobContext, BlobResponse> for DownloadBlob {
    async fn respond(&self, ctx: &mut BlobContext, out: &mut BlobResponse) -> Result<()> {
        let digest = require_digest(ctx)?;
        let reader = ctx.store.read(&digest).await?;
        out.set_header("content-length", reader.size_bytes.to_string());
        out.set_stream(reader.stream, reader.size_bytes);
        Ok(())
    }
}

/// `200` with an octet-stream content type.
pub struct OkOctetStream;

#[async_trait]
impl ResponseHandler<BlobContext, BlobResponse> for OkOctetStream {
    async fn respond(&self, _ctx: &mut BlobContext, out: &mut BlobResponse) -> Result<()> {
        out.set_status(200);
        out.set_header("content-type", "application/octet-stream");
        Ok(())
    }
}

/// Tell the client where the upload (or the finished blob) lives.
pub struct ReturnUploadLocation;

#[async_trait]
impl ResponseHandler<BlobContext, BlobResponse> for ReturnUploadLocation {
    async fn respond(&self, ctx: &mut BlobContext, out: &mut BlobResponse) -> Result<()> {
        match ctx.outcome.as_ref() {
            Some(Outcome::UploadStarted(upload_id)) => {
                write_upload_headers(out, upload_id, 0);
                out.set_status(202);
            }
            Some(Outcome::ChunkAccepted { upload_id, offset }) => {
                write_upload_headers(out, upload_id, *offset);
                out.set_status(202);
            }
            Some(Outcome::AlreadyExists(digest)) | Some(Outcome::Committed { digest, .. }) => {
                out.set_header("location", blob_location(digest));
                out.set_status(201);
            }
            other => {
                return Err(DogError::general_error(format!(
                    "no upload location for outcome {other:?}"
                ))
                .into_anyhow());
            }
        }
        Ok(())
    }
}

/// `204` with the session's current range.
pub struct ReturnUploadStatus;

#[async_trait]
impl ResponseHandler<BlobContext, BlobResponse> for ReturnUploadStatus {
    async fn respond(&self, ctx: &mut BlobContext, out: &mut BlobResponse) -> Result<()> {
        if let Some(Outcome::Status { upload_id, offset }) = ctx.outcome.as_ref() {
            write_upload_headers(out, upload_id, *offset);
        }
        out.set_status(204);
        Ok(())
    }
}

/// `202` with no body.
pub struct Accepted;

#[async_trait]
impl ResponseHandler<BlobContext, BlobResponse> for Accepted {
    async fn respond(&self, _ctx: &mut BlobContext, out: &mut BlobResponse) -> Result<()> {
        out.set_status(202);
        Ok(())
    }
}

/// `204` with no body.
pub struct NoContent;

#[async_trait]
impl ResponseHandler<BlobContext, BlobResponse> for NoContent {
    async fn respond(&self, _ctx: &mut BlobContext, out: &mut BlobResponse) -> Result<()> {
        out.set_status(204);
        Ok(())
    }
}

fn write_upload_headers(out: &mut BlobResponse, upload_id: &UploadId, offset: u64) {
    out.set_header("location", upload_location(upload_id));
    out.set_header("upload-uuid", upload_id.to_string());
    // Inclusive range of committed bytes; omitted while nothing is staged.
    if offset > 0 {
        out.set_header("range", format!("0-{}", offset - 1));
    }
}
