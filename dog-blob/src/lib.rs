//! # dog-blob: content-addressed blob storage with resumable uploads
//!
//! `dog-blob` stores immutable blobs keyed by their SHA-256 digest and accepts
//! them through a resumable, chunked upload protocol. Content is only ever
//! published after the staged bytes hash to the digest the client claimed.
//!
//! ## Key Features
//!
//! - **Content addressing**: a blob's name is `sha256:<hex>` of its bytes
//! - **Resumable uploads**: chunks are appended strictly in order; the session
//!   remembers its committed offset between requests
//! - **Dedup fast path**: uploads of content already stored finish immediately
//! - **Atomic publication**: readers never see partially written blobs
//! - **Transport agnostic**: operations take a [`BlobRequest`] and fill a
//!   [`BlobResponse`]; HTTP lives in `dog-axum`
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use dog_blob::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let dir = tempfile::tempdir()?;
//! let server = BlobServer::new(
//!     Arc::new(MemoryContentStore::default()),
//!     Arc::new(UploadSessions::new(StagingArea::new(dir.path())?)),
//!     BlobConfig::default(),
//! );
//!
//! let digest = Digest::of(Algorithm::Sha256, b"hello");
//!
//! let started = server.post_upload(BlobRequest::new()).await?;
//! let uuid = started.header("upload-uuid").unwrap().to_string();
//!
//! let done = server
//!     .put_upload(
//!         BlobRequest::new()
//!             .with_param("uuid", uuid)
//!             .with_query("digest", digest.to_string())
//!             .with_bytes(&b"hello"[..]),
//!     )
//!     .await?;
//! assert_eq!(done.status, 201);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   Transport     │  ← dog-axum routes, tests, CLIs
//! ├─────────────────┤
//! │   BlobServer    │  ← one pipeline of stages per operation
//! ├─────────────────┤
//! │ UploadSessions  │  ← staging, offsets, verification
//! ├─────────────────┤
//! │  ContentStore   │  ← published blobs
//! └─────────────────┘
//! ```

mod config;
mod context;
mod digest;
mod error;
mod fs_store;
pub mod handlers;
mod locks;
mod memory_store;
mod range;
mod server;
mod session;
mod staging;
pub mod store;
mod types;

pub use config::BlobConfig;
pub use context::{BlobContext, Outcome};
pub use digest::{Algorithm, Digest, Digester};
pub use error::{BlobError, BlobResult};
pub use fs_store::FileContentStore;
pub use memory_store::MemoryContentStore;
pub use range::ByteRange;
pub use server::BlobServer;
pub use session::{
    SessionGuard, SessionHandle, UploadSession, UploadSessions, UploadState,
};
pub use staging::{StagedFile, StagingArea};
pub use store::{BlobReader, ContentStore, Published};
pub use types::{BlobRequest, BlobResponse, ByteStream, ResponseBody, UploadId};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        Algorithm, BlobConfig, BlobError, BlobRequest, BlobResponse, BlobResult, BlobServer,
        ByteRange, ByteStream, ContentStore, Digest, FileContentStore, MemoryContentStore,
        StagingArea, UploadId, UploadSessions,
    };
}
