use dog_core::errors::DogError;
use serde_json::json;
use thiserror::Error;

/// Result type for blob operations
pub type BlobResult<T> = Result<T, BlobError>;

/// Errors that can occur during blob operations
#[derive(Error, Debug)]
pub enum BlobError {
    #[error("Malformed digest {value:?}: {reason}")]
    MalformedDigest { value: String, reason: String },

    #[error("Malformed content range {value:?}: {reason}")]
    MalformedRange { value: String, reason: String },

    #[error("Upload session not found: {upload_id}")]
    UnknownSession { upload_id: String },

    #[error("Chunk starts at {start} but upload is at offset {offset}")]
    RangeConflict { start: u64, offset: u64 },

    #[error("Digest mismatch: expected {expected}, content hashes to {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("Blob not found: {digest}")]
    NotFound { digest: String },

    #[error("Blob {digest} still has {refs} reference(s)")]
    Referenced { digest: String, refs: u64 },

    #[error("Storage backend error: {source}")]
    StoreFailure {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl BlobError {
    pub fn malformed_digest<V: Into<String>, R: Into<String>>(value: V, reason: R) -> Self {
        Self::MalformedDigest {
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn malformed_range<V: Into<String>, R: Into<String>>(value: V, reason: R) -> Self {
        Self::MalformedRange {
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn unknown_session<S: Into<String>>(upload_id: S) -> Self {
        Self::UnknownSession {
            upload_id: upload_id.into(),
        }
    }

    pub fn not_found<S: Into<String>>(digest: S) -> Self {
        Self::NotFound {
            digest: digest.into(),
        }
    }

    pub fn store_failure<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::StoreFailure {
            source: Box::new(error),
        }
    }

    /// Find a `BlobError` anywhere in an `anyhow` chain.
    pub fn from_anyhow(err: &anyhow::Error) -> Option<&BlobError> {
        err.chain().find_map(|e| e.downcast_ref::<BlobError>())
    }

    /// Caller-visible shape of this error.
    pub fn to_dog_error(&self) -> DogError {
        match self {
            Self::MalformedDigest { .. } | Self::MalformedRange { .. } => {
                DogError::bad_request(self.to_string())
            }
            Self::DigestMismatch { expected, actual } => DogError::bad_request(self.to_string())
                .with_data(json!({ "expected": expected, "actual": actual })),
            Self::UnknownSession { .. } | Self::NotFound { .. } => DogError::not_found(self.to_string()),
            Self::Referenced { refs, .. } => {
                DogError::conflict(self.to_string()).with_data(json!({ "refs": refs }))
            }
            Self::RangeConflict { offset, .. } => DogError::range_not_satisfiable(self.to_string())
                .with_data(json!({ "offset": offset })),
            // Internal details stay in the logs.
            Self::StoreFailure { .. } | Self::Io { .. } => DogError::general_error("Storage failure"),
        }
    }
}

impl From<BlobError> for DogError {
    fn from(err: BlobError) -> Self {
        err.to_dog_error()
    }
}
