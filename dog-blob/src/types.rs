use std::collections::{BTreeMap, HashMap};
use std::pin::Pin;

use bytes::Bytes;
use futures_core::Stream;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{BlobError, BlobResult};

/// Stream of bytes for blob content
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Identifier of a resumable upload session (a v4 UUID).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UploadId(Uuid);

impl UploadId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a client-supplied id. Anything that is not a UUID can never name
    /// a session, so it is reported as an unknown session.
    pub fn parse(raw: &str) -> BlobResult<Self> {
        Uuid::parse_str(raw.trim())
            .map(Self)
            .map_err(|_| BlobError::unknown_session(raw))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for UploadId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UploadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Transport-neutral inbound request.
///
/// `params` are path parameters (`digest`, `uuid`), `headers` are keyed by
/// lowercase name.
#[derive(Default)]
pub struct BlobRequest {
    pub params: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub headers: HashMap<String, String>,
    pub body: Option<ByteStream>,
}

impl BlobRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_param<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_query<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn with_header<K: AsRef<str>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.headers.insert(key.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: ByteStream) -> Self {
        self.body = Some(body);
        self
    }

    /// Body from an in-memory buffer.
    pub fn with_bytes<B: Into<Bytes>>(self, data: B) -> Self {
        let data: Bytes = data.into();
        let stream = futures_util::stream::once(async move { Ok::<_, std::io::Error>(data) });
        self.with_body(Box::pin(stream))
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(|s| s.as_str())
    }

    pub fn query(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(|s| s.as_str())
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(&key.to_ascii_lowercase()).map(|s| s.as_str())
    }

    /// Take the body, leaving `None` behind.
    pub fn take_body(&mut self) -> Option<ByteStream> {
        self.body.take()
    }
}

/// Output channel written by response handlers.
pub struct BlobResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: ResponseBody,
}

/// Body of a [`BlobResponse`].
pub enum ResponseBody {
    Empty,
    Stream { stream: ByteStream, length: u64 },
}

impl Default for BlobResponse {
    fn default() -> Self {
        Self {
            status: 200,
            headers: BTreeMap::new(),
            body: ResponseBody::Empty,
        }
    }
}

impl BlobResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_status(&mut self, status: u16) {
        self.status = status;
    }

    pub fn set_header<K: AsRef<str>, V: Into<String>>(&mut self, key: K, value: V) {
        self.headers.insert(key.as_ref().to_ascii_lowercase(), value.into());
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(&key.to_ascii_lowercase()).map(|s| s.as_str())
    }

    pub fn set_stream(&mut self, stream: ByteStream, length: u64) {
        self.body = ResponseBody::Stream { stream, length };
    }

    /// Take the body stream out, if any.
    pub fn take_stream(&mut self) -> Option<ByteStream> {
        match std::mem::replace(&mut self.body, ResponseBody::Empty) {
            ResponseBody::Stream { stream, .. } => Some(stream),
            ResponseBody::Empty => None,
        }
    }
}

impl std::fmt::Debug for BlobResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let body = match &self.body {
            ResponseBody::Empty => "empty".to_string(),
            ResponseBody::Stream { length, .. } => format!("stream({length} bytes)"),
        };
        f.debug_struct("BlobResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body", &body)
            .finish()
    }
}
