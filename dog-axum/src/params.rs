use std::collections::HashMap;

use axum::body::Body;
use axum::http::HeaderMap;
use dog_blob::{BlobRequest, ByteStream};
use futures::TryStreamExt;

/// The parts of an HTTP request the blob operations look at.
#[derive(Debug, Clone, Default)]
pub struct RestParams {
    pub path: HashMap<String, String>,
    pub headers: HashMap<String, String>,
    pub query: HashMap<String, String>,
}

impl RestParams {
    pub fn from_parts(
        path: HashMap<String, String>,
        headers: &HeaderMap,
        query: HashMap<String, String>,
    ) -> Self {
        let mut out = Self {
            path,
            headers: HashMap::new(),
            query,
        };

        for (k, v) in headers.iter() {
            if let Ok(s) = v.to_str() {
                out.headers.insert(k.as_str().to_string(), s.to_string());
            }
        }

        out
    }

    /// Build the transport-neutral request, streaming `body` if given.
    pub fn into_blob_request(self, body: Option<Body>) -> BlobRequest {
        let mut req = BlobRequest::new();
        for (k, v) in self.path {
            req = req.with_param(k, v);
        }
        for (k, v) in self.query {
            req = req.with_query(k, v);
        }
        for (k, v) in self.headers {
            req = req.with_header(k, v);
        }
        match body {
            Some(body) => req.with_body(body_stream(body)),
            None => req,
        }
    }
}

/// Adapt an axum body to the byte stream the upload path consumes.
pub fn body_stream(body: Body) -> ByteStream {
    Box::pin(body.into_data_stream().map_err(std::io::Error::other))
}
