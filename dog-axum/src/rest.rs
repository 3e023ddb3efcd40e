use std::collections::HashMap;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Response,
    routing, Router,
};
use dog_blob::{BlobRequest, BlobResponse};

use crate::{params::RestParams, DogAxumError, DogAxumState};

type Reply = Result<Response, DogAxumError>;
type QueryMap = Query<HashMap<String, String>>;

/// Routes for `/blobs`, relative to wherever they are nested.
pub fn blob_router(state: DogAxumState) -> Router<()> {
    Router::new()
        .route("/uploads", routing::post(post_upload))
        .route(
            "/uploads/{uuid}",
            routing::get(upload_status)
                .patch(patch_upload)
                .put(put_upload)
                .delete(abort_upload),
        )
        .route("/{digest}", routing::get(get_blob).delete(delete_blob))
        .with_state(state)
}

async fn get_blob(
    State(state): State<DogAxumState>,
    Path(digest): Path<String>,
    headers: HeaderMap,
    Query(query): QueryMap,
) -> Reply {
    let req = request("digest", digest, &headers, query, None);
    into_http(state.server.get_blob(req).await?)
}

async fn delete_blob(
    State(state): State<DogAxumState>,
    Path(digest): Path<String>,
    headers: HeaderMap,
    Query(query): QueryMap,
) -> Reply {
    let req = request("digest", digest, &headers, query, None);
    into_http(state.server.delete_blob(req).await?)
}

async fn post_upload(
    State(state): State<DogAxumState>,
    headers: HeaderMap,
    Query(query): QueryMap,
) -> Reply {
    let req = RestParams::from_parts(HashMap::new(), &headers, query).into_blob_request(None);
    into_http(state.server.post_upload(req).await?)
}

async fn patch_upload(
    State(state): State<DogAxumState>,
    Path(uuid): Path<String>,
    headers: HeaderMap,
    Query(query): QueryMap,
    body: Body,
) -> Reply {
    let req = request("uuid", uuid, &headers, query, Some(body));
    into_http(state.server.patch_upload(req).await?)
}

async fn put_upload(
    State(state): State<DogAxumState>,
    Path(uuid): Path<String>,
    headers: HeaderMap,
    Query(query): QueryMap,
    body: Body,
) -> Reply {
    let req = request("uuid", uuid, &headers, query, Some(body));
    into_http(state.server.put_upload(req).await?)
}

async fn upload_status(
    State(state): State<DogAxumState>,
    Path(uuid): Path<String>,
    headers: HeaderMap,
    Query(query): QueryMap,
) -> Reply {
    let req = request("uuid", uuid, &headers, query, None);
    into_http(state.server.upload_status(req).await?)
}

async fn abort_upload(
    State(state): State<DogAxumState>,
    Path(uuid): Path<String>,
    headers: HeaderMap,
    Query(query): QueryMap,
) -> Reply {
    let req = request("uuid", uuid, &headers, query, None);
    into_http(state.server.abort_upload(req).await?)
}

fn request(
    param: &str,
    value: String,
    headers: &HeaderMap,
    query: HashMap<String, String>,
    body: Option<Body>,
) -> BlobRequest {
    let path = HashMap::from([(param.to_string(), value)]);
    RestParams::from_parts(path, headers, query).into_blob_request(body)
}

/// Render a [`BlobResponse`] as an HTTP response, streaming any body.
pub fn into_http(mut res: BlobResponse) -> Reply {
    let status = StatusCode::from_u16(res.status).map_err(anyhow::Error::from)?;
    let body = match res.take_stream() {
        Some(stream) => Body::from_stream(stream),
        None => Body::empty(),
    };

    let mut builder = Response::builder().status(status);
    for (name, value) in &res.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    Ok(builder.body(body).map_err(anyhow::Error::from)?)
}
