use axum::handler::Handler;
use axum::http::HeaderName;
use axum::routing::get;
use axum::Router;
use dog_blob::BlobServer;
use tokio::net::{TcpListener, ToSocketAddrs};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::rest;
use crate::DogAxumState;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone)]
pub struct AxumApp {
    pub server: BlobServer,
    pub router: Router<()>,
}

impl AxumApp {
    pub fn new(server: BlobServer) -> Self {
        Self {
            server,
            router: Router::new(),
        }
    }

    pub fn use_get<H, T>(mut self, path: &str, handler: H) -> Self
    where
        H: Handler<T, ()> + Clone + Send + Sync + 'static,
        T: 'static,
    {
        self.router = self.router.route(path, get(handler));
        self
    }

    pub fn service<H, T>(self, path: &str, handler: H) -> Self
    where
        H: Handler<T, ()> + Clone + Send + Sync + 'static,
        T: 'static,
    {
        self.use_get(path, handler)
    }

    /// Mount the blob routes under `path` (normally `/blobs`).
    pub fn use_blobs(mut self, path: &str) -> Self {
        let state = DogAxumState::new(self.server.clone());
        self.router = self.router.nest(path, rest::blob_router(state));
        self
    }

    /// Request ids and request tracing around everything mounted so far.
    pub fn with_tracing(mut self) -> Self {
        let header = HeaderName::from_static(REQUEST_ID_HEADER);
        self.router = self
            .router
            .layer(PropagateRequestIdLayer::new(header.clone()))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::new(header, MakeRequestUuid));
        self
    }

    pub async fn listen<A>(self, addr: A) -> anyhow::Result<()>
    where
        A: ToSocketAddrs,
    {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(addr = %listener.local_addr()?, "listening");
        axum::serve(listener, self.router).await?;
        Ok(())
    }
}

pub fn axum(server: BlobServer) -> AxumApp {
    AxumApp::new(server)
}
