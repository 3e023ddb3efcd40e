mod app;

use anyhow::Result;
use dog_axum::{axum, AxumApp};
use dog_blob::{BlobConfig, BlobServer};
use dog_core::DogConfig;

pub use app::{apply_defaults, listen_addr, load_config, ENV_PREFIX};

pub fn build(config: &DogConfig) -> Result<AxumApp> {
    let blob_config = BlobConfig::from_snapshot(&config.snapshot());
    let server = BlobServer::from_config(blob_config)?;

    let ax = axum(server)
        .use_blobs("/blobs")
        .service("/health", || async { "ok" })
        .with_tracing();

    Ok(ax)
}
