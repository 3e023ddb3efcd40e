use dog_core::DogConfig;

pub const ENV_PREFIX: &str = "BLOBSERVER";

/// Defaults, then `BLOBSERVER__*` overrides from the environment.
pub fn load_config() -> DogConfig {
    let mut config = DogConfig::new();
    let n = config.load_env(ENV_PREFIX);
    apply_defaults(&mut config);
    tracing::debug!(overrides = n, "configuration loaded");
    config
}

pub fn apply_defaults(config: &mut DogConfig) {
    config.set_default("http.host", "127.0.0.1");
    config.set_default("http.port", "5055");
    config.set_default("store.upload_dir", "./data/uploads");
    config.set_default("store.cache_dir", "./data/cache");
    config.set_default("store.refcount", "false");
    config.set_default("upload.max_chunk_bytes", (512u64 * 1024 * 1024).to_string());
}

pub fn listen_addr(config: &DogConfig) -> String {
    let host = config.get("http.host").unwrap_or("127.0.0.1");
    let port = config.get("http.port").unwrap_or("5055");
    format!("{host}:{port}")
}
