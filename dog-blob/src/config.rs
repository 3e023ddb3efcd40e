use std::path::PathBuf;

use dog_core::DogConfigSnapshot;

/// Configuration for the blob server
#[derive(Debug, Clone)]
pub struct BlobConfig {
    /// Where partial uploads are staged
    pub upload_dir: PathBuf,

    /// Where published blobs live
    pub cache_dir: PathBuf,

    /// Track references and refuse to delete referenced blobs
    pub refcount: bool,

    /// Upper bound for the body of a single chunk request
    pub max_chunk_bytes: u64,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("./data/uploads"),
            cache_dir: PathBuf::from("./data/cache"),
            refcount: false,
            max_chunk_bytes: 512 * 1024 * 1024, // 512MB
        }
    }
}

impl BlobConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `store.*` and `upload.*` keys, falling back to defaults.
    pub fn from_snapshot(cfg: &DogConfigSnapshot) -> Self {
        let defaults = Self::default();
        Self {
            upload_dir: cfg
                .get_string("store.upload_dir")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            cache_dir: cfg
                .get_string("store.cache_dir")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            refcount: cfg.get_bool("store.refcount").unwrap_or(defaults.refcount),
            max_chunk_bytes: cfg
                .get_u64("upload.max_chunk_bytes")
                .unwrap_or(defaults.max_chunk_bytes),
        }
    }

    /// Put both directories under `root` (`root/uploads`, `root/cache`)
    pub fn with_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        let root = root.into();
        self.upload_dir = root.join("uploads");
        self.cache_dir = root.join("cache");
        self
    }

    pub fn with_refcount(mut self, enabled: bool) -> Self {
        self.refcount = enabled;
        self
    }

    pub fn with_max_chunk_bytes(mut self, bytes: u64) -> Self {
        self.max_chunk_bytes = bytes;
        self
    }
}
