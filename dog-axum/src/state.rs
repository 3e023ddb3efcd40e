use dog_blob::{BlobConfig, BlobResult, BlobServer};

#[derive(Clone)]
pub struct DogAxumState {
    pub server: BlobServer,
}

impl DogAxumState {
    pub fn new(server: BlobServer) -> Self {
        Self { server }
    }

    pub fn from_config(config: BlobConfig) -> BlobResult<Self> {
        Ok(Self::new(BlobServer::from_config(config)?))
    }
}
