//! dog-axum: Axum adapter for the dog-blob server.
//!
//! Maps the `/blobs` HTTP surface onto [`dog_blob::BlobServer`] operations
//! and renders failures as Feathers-style JSON errors.

pub mod app;
pub mod params;
pub mod rest;
pub mod state;
mod error;
pub use error::DogAxumError;
pub use state::DogAxumState;

pub use app::{axum, AxumApp, REQUEST_ID_HEADER};
