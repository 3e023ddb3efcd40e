use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use dog_blob::BlobError;
use dog_core::errors::DogError;

#[derive(Debug)]
pub struct DogAxumError(pub anyhow::Error);

impl From<anyhow::Error> for DogAxumError {
    fn from(e: anyhow::Error) -> Self {
        Self(e)
    }
}

impl From<BlobError> for DogAxumError {
    fn from(e: BlobError) -> Self {
        Self(e.into())
    }
}

impl DogAxumError {
    /// The caller-visible error, whatever was raised underneath.
    pub fn to_dog_error(&self) -> DogError {
        if let Some(blob) = BlobError::from_anyhow(&self.0) {
            return blob.to_dog_error();
        }
        // A DogError anywhere in the chain keeps its Feathers-ish fields
        if let Some(dog) = self.0.chain().find_map(|e| e.downcast_ref::<DogError>()) {
            return dog.sanitize_for_client();
        }
        // Fallback: wrap any non-DogError as a DogError::GeneralError
        DogError::general_error(self.0.to_string())
    }
}

impl IntoResponse for DogAxumError {
    fn into_response(self) -> Response {
        let dog = self.to_dog_error();
        if dog.kind.is_client_error() {
            tracing::debug!(error = %self.0, code = dog.code(), "request rejected");
        } else {
            tracing::error!(error = ?self.0, code = dog.code(), "request failed");
        }

        let status = StatusCode::from_u16(dog.code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(dog.to_json())).into_response()
    }
}
