use axum::{
    extract::{FromRequest, Request},
    Json,
};

use crate::errors::ApiError;

/// JSON extractor whose rejection is the crate's error envelope instead
/// of axum's plain-text default.
pub struct AppJson<T>(pub T);

impl<T, S> FromRequest<S> for AppJson<T>
where
    T: serde::de::DeserializeOwned + 'static,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(|rejection| {
            tracing::warn!("Rejected request body: {}", rejection);
            ApiError::bad_request(format!("Failed to parse JSON request body: {}", rejection))
        })?;

        Ok(AppJson(value))
    }
}
