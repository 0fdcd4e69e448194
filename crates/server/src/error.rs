use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use utils::response::ApiResponse;

use crate::publisher::PublishError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Publish(#[from] PublishError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            ApiError::Publish(PublishError::Io { .. }) => {
                (StatusCode::SERVICE_UNAVAILABLE, "PublishError")
            }
            ApiError::Publish(PublishError::Invalid { .. }) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "PublishError")
            }
        };

        tracing::error!(error = %self, error_type, "Request failed");
        let body = ApiResponse::<()>::error(&format!("{}: {}", error_type, self));
        (status, Json(body)).into_response()
    }
}
