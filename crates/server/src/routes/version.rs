//! The version descriptor resource polled by running clients.

use axum::{
    Json, Router,
    extract::State,
    http::header,
    response::IntoResponse,
    routing::get,
};

use crate::{AppState, error::ApiError};

/// Served raw (no response envelope) and never cacheable, so a client
/// always sees the build that is deployed right now
pub async fn get_version_descriptor(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let descriptor = state.publisher().current().await?;
    Ok((
        [
            (header::CACHE_CONTROL, "no-store, no-cache, must-revalidate"),
            (header::PRAGMA, "no-cache"),
            (header::EXPIRES, "0"),
        ],
        Json(descriptor),
    ))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/version.json", get(get_version_descriptor))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use utils::build_info::BuildInfo;

    use super::*;
    use crate::publisher::{DescriptorPublisher, PublisherConfig};

    #[tokio::test]
    async fn test_descriptor_response_disables_caching() {
        let state = AppState::new(DescriptorPublisher::new(
            BuildInfo::new("3.15.0", "abc-1", 1_760_000_000_000),
            PublisherConfig::default(),
        ));

        let response = get_version_descriptor(State(state))
            .await
            .unwrap()
            .into_response();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(
            headers[header::CACHE_CONTROL],
            "no-store, no-cache, must-revalidate"
        );
        assert_eq!(headers[header::PRAGMA], "no-cache");
        assert_eq!(headers[header::EXPIRES], "0");
    }

    #[tokio::test]
    async fn test_unreadable_version_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new(DescriptorPublisher::new(
            BuildInfo::new("3.15.0", "abc-1", 1),
            PublisherConfig {
                version_file: Some(dir.path().join("missing.json")),
                ..PublisherConfig::default()
            },
        ));

        let response = match get_version_descriptor(State(state)).await {
            Ok(_) => panic!("expected an error"),
            Err(e) => e.into_response(),
        };
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
