use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;
use utils::{build_info::BuildInfo, response::ApiResponse};

use crate::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct HealthInfo {
    pub status: &'static str,
    pub build: BuildInfo,
}

pub async fn health(State(state): State<AppState>) -> Json<ApiResponse<HealthInfo>> {
    Json(ApiResponse::success(HealthInfo {
        status: "ok",
        build: state.publisher().build().clone(),
    }))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}
