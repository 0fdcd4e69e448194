pub mod error;
pub mod publisher;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::publisher::DescriptorPublisher;

#[derive(Clone)]
pub struct AppState {
    publisher: Arc<DescriptorPublisher>,
}

impl AppState {
    pub fn new(publisher: DescriptorPublisher) -> Self {
        Self {
            publisher: Arc::new(publisher),
        }
    }

    pub fn publisher(&self) -> &DescriptorPublisher {
        &self.publisher
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(routes::version::router())
        .nest("/api", routes::health::router())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
