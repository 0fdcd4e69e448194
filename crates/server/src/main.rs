use anyhow::Context;
use server::{
    AppState, build_router,
    publisher::{DescriptorPublisher, PublisherConfig},
};
use tokio::net::TcpListener;
use tracing::info;
use utils::{build_info::BuildInfo, env::env_string, logging::init_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing("info");

    let build = BuildInfo::current();
    let config = PublisherConfig::from_env();
    info!(
        build = %build,
        version_file = ?config.version_file,
        force_update = config.force_update,
        "Publishing version descriptor"
    );

    let host = env_string("HOST").unwrap_or_else(|| "127.0.0.1".to_string());
    let port = env_string("PORT").unwrap_or_else(|| "8080".to_string());
    let addr = format!("{host}:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Server listening on http://{}", listener.local_addr()?);

    let app = build_router(AppState::new(DescriptorPublisher::new(build, config)));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}
