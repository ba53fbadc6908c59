use collector::{create_router, metrics, LatestStore};
use std::env;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let http_addr = env::var("HTTP_ADDR").unwrap_or_else(|_| "0.0.0.0:5000".to_string());
    let endpoint = env::var("ENDPOINT").unwrap_or_else(|_| "/api/esp32".to_string());

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if !endpoint.starts_with('/') {
        error!("ENDPOINT must start with '/', got '{}'", endpoint);
        std::process::exit(1);
    }

    info!("Starting collector");
    info!("Upload endpoint: POST {}", endpoint);

    metrics::init_metrics();

    let app = create_router(&endpoint, LatestStore::default());

    let listener = tokio::net::TcpListener::bind(&http_addr)
        .await
        .unwrap_or_else(|e| {
            error!("Failed to bind to {}: {}", http_addr, e);
            std::process::exit(1);
        });

    info!("HTTP server listening on {}", http_addr);

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received shutdown signal");
            }
        })
        .await;

    if let Err(e) = result {
        error!("HTTP server error: {}", e);
        std::process::exit(1);
    }

    info!("Shutting down");
}
