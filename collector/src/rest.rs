use crate::errors::Error;
use crate::ingest::{process_upload, LatestStore};
use crate::metrics::gather_metrics;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use station::payload::{CollectorResponse, UploadPayload};

pub fn create_router(endpoint: &str, store: LatestStore) -> Router {
    Router::new()
        .route("/", get(health))
        .route(endpoint, post(ingest))
        .route("/api/data", get(get_data))
        .route("/metrics", get(metrics_handler))
        .with_state(store)
}

async fn ingest(State(store): State<LatestStore>, body: Bytes) -> Response {
    match process_upload(&body, &store).await {
        Ok(server_ts) => Json(CollectorResponse::accepted(server_ts)).into_response(),
        // Well-formed but refused: the station does not retry this one
        Err(Error::Validation(reason)) => Json(CollectorResponse::rejected(reason)).into_response(),
        Err(Error::Json(e)) => (
            StatusCode::BAD_REQUEST,
            Json(CollectorResponse::rejected(format!("invalid payload: {}", e))),
        )
            .into_response(),
    }
}

async fn get_data(State(store): State<LatestStore>) -> Result<Json<UploadPayload>, StatusCode> {
    store
        .get()
        .await
        .map(|received| Json(received.payload))
        .ok_or(StatusCode::NOT_FOUND)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn metrics_handler() -> String {
    gather_metrics()
}
