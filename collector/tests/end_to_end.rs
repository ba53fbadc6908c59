use chrono::Utc;
use collector::{create_router, LatestStore};
use serde_json::{json, Value};
use station::config::ServerConfig;
use station::events::EventSender;
use station::payload::PayloadBuilder;
use station::shutdown::Shutdown;
use station::{
    DeliveryOutcome, HttpTransport, Reading, ReadingSet, RetryPolicy, SensorKind, SpillQueue,
    UplinkClient,
};
use std::time::Duration;
use tokio::net::TcpListener;

async fn start_collector() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let app = create_router("/api/esp32", LatestStore::default());

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    port
}

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn uplink(port: u16, queue: SpillQueue) -> UplinkClient<HttpTransport> {
    let server = ServerConfig {
        host: "127.0.0.1".to_string(),
        http_port: port,
        timeout_secs: 2,
        ..ServerConfig::default()
    };
    let transport = HttpTransport::new(&server, PayloadBuilder::default()).unwrap();
    let (_trigger, shutdown) = Shutdown::new();

    UplinkClient::new(
        transport,
        queue,
        RetryPolicy::new(2).with_backoff_base(Duration::from_millis(10)),
        EventSender::disconnected(),
        shutdown,
    )
}

fn reading_set(temp: f64) -> ReadingSet {
    ReadingSet::new(
        Utc::now(),
        vec![
            Reading::new(SensorKind::Temperature, temp),
            Reading::new(SensorKind::Humidity, 54.7),
            Reading::new(SensorKind::Pressure, 1012.9),
            Reading::new(SensorKind::Light, 1180.0),
        ],
    )
}

async fn latest(port: u16) -> reqwest::Response {
    reqwest::get(format!("http://127.0.0.1:{}/api/data", port))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_health() {
    let port = start_collector().await;

    let body: Value = reqwest::get(format!("http://127.0.0.1:{}/", port))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({"status": "ok"}));
}

#[tokio::test]
async fn test_no_data_before_first_upload() {
    let port = start_collector().await;
    assert_eq!(latest(port).await.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_station_upload_is_accepted() {
    let port = start_collector().await;
    let mut client = uplink(port, SpillQueue::in_memory());

    let result = client.deliver(reading_set(22.8)).await;
    assert!(result.success);
    assert_eq!(result.attempts, 1);

    let body: Value = latest(port).await.json().await.unwrap();
    assert_eq!(body["usv"]["temp"], 22.8);
    assert_eq!(body["usv"]["light"], 1180.0);
}

#[tokio::test]
async fn test_out_of_range_reading_is_rejected_once_and_queued() {
    let port = start_collector().await;
    let mut client = uplink(port, SpillQueue::in_memory());

    let result = client.deliver(reading_set(150.0)).await;

    match result.outcome {
        DeliveryOutcome::Rejected(reason) => assert!(reason.contains("Temperature")),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(result.attempts, 1);
    assert_eq!(client.queue().len(), 1);
    assert_eq!(latest(port).await.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let port = start_collector().await;

    let response = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{}/api/esp32", port))
        .header("Content-Type", "application/json")
        .body("{\"usv\": 1}")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["ok"], false);
    assert!(body["err"].is_string());
}

#[tokio::test]
async fn test_backlog_survives_restart_and_drains() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache_data.json");

    // Collector down: both sets are spilled to disk
    let mut offline = uplink(free_port(), SpillQueue::load(&path));
    assert_eq!(
        offline.deliver(reading_set(20.0)).await.outcome,
        DeliveryOutcome::Spilled
    );
    assert_eq!(
        offline.deliver(reading_set(21.0)).await.outcome,
        DeliveryOutcome::Spilled
    );
    drop(offline);

    // New process, collector up
    let port = start_collector().await;
    let mut online = uplink(port, SpillQueue::load(&path));
    assert_eq!(online.queue().len(), 2);

    let result = online.deliver(reading_set(22.0)).await;
    assert!(result.success);
    assert_eq!(result.drain.delivered, 2);
    assert!(SpillQueue::load(&path).is_empty());

    // The last set drained is the latest the collector saw
    let body: Value = latest(port).await.json().await.unwrap();
    assert_eq!(body["usv"]["temp"], 21.0);
}
