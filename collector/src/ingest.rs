use crate::errors::Result;
use crate::metrics::{ACCEPTED_TOTAL, MALFORMED_TOTAL, REJECTED_TOTAL, UPLOADS_TOTAL};
use crate::validate::validate;
use chrono::Utc;
use station::payload::UploadPayload;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct Received {
    pub payload: UploadPayload,
    pub server_ts: i64,
}

/// Holds the most recent accepted upload
#[derive(Debug, Clone, Default)]
pub struct LatestStore {
    inner: Arc<RwLock<Option<Received>>>,
}

impl LatestStore {
    pub async fn get(&self) -> Option<Received> {
        self.inner.read().await.clone()
    }

    async fn put(&self, received: Received) {
        *self.inner.write().await = Some(received);
    }
}

/// Parse, validate and store one upload body. Returns the server timestamp
/// assigned to an accepted upload.
pub async fn process_upload(body: &[u8], store: &LatestStore) -> Result<i64> {
    UPLOADS_TOTAL.inc();
    debug!("Received upload, size: {} bytes", body.len());

    let payload: UploadPayload = serde_json::from_slice(body).map_err(|e| {
        MALFORMED_TOTAL.inc();
        warn!("Malformed upload: {}", e);
        e
    })?;

    if let Err(e) = validate(&payload) {
        REJECTED_TOTAL.inc();
        warn!("Rejected upload: {}", e);
        return Err(e);
    }

    let server_ts = Utc::now().timestamp();
    info!(
        "Accepted upload: temp={} humidity={} pressure={} light={}",
        payload.usv.temp, payload.usv.humidity, payload.usv.pressure, payload.usv.light
    );

    store.put(Received { payload, server_ts }).await;
    ACCEPTED_TOTAL.inc();
    Ok(server_ts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;
    use serde_json::json;

    fn body(temp: f64) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "uav": {"lng": 120.6551, "lat": 36.1251, "alt": 55.3, "status": "Ready"},
            "usv": {
                "lng": 120.6621, "lat": 36.1182,
                "temp": temp, "humidity": 54.7, "pressure": 1012.9, "light": 1180,
                "status": "Active"
            },
            "scores": {"water_quality": 91.2, "dam_safety": 97.5}
        }))
        .unwrap()
    }

    #[test]
    fn test_process_upload_valid() {
        tokio_test::block_on(async {
            let store = LatestStore::default();

            let ts = process_upload(&body(22.8), &store).await.unwrap();

            let latest = store.get().await.unwrap();
            assert_eq!(latest.server_ts, ts);
            assert_eq!(latest.payload.usv.temp, 22.8);
            assert_eq!(latest.payload.usv.light, 1180.0);
        });
    }

    #[test]
    fn test_process_upload_invalid_json() {
        tokio_test::block_on(async {
            let store = LatestStore::default();

            let result = process_upload(b"invalid json", &store).await;
            assert!(matches!(result, Err(Error::Json(_))));
            assert!(store.get().await.is_none());
        });
    }

    #[test]
    fn test_process_upload_out_of_range_keeps_previous() {
        tokio_test::block_on(async {
            let store = LatestStore::default();
            process_upload(&body(22.8), &store).await.unwrap();

            let result = process_upload(&body(999.0), &store).await;
            assert!(matches!(result, Err(Error::Validation(_))));
            assert_eq!(store.get().await.unwrap().payload.usv.temp, 22.8);
        });
    }
}
