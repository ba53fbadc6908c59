use crate::config::ServerConfig;
use crate::errors::{Error, Result};
use crate::model::ReadingSet;
use crate::payload::{CollectorResponse, PayloadBuilder};
use std::future::Future;
use tracing::{debug, info};

/// Acknowledgement of one delivered reading set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Ack {
    pub server_ts: Option<i64>,
}

/// A single delivery attempt to the collector. Implementations never retry.
pub trait Transport: Send + Sync {
    fn send(&self, set: &ReadingSet) -> impl Future<Output = Result<Ack>> + Send;

    /// Where deliveries go, for log lines
    fn target(&self) -> String;
}

/// Posts the fixed-shape JSON payload to the collector endpoint
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    builder: PayloadBuilder,
    verbose: bool,
}

impl HttpTransport {
    pub fn new(server: &ServerConfig, builder: PayloadBuilder) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(server.timeout())
            .user_agent(server.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            url: server.url(),
            builder,
            verbose: false,
        })
    }

    /// Log every accepted payload at info level
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

impl Transport for HttpTransport {
    async fn send(&self, set: &ReadingSet) -> Result<Ack> {
        let payload = self.builder.build(set);

        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            debug!("Collector answered {} for {}", status, self.url);
            return Err(Error::Status(status.as_u16()));
        }

        let body = response.bytes().await.map_err(classify)?;
        let reply = serde_json::from_slice::<CollectorResponse>(&body)
            .map_err(|e| Error::MalformedResponse(e.to_string()))?;

        if !reply.ok {
            return Err(Error::Rejected(
                reply.err.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }

        if self.verbose {
            if let Ok(json) = serde_json::to_string(&payload) {
                info!("Sent payload: {}", json);
            }
        }

        Ok(Ack {
            server_ts: reply.server_ts,
        })
    }

    fn target(&self) -> String {
        self.url.clone()
    }
}

fn classify(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout
    } else if e.is_connect() {
        Error::Connect(e.to_string())
    } else {
        Error::Http(e)
    }
}
