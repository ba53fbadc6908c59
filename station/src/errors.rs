use crate::model::SensorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status code: {0}")]
    Status(u16),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Rejected by collector: {0}")]
    Rejected(String),

    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    #[error("Spill store error: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Sensor {sensor} failed: {reason}")]
    Sensor { sensor: SensorKind, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse grouping used to pick log levels and retry behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transport,
    Protocol,
    Application,
    Persistence,
    Sampler,
    Config,
}

impl Error {
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::Timeout | Error::Connect(_) | Error::Http(_) | Error::Mqtt(_) => {
                ErrorClass::Transport
            }
            Error::Status(_) | Error::MalformedResponse(_) => ErrorClass::Protocol,
            Error::Rejected(_) => ErrorClass::Application,
            Error::Persistence(_) | Error::Io(_) | Error::Json(_) => ErrorClass::Persistence,
            Error::Sensor { .. } => ErrorClass::Sampler,
            Error::Config(_) => ErrorClass::Config,
        }
    }

    /// Determine if another delivery attempt could succeed
    pub fn is_retryable(&self) -> bool {
        match self.class() {
            // The link or the collector may recover
            ErrorClass::Transport | ErrorClass::Protocol => true,

            // The collector validly refused these bytes
            ErrorClass::Application => false,

            ErrorClass::Persistence | ErrorClass::Sampler | ErrorClass::Config => false,
        }
    }
}
