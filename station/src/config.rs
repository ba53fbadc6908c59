//! Station configuration.
//!
//! Built once at startup from an optional TOML file, then adjusted with
//! command-line / environment overrides. Every component receives the
//! section it needs by value or reference; nothing reads globals.

use crate::errors::{Error, Result};
use crate::model::SensorKind;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Http,
    Mqtt,
}

impl std::str::FromStr for TransportKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(TransportKind::Http),
            "mqtt" => Ok(TransportKind::Mqtt),
            other => Err(Error::Config(format!(
                "transport must be 'http' or 'mqtt', got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct StationConfig {
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub collection: CollectionConfig,
    pub mqtt: MqttConfig,
    pub dashboard: DashboardConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub http_port: u16,
    pub endpoint: String,
    pub timeout_secs: u64,
    pub retry_times: u32,
    pub user_agent: String,
    pub transport: TransportKind,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            http_port: 5000,
            endpoint: "/api/esp32".to_string(),
            timeout_secs: 10,
            retry_times: 3,
            user_agent: "RaspberryPi-Sensor-Client/1.0".to_string(),
            transport: TransportKind::Http,
        }
    }
}

impl ServerConfig {
    pub fn url(&self) -> String {
        format!("http://{}:{}{}", self.host, self.http_port, self.endpoint)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub path: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("cache_data.json"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    pub interval_secs: u64,
    pub sensors: Vec<SensorKind>,
    pub device_id: String,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            sensors: SensorKind::ALL.to_vec(),
            device_id: "raspberry-pi-001".to_string(),
        }
    }
}

impl CollectionConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub port: u16,
    pub topic: String,
    pub qos: u8,
    pub retain: bool,
    pub keepalive_secs: u64,
    pub timeout_secs: u64,
}

impl MqttConfig {
    /// Bound on waiting for the broker connection and for a publish ack
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            port: 1883,
            topic: "sensor/data".to_string(),
            qos: 1,
            retain: false,
            keepalive_secs: 60,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
    pub history_len: usize,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 5002,
            history_len: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub backup_enabled: bool,
    pub backup_dir: PathBuf,
    pub verbose: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            backup_enabled: true,
            backup_dir: PathBuf::from("data_backup"),
            verbose: false,
        }
    }
}

/// Values that take precedence over the file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub server_host: Option<String>,
    pub http_port: Option<u16>,
    pub interval_secs: Option<u64>,
    pub transport: Option<TransportKind>,
    pub disable_dashboard: bool,
}

impl StationConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!(
                "failed to read {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("failed to parse: {}", e)))
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let config = Self::load(path)?;
                info!("Loaded configuration from {}", path.display());
                Ok(config)
            }
            None => {
                info!("No configuration file given, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(host) = overrides.server_host {
            self.server.host = host;
        }
        if let Some(port) = overrides.http_port {
            self.server.http_port = port;
        }
        if let Some(interval) = overrides.interval_secs {
            self.collection.interval_secs = interval;
        }
        if let Some(transport) = overrides.transport {
            self.server.transport = transport;
        }
        if overrides.disable_dashboard {
            self.dashboard.enabled = false;
        }
    }

    /// Returns every problem found, empty when the configuration is usable
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.server.host.trim().is_empty() {
            problems.push("server.host must not be empty".to_string());
        }
        if self.server.http_port == 0 {
            problems.push("server.http_port must be non-zero".to_string());
        }
        if !self.server.endpoint.starts_with('/') {
            problems.push(format!(
                "server.endpoint must start with '/', got '{}'",
                self.server.endpoint
            ));
        }
        if self.server.timeout_secs < 1 {
            problems.push("server.timeout_secs must be at least 1".to_string());
        }
        if self.server.retry_times < 1 {
            problems.push("server.retry_times must be at least 1".to_string());
        }
        if self.collection.interval_secs < 1 {
            problems.push("collection.interval_secs must be at least 1".to_string());
        }
        if self.collection.sensors.is_empty() {
            problems.push("collection.sensors must list at least one sensor".to_string());
        }

        let mut seen = HashSet::new();
        for sensor in &self.collection.sensors {
            if !seen.insert(*sensor) {
                problems.push(format!("collection.sensors lists {} twice", sensor));
            }
        }

        if self.mqtt.qos > 2 {
            problems.push(format!("mqtt.qos must be 0, 1 or 2, got {}", self.mqtt.qos));
        }
        if self.server.transport == TransportKind::Mqtt && self.mqtt.port == 0 {
            problems.push("mqtt.port must be non-zero".to_string());
        }
        if self.server.transport == TransportKind::Mqtt && self.mqtt.timeout_secs == 0 {
            problems.push("mqtt.timeout_secs must be at least 1".to_string());
        }
        if self.dashboard.enabled && self.dashboard.port == 0 {
            problems.push("dashboard.port must be non-zero".to_string());
        }

        problems
    }

    pub fn log_summary(&self) {
        info!("Server: {} ({:?})", self.server.url(), self.server.transport);
        info!("Device ID: {}", self.collection.device_id);
        info!(
            "Sensors: {}",
            self.collection
                .sensors
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        info!(
            "Interval: {}s, timeout: {}s, attempts: {}",
            self.collection.interval_secs, self.server.timeout_secs, self.server.retry_times
        );
        if self.cache.enabled {
            info!("Spill store: {}", self.cache.path.display());
        } else {
            info!("Spill store: disabled (memory only)");
        }
        if self.dashboard.enabled {
            info!("Dashboard: http://0.0.0.0:{}", self.dashboard.port);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = StationConfig::default();
        assert!(config.validate().is_empty());
        assert_eq!(config.server.url(), "http://127.0.0.1:5000/api/esp32");
        assert_eq!(config.server.retry_times, 3);
        assert_eq!(config.collection.sensors, SensorKind::ALL.to_vec());
    }

    #[test]
    fn test_partial_file() {
        let config = StationConfig::parse(
            r#"
            [server]
            host = "collector.local"
            retry_times = 5

            [collection]
            interval_secs = 10
            sensors = ["light", "temperature"]
            "#,
        )
        .unwrap();

        assert_eq!(config.server.host, "collector.local");
        assert_eq!(config.server.retry_times, 5);
        assert_eq!(config.server.http_port, 5000);
        assert_eq!(
            config.collection.sensors,
            vec![SensorKind::Light, SensorKind::Temperature]
        );
        assert!(config.cache.enabled);
    }

    #[test]
    fn test_unknown_sensor_fails_parse() {
        let result = StationConfig::parse(
            r#"
            [collection]
            sensors = ["temperature", "co2"]
            "#,
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_validation_collects_all_problems() {
        let mut config = StationConfig::default();
        config.server.host = "".to_string();
        config.server.endpoint = "api".to_string();
        config.collection.interval_secs = 0;
        config.server.retry_times = 0;
        config.collection.sensors = vec![SensorKind::Light, SensorKind::Light];
        config.mqtt.qos = 3;

        let problems = config.validate();
        assert_eq!(problems.len(), 6);
    }

    #[test]
    fn test_mqtt_timeout_checked_only_for_mqtt() {
        let mut config = StationConfig::default();
        config.mqtt.timeout_secs = 0;
        assert!(config.validate().is_empty());

        config.server.transport = TransportKind::Mqtt;
        assert_eq!(
            config.validate(),
            vec!["mqtt.timeout_secs must be at least 1".to_string()]
        );
    }

    #[test]
    fn test_overrides() {
        let mut config = StationConfig::default();
        config.apply(Overrides {
            server_host: Some("10.0.0.2".to_string()),
            http_port: Some(8080),
            interval_secs: Some(5),
            transport: Some(TransportKind::Mqtt),
            disable_dashboard: true,
        });

        assert_eq!(config.server.url(), "http://10.0.0.2:8080/api/esp32");
        assert_eq!(config.collection.interval(), Duration::from_secs(5));
        assert_eq!(config.server.transport, TransportKind::Mqtt);
        assert!(!config.dashboard.enabled);
    }

    #[test]
    fn test_transport_from_str() {
        assert_eq!("HTTP".parse::<TransportKind>().unwrap(), TransportKind::Http);
        assert_eq!("mqtt".parse::<TransportKind>().unwrap(), TransportKind::Mqtt);
        assert!("carrier-pigeon".parse::<TransportKind>().is_err());
    }
}
