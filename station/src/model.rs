use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The environmental quantities a station can sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    Temperature,
    Humidity,
    Pressure,
    Light,
}

impl SensorKind {
    pub const ALL: [SensorKind; 4] = [
        SensorKind::Temperature,
        SensorKind::Humidity,
        SensorKind::Pressure,
        SensorKind::Light,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SensorKind::Temperature => "temperature",
            SensorKind::Humidity => "humidity",
            SensorKind::Pressure => "pressure",
            SensorKind::Light => "light",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            SensorKind::Temperature => "°C",
            SensorKind::Humidity => "%",
            SensorKind::Pressure => "hPa",
            SensorKind::Light => "lux",
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One sensor value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub name: SensorKind,
    pub value: f64,
    pub unit: String,
}

impl Reading {
    pub fn new(name: SensorKind, value: f64) -> Self {
        Self {
            name,
            value,
            unit: name.unit().to_string(),
        }
    }
}

/// All readings taken during one collection tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingSet {
    pub timestamp: DateTime<Utc>,
    pub readings: Vec<Reading>,
}

impl ReadingSet {
    pub fn new(timestamp: DateTime<Utc>, readings: Vec<Reading>) -> Self {
        Self {
            timestamp,
            readings,
        }
    }

    pub fn value_of(&self, kind: SensorKind) -> Option<f64> {
        self.readings
            .iter()
            .find(|r| r.name == kind)
            .map(|r| r.value)
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_value_lookup() {
        let set = ReadingSet::new(
            Utc::now(),
            vec![
                Reading::new(SensorKind::Temperature, 22.8),
                Reading::new(SensorKind::Light, 1180.0),
            ],
        );

        assert_eq!(set.value_of(SensorKind::Temperature), Some(22.8));
        assert_eq!(set.value_of(SensorKind::Light), Some(1180.0));
        assert_eq!(set.value_of(SensorKind::Humidity), None);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_units() {
        assert_eq!(Reading::new(SensorKind::Pressure, 1012.9).unit, "hPa");
        assert_eq!(SensorKind::Temperature.unit(), "°C");
    }

    #[test]
    fn test_wire_shape() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let set = ReadingSet::new(ts, vec![Reading::new(SensorKind::Humidity, 54.7)]);

        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(json["timestamp"], "2024-01-01T12:00:00Z");
        assert_eq!(json["readings"][0]["name"], "humidity");
        assert_eq!(json["readings"][0]["unit"], "%");
    }

    #[test]
    fn test_unknown_sensor_name_rejected() {
        let parsed = serde_json::from_str::<SensorKind>("\"co2\"");
        assert!(parsed.is_err());
    }
}
