use crate::errors::{Error, Result};
use station::payload::UploadPayload;

const TEMP_MIN: f64 = -50.0;
const TEMP_MAX: f64 = 100.0;
const HUMIDITY_MIN: f64 = 0.0;
const HUMIDITY_MAX: f64 = 100.0;
const PRESSURE_MIN: f64 = 300.0;
const PRESSURE_MAX: f64 = 1100.0;
const LIGHT_MIN: f64 = 0.0;
const LIGHT_MAX: f64 = 200_000.0;

fn check_range(name: &str, value: f64, min: f64, max: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(Error::Validation(format!("{} is not a number", name)));
    }
    if value < min || value > max {
        return Err(Error::Validation(format!(
            "{} {} out of range [{}, {}]",
            name, value, min, max
        )));
    }
    Ok(())
}

/// Validates the station readings carried in an upload
pub fn validate(payload: &UploadPayload) -> Result<()> {
    let usv = &payload.usv;

    check_range("Temperature", usv.temp, TEMP_MIN, TEMP_MAX)?;
    check_range("Humidity", usv.humidity, HUMIDITY_MIN, HUMIDITY_MAX)?;
    check_range("Pressure", usv.pressure, PRESSURE_MIN, PRESSURE_MAX)?;
    check_range("Light", usv.light, LIGHT_MIN, LIGHT_MAX)?;

    if usv.status.trim().is_empty() {
        return Err(Error::Validation("Station status cannot be empty".to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use station::payload::PayloadBuilder;
    use station::{Reading, ReadingSet, SensorKind};
    use chrono::Utc;

    fn payload() -> UploadPayload {
        let set = ReadingSet::new(
            Utc::now(),
            vec![
                Reading::new(SensorKind::Temperature, 22.8),
                Reading::new(SensorKind::Humidity, 54.7),
                Reading::new(SensorKind::Pressure, 1012.9),
                Reading::new(SensorKind::Light, 1180.0),
            ],
        );
        PayloadBuilder::default().build(&set)
    }

    #[test]
    fn test_valid_payload() {
        assert!(validate(&payload()).is_ok());
    }

    #[test]
    fn test_invalid_temperature() {
        let mut payload = payload();
        payload.usv.temp = 150.0; // Out of range
        assert!(validate(&payload).is_err());
    }

    #[test]
    fn test_invalid_humidity() {
        let mut payload = payload();
        payload.usv.humidity = -1.0;
        assert!(validate(&payload).is_err());
    }

    #[test]
    fn test_invalid_pressure() {
        let mut payload = payload();
        payload.usv.pressure = 50.0;
        assert!(validate(&payload).is_err());
    }

    #[test]
    fn test_non_finite_light() {
        let mut payload = payload();
        payload.usv.light = f64::NAN;

        let err = validate(&payload).unwrap_err();
        assert!(err.to_string().contains("Light"));
    }

    #[test]
    fn test_empty_status() {
        let mut payload = payload();
        payload.usv.status = " ".to_string();
        assert!(validate(&payload).is_err());
    }

    #[test]
    fn test_range_bounds_are_inclusive() {
        let mut payload = payload();
        payload.usv.temp = TEMP_MAX;
        payload.usv.humidity = HUMIDITY_MIN;
        payload.usv.light = LIGHT_MAX;
        assert!(validate(&payload).is_ok());
    }
}
