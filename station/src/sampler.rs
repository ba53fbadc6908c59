use crate::errors::{Error, Result};
use crate::model::{Reading, ReadingSet, SensorKind};
use chrono::Utc;
use rand::Rng;
use tracing::warn;

/// Produces one reading set per collection tick
pub trait Sampler: Send {
    fn read_all(&mut self) -> Result<ReadingSet>;
}

/// Reads a single sensor
pub trait SensorProbe: Send {
    fn read(&mut self, kind: SensorKind) -> Result<f64>;
}

/// Generates plausible values around fixed baselines
pub struct VirtualProbe<R> {
    rng: R,
}

impl VirtualProbe<rand::rngs::StdRng> {
    pub fn from_entropy() -> Self {
        use rand::SeedableRng;
        Self {
            rng: rand::rngs::StdRng::from_entropy(),
        }
    }
}

impl<R: Rng + Send> VirtualProbe<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng + Send> SensorProbe for VirtualProbe<R> {
    fn read(&mut self, kind: SensorKind) -> Result<f64> {
        let value = match kind {
            SensorKind::Temperature => round2(25.0 + self.rng.gen_range(-5.0..=5.0)),
            SensorKind::Humidity => round2(55.0 + self.rng.gen_range(-15.0..=15.0)),
            SensorKind::Pressure => round2(1013.25 + self.rng.gen_range(-15.0..=15.0)),
            SensorKind::Light => self.rng.gen_range(0..=1000) as f64,
        };
        Ok(value)
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Samples the configured sensors in order, skipping any that fail
pub struct SensorSampler<P> {
    sensors: Vec<SensorKind>,
    probe: P,
}

impl<P: SensorProbe> SensorSampler<P> {
    pub fn new(sensors: Vec<SensorKind>, probe: P) -> Self {
        Self { sensors, probe }
    }

    pub fn sensors(&self) -> &[SensorKind] {
        &self.sensors
    }
}

pub type VirtualSampler = SensorSampler<VirtualProbe<rand::rngs::StdRng>>;

impl VirtualSampler {
    pub fn virtual_sensors(sensors: Vec<SensorKind>) -> Self {
        Self::new(sensors, VirtualProbe::from_entropy())
    }
}

impl<P: SensorProbe> Sampler for SensorSampler<P> {
    fn read_all(&mut self) -> Result<ReadingSet> {
        let timestamp = Utc::now();
        let mut readings = Vec::with_capacity(self.sensors.len());

        for &kind in &self.sensors {
            match self.probe.read(kind) {
                Ok(value) if value.is_finite() => readings.push(Reading::new(kind, value)),
                Ok(value) => {
                    warn!("Discarding non-finite {} reading: {}", kind, value);
                }
                Err(e) => {
                    warn!("Failed to read {}: {}", kind, e);
                }
            }
        }

        Ok(ReadingSet::new(timestamp, readings))
    }
}

/// Probe that always fails, used where a sensor is wired but absent
pub struct MissingProbe;

impl SensorProbe for MissingProbe {
    fn read(&mut self, kind: SensorKind) -> Result<f64> {
        Err(Error::Sensor {
            sensor: kind,
            reason: "sensor not present".to_string(),
        })
    }
}
