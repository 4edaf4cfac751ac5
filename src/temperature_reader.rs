use core::fmt;

use crate::log::*;

/// Value reported by DS18B20 drivers when the probe does not answer.
pub const DISCONNECTED_C: f32 = -127.0;
/// Anything colder than this is treated as a bad reading.
pub const PLAUSIBLE_FLOOR_C: f32 = -50.0;

const FILTER_LEN: usize = 3;

/// Temperature sensor fault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorFault {
    /// Sentinel reading, probe unplugged.
    Disconnected,
    /// Reading below the plausible floor.
    Implausible,
    /// Driver-level failure (no presence pulse, CRC mismatch, timeout).
    Bus,
}

impl fmt::Display for SensorFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorFault::Disconnected => write!(f, "Sensor disconnected"),
            SensorFault::Implausible => write!(f, "Implausible reading"),
            SensorFault::Bus => write!(f, "Sensor bus error"),
        }
    }
}

/// Raw temperature source. One call triggers a conversion and returns the
/// result in °C.
#[allow(async_fn_in_trait)]
pub trait TemperatureSensor {
    async fn read_celsius(&mut self) -> Result<f32, SensorFault>;
}

/// One filtered sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSample {
    pub temperature: f32,
    pub raw: f32,
}

/// Three-slot moving average over accepted readings, most recent last.
#[derive(Debug, Clone, Default)]
pub struct MovingAverage {
    readings: [f32; FILTER_LEN],
    filled: usize,
}

impl MovingAverage {
    pub const fn new() -> Self {
        Self {
            readings: [0.0; FILTER_LEN],
            filled: 0,
        }
    }

    /// Shift `raw` in, dropping the oldest reading, and return the mean of
    /// the filled slots.
    pub fn push(&mut self, raw: f32) -> f32 {
        self.readings.rotate_left(1);
        self.readings[FILTER_LEN - 1] = raw;
        if self.filled < FILTER_LEN {
            self.filled += 1;
        }
        self.mean()
    }

    pub fn mean(&self) -> f32 {
        if self.filled == 0 {
            return 0.0;
        }
        let window = &self.readings[FILTER_LEN - self.filled..];
        window.iter().sum::<f32>() / self.filled as f32
    }

    /// Filled slots, oldest first.
    pub fn readings(&self) -> &[f32] {
        &self.readings[FILTER_LEN - self.filled..]
    }
}

/// Classify a raw reading before it reaches the filter.
pub fn validate(raw: f32) -> Result<f32, SensorFault> {
    if raw == DISCONNECTED_C {
        Err(SensorFault::Disconnected)
    } else if raw.is_nan() || raw < PLAUSIBLE_FLOOR_C {
        Err(SensorFault::Implausible)
    } else {
        Ok(raw)
    }
}

pub struct TemperatureReader<S> {
    sensor: S,
    filter: MovingAverage,
}

impl<S: TemperatureSensor> TemperatureReader<S> {
    pub fn new(sensor: S) -> Self {
        Self {
            sensor,
            filter: MovingAverage::new(),
        }
    }

    /// Read the sensor once. Faulty readings leave the filter untouched.
    pub async fn sample(&mut self) -> Result<SensorSample, SensorFault> {
        let raw = self.sensor.read_celsius().await.and_then(validate);
        match raw {
            Ok(raw) => {
                let temperature = self.filter.push(raw);
                debug!("Raw {} filtered {}", raw, temperature);
                Ok(SensorSample { temperature, raw })
            }
            Err(fault) => {
                warn!("Temperature sensor fault: {}", fault);
                Err(fault)
            }
        }
    }

    pub fn filter(&self) -> &MovingAverage {
        &self.filter
    }
}
