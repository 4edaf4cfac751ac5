use crate::log::*;
use crate::peltier_std::SIMULATED_DUTY;
use crate::temperature_reader::{SensorFault, TemperatureSensor, DISCONNECTED_C};
use embassy_time::Instant;
use portable_atomic::Ordering;

pub type Sensor = MockTemperatureSensor;

/// Lumped thermal model of a small Peltier-cooled chamber.
#[derive(Debug, Clone)]
pub struct ThermalModel {
    pub temperature: f32,
    pub ambient: f32,
    /// °C/s pulled out of the chamber at full duty.
    pub max_cooling_rate: f32,
    /// Heat leak from ambient per degree of difference.
    pub leak_coefficient: f32,
    /// Factor affecting heat retention (0-1)
    pub thermal_mass: f32,
}

impl ThermalModel {
    pub fn new(ambient: f32) -> Self {
        Self {
            temperature: ambient,
            ambient,
            max_cooling_rate: 0.4,
            leak_coefficient: 0.01,
            thermal_mass: 0.8,
        }
    }

    /// Integrate the chamber temperature over `dt_s` seconds with the Peltier
    /// at `duty`/255.
    pub fn advance(&mut self, duty: u8, dt_s: f32) -> f32 {
        let power_fraction = duty as f32 / 255.0;
        let cooling = self.max_cooling_rate * power_fraction;

        // Newton's law of cooling, towards ambient
        let leak = self.leak_coefficient * (self.ambient - self.temperature);

        let net_rate = (leak - cooling) * self.thermal_mass;
        self.temperature += net_rate * dt_s;

        // The hot side has to dump heat somewhere; a cheap module bottoms out
        if self.temperature < self.ambient - 40.0 {
            self.temperature = self.ambient - 40.0;
        }
        self.temperature
    }
}

pub struct MockTemperatureSensor {
    model: ThermalModel,
    last_read: Option<Instant>,
    fault_every: Option<u32>,
    reads: u32,
}

impl MockTemperatureSensor {
    pub fn new(ambient: f32) -> Self {
        info!("Thermal simulation at ambient {} °C", ambient);
        Self {
            model: ThermalModel::new(ambient),
            last_read: None,
            fault_every: None,
            reads: 0,
        }
    }

    /// Report the disconnected sentinel on every `n`th read.
    pub fn with_fault_every(mut self, n: u32) -> Self {
        self.fault_every = (n > 0).then_some(n);
        self
    }
}

impl TemperatureSensor for MockTemperatureSensor {
    async fn read_celsius(&mut self) -> Result<f32, SensorFault> {
        let now = Instant::now();
        let dt_s = self
            .last_read
            .and_then(|last| now.checked_duration_since(last))
            .map(|elapsed| elapsed.as_millis() as f32 / 1000.0)
            .unwrap_or(0.0);
        self.last_read = Some(now);

        let temperature = self.model.advance(SIMULATED_DUTY.load(Ordering::Relaxed), dt_s);

        self.reads = self.reads.wrapping_add(1);
        if self.fault_every.is_some_and(|n| self.reads % n == 0) {
            return Ok(DISCONNECTED_C);
        }

        // Add small amount of realistic noise (±0.05°C)
        let noise = (now.as_millis() % 100) as f32 / 1000.0 - 0.05;
        Ok(temperature + noise)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_duty_cools_the_chamber() {
        let mut model = ThermalModel::new(25.0);
        for _ in 0..40 {
            model.advance(255, 0.5);
        }
        assert!(model.temperature < 22.0);
    }

    #[test]
    fn zero_duty_drifts_back_to_ambient() {
        let mut model = ThermalModel::new(25.0);
        model.temperature = 5.0;
        let start = model.temperature;
        model.advance(0, 10.0);
        assert!(model.temperature > start);
        assert!(model.temperature < 25.0);
    }

    #[test]
    fn idle_at_ambient_is_steady() {
        let mut model = ThermalModel::new(25.0);
        assert_eq!(model.advance(0, 1.0), 25.0);
    }
}
