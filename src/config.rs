//! Runtime tuning for the Peltier controller.
//!
//! Defaults match the bench setup: a 4 °C chamber, 8-bit PWM on the Peltier
//! MOSFET and a DS18B20 sampled twice per second.
//!
//! ```ignore
//! let config = ControllerConfig::default()
//!     .with_setpoint(6.0)
//!     .with_gains(Gains::new(80.0, 0.4, 40.0));
//! ```

use embassy_time::Duration;

use crate::SYSTEM_TICK_MILLIS;

pub const DEFAULT_SETPOINT_C: f32 = 4.0;
pub const DEFAULT_DEADBAND_C: f32 = 0.2;
pub const DEFAULT_COOLDOWN_THRESHOLD_C: f32 = 1.0;
pub const DEFAULT_INTEGRAL_MAX: f32 = 100.0;
pub const DEFAULT_SATURATION_TIMEOUT_SECS: u64 = 300;
pub const PWM_MIN: u8 = 0;
pub const PWM_MAX: u8 = 255;

/// Proportional, integral and derivative gains.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
}

impl Gains {
    pub const fn new(kp: f32, ki: f32, kd: f32) -> Self {
        Self { kp, ki, kd }
    }
}

impl Default for Gains {
    fn default() -> Self {
        Self::new(100.0, 0.5, 50.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    /// Target chamber temperature in °C.
    pub setpoint: f32,
    /// Window around the setpoint reported as stable.
    pub deadband: f32,
    /// Error above which the controller runs open-loop at full power.
    pub cooldown_threshold: f32,
    /// Minimum time between two computed ticks.
    pub sample_period: Duration,
    pub pwm_min: u8,
    pub pwm_max: u8,
    /// Symmetric bound on the integral accumulator.
    pub integral_max: f32,
    /// Continuous saturation longer than this raises the limit flag.
    pub saturation_timeout: Duration,
    pub gains: Gains,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            setpoint: DEFAULT_SETPOINT_C,
            deadband: DEFAULT_DEADBAND_C,
            cooldown_threshold: DEFAULT_COOLDOWN_THRESHOLD_C,
            sample_period: Duration::from_millis((SYSTEM_TICK_MILLIS * 5).into()),
            pwm_min: PWM_MIN,
            pwm_max: PWM_MAX,
            integral_max: DEFAULT_INTEGRAL_MAX,
            saturation_timeout: Duration::from_secs(DEFAULT_SATURATION_TIMEOUT_SECS),
            gains: Gains::default(),
        }
    }
}

impl ControllerConfig {
    pub fn with_setpoint(mut self, setpoint: f32) -> Self {
        self.setpoint = setpoint;
        self
    }

    pub fn with_deadband(mut self, deadband: f32) -> Self {
        self.deadband = deadband;
        self
    }

    pub fn with_cooldown_threshold(mut self, threshold: f32) -> Self {
        self.cooldown_threshold = threshold;
        self
    }

    pub fn with_sample_period(mut self, period: Duration) -> Self {
        self.sample_period = period;
        self
    }

    /// Builder: set PWM bounds. Swapped bounds are reordered.
    pub fn with_pwm_limits(mut self, min: u8, max: u8) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        self.pwm_min = min;
        self.pwm_max = max;
        self
    }

    pub fn with_integral_max(mut self, integral_max: f32) -> Self {
        self.integral_max = integral_max.abs();
        self
    }

    pub fn with_saturation_timeout(mut self, timeout: Duration) -> Self {
        self.saturation_timeout = timeout;
        self
    }

    pub fn with_gains(mut self, gains: Gains) -> Self {
        self.gains = gains;
        self
    }

    /// Sample period in seconds, used as `dt` for the first tick after a reset.
    pub fn sample_period_secs(&self) -> f32 {
        self.sample_period.as_micros() as f32 / 1_000_000.0
    }
}
