//! PID term computation for the Peltier duty cycle.
//!
//! - Uses `f32` math
//! - Caller supplies the error (`temperature - setpoint`) and `dt` seconds
//! - Output clamped to the configured PWM bounds
//! - Integral clamped to `±integral_max`
//! - Anti-windup by conditional integration: the accumulator is held while
//!   the tentative output is already saturated in the direction of the error
//!
//! Example
//! ```ignore
//! let mut pid = PidController::new(Gains::new(100.0, 0.5, 50.0))
//!     .with_output_limits(0.0, 255.0)
//!     .with_integral_max(100.0);
//!
//! let duty = pid.update(temperature - setpoint, 0.5); // dt seconds
//! ```

use crate::config::{ControllerConfig, Gains};

#[derive(Debug, Clone)]
pub struct PidController {
    gains: Gains,

    // Output limits
    out_min: f32,
    out_max: f32,

    integral_max: f32,

    // State
    integral: f32,
    last_error: f32,
    last_output: f32,
}

impl PidController {
    /// Create a new PID controller with given gains.
    /// Defaults: output limits [0,255], integral clamp 100.
    pub fn new(gains: Gains) -> Self {
        Self {
            gains,
            out_min: 0.0,
            out_max: 255.0,
            integral_max: 100.0,
            integral: 0.0,
            last_error: 0.0,
            last_output: 0.0,
        }
    }

    pub fn from_config(config: &ControllerConfig) -> Self {
        Self::new(config.gains)
            .with_output_limits(config.pwm_min.into(), config.pwm_max.into())
            .with_integral_max(config.integral_max)
    }

    /// Builder: set output limits.
    pub fn with_output_limits(mut self, min: f32, max: f32) -> Self {
        self.set_output_limits(min, max);
        self
    }

    /// Builder: set the integral clamp.
    pub fn with_integral_max(mut self, integral_max: f32) -> Self {
        self.integral_max = integral_max.abs();
        self.integral = clamp(self.integral, -self.integral_max, self.integral_max);
        self
    }

    /// Tune gains. The accumulated error belongs to the old gains and is dropped.
    pub fn tune(&mut self, gains: Gains) {
        self.gains = gains;
        self.reset_integral();
    }

    /// Set output limits and clamp current state accordingly.
    pub fn set_output_limits(&mut self, min: f32, max: f32) {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        self.out_min = min;
        self.out_max = max;
        self.last_output = clamp(self.last_output, self.out_min, self.out_max);
    }

    pub fn reset_integral(&mut self) {
        self.integral = 0.0;
    }

    /// Reset internal state (integral, last error, last output).
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.last_error = 0.0;
        self.last_output = clamp(0.0, self.out_min, self.out_max);
    }

    /// Record the error of a tick that did not go through `update`, so the
    /// next derivative is taken against it.
    pub fn track_error(&mut self, error: f32) {
        self.last_error = error;
    }

    /// Run one PID compute step.
    /// - `error`: `temperature - setpoint`, positive when cooling is needed.
    /// - `dt_s`: time since last update in seconds (must be > 0).
    /// Returns the clamped control output.
    pub fn update(&mut self, error: f32, dt_s: f32) -> f32 {
        if dt_s <= 0.0 || !dt_s.is_finite() {
            return self.last_output;
        }

        let p = self.gains.kp * error;
        let d = self.gains.kd * (error - self.last_error) / dt_s;

        let tentative = p + self.gains.ki * self.integral + d;
        let winding_up = (tentative >= self.out_max && error > 0.0)
            || (tentative <= self.out_min && error < 0.0);
        if !winding_up {
            self.integral = clamp(
                self.integral + error * dt_s,
                -self.integral_max,
                self.integral_max,
            );
        }

        let output = clamp(
            p + self.gains.ki * self.integral + d,
            self.out_min,
            self.out_max,
        );

        self.last_output = output;
        self.last_error = error;

        output
    }

    /// Return the last computed output.
    pub fn output(&self) -> f32 {
        self.last_output
    }

    pub fn integral(&self) -> f32 {
        self.integral
    }

    pub fn last_error(&self) -> f32 {
        self.last_error
    }

    pub fn gains(&self) -> Gains {
        self.gains
    }
}

#[inline]
fn clamp(x: f32, min: f32, max: f32) -> f32 {
    if x < min {
        min
    } else if x > max {
        max
    } else {
        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p_only() -> PidController {
        PidController::new(Gains::new(10.0, 0.0, 0.0)).with_output_limits(0.0, 255.0)
    }

    #[test]
    fn proportional_term_scales_error() {
        let mut pid = p_only();
        assert_eq!(pid.update(2.0, 0.5), 20.0);
        assert_eq!(pid.update(-1.0, 0.5), 0.0);
    }

    #[test]
    fn output_is_clamped() {
        let mut pid = p_only();
        assert_eq!(pid.update(100.0, 0.5), 255.0);
    }

    #[test]
    fn integral_accumulates_error_times_dt() {
        let mut pid = PidController::new(Gains::new(0.0, 1.0, 0.0));
        pid.update(2.0, 0.5);
        pid.update(2.0, 0.5);
        assert!((pid.integral() - 2.0).abs() < 1e-6);
        assert!((pid.output() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn integral_is_clamped() {
        let mut pid = PidController::new(Gains::new(0.0, 0.01, 0.0)).with_integral_max(5.0);
        for _ in 0..100 {
            pid.update(10.0, 1.0);
        }
        assert_eq!(pid.integral(), 5.0);
    }

    #[test]
    fn integral_is_held_while_saturated() {
        let mut pid = PidController::new(Gains::new(100.0, 1.0, 0.0));
        // 100 * 3.0 = 300 already exceeds 255
        pid.update(3.0, 0.5);
        pid.update(3.0, 0.5);
        assert_eq!(pid.integral(), 0.0);
        assert_eq!(pid.output(), 255.0);
    }

    #[test]
    fn derivative_uses_previous_error() {
        let mut pid = PidController::new(Gains::new(0.0, 0.0, 1.0));
        pid.track_error(1.0);
        assert!((pid.update(2.0, 0.5) - 2.0).abs() < 1e-6);
        assert_eq!(pid.last_error(), 2.0);
        // Falling error drives the derivative negative, clamped at zero
        assert_eq!(pid.update(1.0, 0.5), 0.0);
    }

    #[test]
    fn tune_drops_integral() {
        let mut pid = PidController::new(Gains::new(0.0, 1.0, 0.0));
        pid.update(2.0, 1.0);
        pid.tune(Gains::new(1.0, 2.0, 3.0));
        assert_eq!(pid.integral(), 0.0);
        assert_eq!(pid.gains(), Gains::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn reset_clears_error_history() {
        let mut pid = PidController::new(Gains::new(1.0, 1.0, 1.0));
        pid.update(3.0, 0.5);
        pid.reset();
        assert_eq!(pid.last_error(), 0.0);
        assert_eq!(pid.integral(), 0.0);
        assert_eq!(pid.output(), 0.0);
    }

    #[test]
    fn invalid_dt_returns_previous_output() {
        let mut pid = p_only();
        let out = pid.update(3.0, 0.5);
        assert_eq!(pid.update(10.0, 0.0), out);
        assert_eq!(pid.update(10.0, f32::NAN), out);
    }
}
