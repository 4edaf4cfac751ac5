use embassy_time::{Duration, Instant};
use heapless::String;
use serde::{Deserialize, Serialize};

use crate::command::Command;
use crate::config::{ControllerConfig, Gains};
use crate::log::*;
use crate::pid::PidController;

pub const STATUS_JSON_LEN: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    Idle,
    InitialCooldown,
    PidActive,
    Stable,
    LimitReached,
}

impl Mode {
    pub fn label(&self) -> &'static str {
        match self {
            Mode::Idle => "Idle",
            Mode::InitialCooldown => "Initial cooldown",
            Mode::PidActive => "PID control",
            Mode::Stable => "Stable",
            Mode::LimitReached => "Limit reached",
        }
    }
}

/// Read-only view of the controller for the reporting side.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub temperature: Option<f32>,
    pub setpoint: f32,
    pub error: Option<f32>,
    pub pwm_output: u8,
    pub enabled: bool,
    pub mode: Mode,
    pub limit_reached: bool,
    pub sensor_fault: bool,
}

impl StatusSnapshot {
    pub fn to_json(&self) -> Result<String<STATUS_JSON_LEN>, serde_json_core::ser::Error> {
        serde_json_core::to_string(self)
    }
}

pub struct PeltierController {
    config: ControllerConfig,
    pid: PidController,
    mode: Mode,
    enabled: bool,
    temperature: Option<f32>,
    output: u8,
    last_sample_time: Option<Instant>,
    saturated_since: Option<Instant>,
    // Cooldown entry is decided on the first tick when no temperature was
    // known at enable/setpoint time.
    entry_pending: bool,
    sensor_fault: bool,
}

impl PeltierController {
    /// Create an enabled controller.
    pub fn new(config: ControllerConfig) -> Self {
        let pid = PidController::from_config(&config);
        let mut controller = Self {
            config,
            pid,
            mode: Mode::Idle,
            enabled: false,
            temperature: None,
            output: 0,
            last_sample_time: None,
            saturated_since: None,
            entry_pending: false,
            sensor_fault: false,
        };
        controller.enable();
        controller
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn output(&self) -> u8 {
        self.output
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn integral(&self) -> f32 {
        self.pid.integral()
    }

    pub fn temperature(&self) -> Option<f32> {
        self.temperature
    }

    pub fn limit_reached(&self) -> bool {
        self.mode == Mode::LimitReached
    }

    pub fn error(&self) -> Option<f32> {
        self.temperature.map(|t| t - self.config.setpoint)
    }

    /// Whether a tick at `now` would compute a new output.
    pub fn is_due(&self, now: Instant) -> bool {
        match self.last_sample_time {
            None => true,
            Some(last) => now
                .checked_duration_since(last)
                .is_some_and(|elapsed| elapsed >= self.config.sample_period),
        }
    }

    /// Advance the controller with a filtered temperature and return the duty
    /// to write. Calls arriving before the sample period has elapsed return the
    /// previous duty untouched.
    pub fn tick(&mut self, now: Instant, temperature: f32) -> u8 {
        self.sensor_fault = false;
        if !self.enabled {
            self.temperature = Some(temperature);
            self.output = 0;
            return 0;
        }
        if !self.is_due(now) {
            return self.output;
        }
        self.temperature = Some(temperature);

        let error = temperature - self.config.setpoint;
        if self.entry_pending {
            self.entry_pending = false;
            if error > self.config.cooldown_threshold {
                self.enter_cooldown();
            }
        }

        let previous = self.mode;
        let output = if error <= 0.0 {
            self.pid.reset_integral();
            self.saturated_since = None;
            self.mode = Mode::Idle;
            0.0
        } else if self.mode == Mode::InitialCooldown && error > self.config.cooldown_threshold {
            self.saturated_since = None;
            f32::from(self.config.pwm_max)
        } else {
            if self.mode == Mode::InitialCooldown {
                // Bumpless hand-over to closed loop
                self.pid.reset_integral();
                self.mode = Mode::PidActive;
            }
            self.closed_loop(now, error)
        };

        self.pid.track_error(error);
        self.last_sample_time = Some(now);
        // Clamped f32 truncated to the 8-bit duty
        self.output = output as u8;

        if self.mode != previous {
            info!(
                "Mode {} -> {} (error {})",
                previous.label(),
                self.mode.label(),
                error
            );
            if self.mode == Mode::LimitReached {
                warn!(
                    "Output saturated for more than {} s, setpoint may be unreachable",
                    self.config.saturation_timeout.as_secs()
                );
            }
        }

        self.output
    }

    fn closed_loop(&mut self, now: Instant, error: f32) -> f32 {
        let dt = self
            .last_sample_time
            .and_then(|last| now.checked_duration_since(last))
            .map(secs)
            .filter(|dt| *dt > 0.0)
            .unwrap_or_else(|| self.config.sample_period_secs());

        let output = self.pid.update(error, dt);

        if self.mode != Mode::LimitReached {
            self.mode = if error.abs() <= self.config.deadband {
                Mode::Stable
            } else {
                Mode::PidActive
            };
        }

        if output >= f32::from(self.config.pwm_max) - 1.0 {
            let since = *self.saturated_since.get_or_insert(now);
            let saturated_for = now
                .checked_duration_since(since)
                .unwrap_or(Duration::from_ticks(0));
            if saturated_for > self.config.saturation_timeout {
                self.mode = Mode::LimitReached;
            }
        } else {
            self.saturated_since = None;
        }

        output
    }

    /// Hold the actuator off after a failed read. The controller clock is not
    /// advanced.
    pub fn on_sensor_fault(&mut self) -> u8 {
        self.sensor_fault = true;
        self.output = 0;
        0
    }

    pub fn apply(&mut self, command: Command) {
        match command {
            Command::SetSetpoint(setpoint) => self.set_setpoint(setpoint),
            Command::SetGains(gains) => self.set_gains(gains),
            Command::Enable => self.enable(),
            Command::Disable => self.disable(),
            Command::Toggle => {
                if self.enabled {
                    self.disable()
                } else {
                    self.enable()
                }
            }
            Command::ResetLimit => self.reset_limit(),
        }
    }

    pub fn set_setpoint(&mut self, setpoint: f32) {
        let old = self.config.setpoint;
        info!("New setpoint: {} (was {})", setpoint, old);
        if !self.enabled {
            // enable() resets and decides on cooldown
            self.config.setpoint = setpoint;
            return;
        }
        match self.temperature {
            Some(t) => {
                let was_cooling = t - old > 0.0;
                let now_cooling = t - setpoint > 0.0;
                if was_cooling != now_cooling {
                    self.reset();
                }
                self.config.setpoint = setpoint;
                if t - setpoint > self.config.cooldown_threshold {
                    self.enter_cooldown();
                }
            }
            None => {
                self.config.setpoint = setpoint;
                self.entry_pending = true;
            }
        }
    }

    pub fn set_gains(&mut self, gains: Gains) {
        info!(
            "New PID parameters: Kp={}, Ki={}, Kd={}",
            gains.kp, gains.ki, gains.kd
        );
        self.config.gains = gains;
        self.pid.tune(gains);
    }

    pub fn enable(&mut self) {
        self.enabled = true;
        self.reset();
        match self.error() {
            Some(error) if error > self.config.cooldown_threshold => self.enter_cooldown(),
            Some(_) => {}
            None => self.entry_pending = true,
        }
        info!("Controller enabled, mode {}", self.mode.label());
    }

    pub fn disable(&mut self) {
        self.enabled = false;
        self.output = 0;
        self.mode = Mode::Idle;
        self.saturated_since = None;
        self.entry_pending = false;
        info!("Controller disabled");
    }

    pub fn reset_limit(&mut self) {
        self.saturated_since = None;
        if self.mode == Mode::LimitReached {
            self.mode = match self.error() {
                Some(error) if error.abs() <= self.config.deadband => Mode::Stable,
                _ => Mode::PidActive,
            };
            info!("Limit flag cleared, mode {}", self.mode.label());
        }
    }

    fn reset(&mut self) {
        self.pid.reset();
        self.mode = Mode::Idle;
        self.output = 0;
        self.last_sample_time = None;
        self.saturated_since = None;
        self.entry_pending = false;
    }

    fn enter_cooldown(&mut self) {
        self.mode = Mode::InitialCooldown;
        self.saturated_since = None;
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            temperature: self.temperature,
            setpoint: self.config.setpoint,
            error: self.error(),
            pwm_output: self.output,
            enabled: self.enabled,
            mode: self.mode,
            limit_reached: self.limit_reached(),
            sensor_fault: self.sensor_fault,
        }
    }
}

fn secs(duration: Duration) -> f32 {
    duration.as_micros() as f32 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ms: u64) -> Instant {
        Instant::from_millis(ms)
    }

    fn config() -> ControllerConfig {
        ControllerConfig::default()
            .with_setpoint(4.0)
            .with_deadband(0.2)
            .with_cooldown_threshold(2.0)
    }

    #[test]
    fn below_setpoint_is_idle_with_zero_output() {
        let mut c = PeltierController::new(config());
        assert_eq!(c.tick(at(0), 3.0), 0);
        assert_eq!(c.mode(), Mode::Idle);
        assert_eq!(c.integral(), 0.0);
    }

    #[test]
    fn at_setpoint_is_idle() {
        let mut c = PeltierController::new(config());
        assert_eq!(c.tick(at(0), 4.0), 0);
        assert_eq!(c.mode(), Mode::Idle);
    }

    #[test]
    fn large_error_starts_with_full_power() {
        let mut c = PeltierController::new(config());
        assert_eq!(c.tick(at(0), 10.0), 255);
        assert_eq!(c.mode(), Mode::InitialCooldown);
        assert_eq!(c.tick(at(500), 8.0), 255);
        assert_eq!(c.mode(), Mode::InitialCooldown);
    }

    #[test]
    fn small_error_skips_cooldown() {
        let mut c = PeltierController::new(config().with_gains(Gains::new(10.0, 0.0, 0.0)));
        assert_eq!(c.tick(at(0), 5.0), 10);
        assert_eq!(c.mode(), Mode::PidActive);
    }

    #[test]
    fn within_deadband_is_stable_and_keeps_pid_output() {
        let mut c = PeltierController::new(config().with_gains(Gains::new(100.0, 0.0, 0.0)));
        assert_eq!(c.tick(at(0), 4.125), 12);
        assert_eq!(c.mode(), Mode::Stable);
    }

    #[test]
    fn early_tick_returns_previous_output() {
        let mut c = PeltierController::new(config().with_gains(Gains::new(10.0, 0.0, 0.0)));
        let first = c.tick(at(0), 5.0);
        assert_eq!(c.tick(at(499), 5.9), first);
        assert_ne!(c.tick(at(500), 5.9), first);
    }

    #[test]
    fn disabled_controller_outputs_zero() {
        let mut c = PeltierController::new(config());
        c.tick(at(0), 10.0);
        c.apply(Command::Disable);
        assert_eq!(c.output(), 0);
        assert_eq!(c.tick(at(500), 10.0), 0);
        assert_eq!(c.mode(), Mode::Idle);
        assert!(!c.enabled());
    }

    #[test]
    fn enable_with_large_error_enters_cooldown() {
        let mut c = PeltierController::new(config());
        c.tick(at(0), 5.0);
        c.apply(Command::Disable);
        c.tick(at(500), 9.0);
        c.apply(Command::Enable);
        assert_eq!(c.mode(), Mode::InitialCooldown);
        assert_eq!(c.tick(at(600), 9.0), 255);
    }

    #[test]
    fn toggle_flips_enabled() {
        let mut c = PeltierController::new(config());
        c.apply(Command::Toggle);
        assert!(!c.enabled());
        c.apply(Command::Toggle);
        assert!(c.enabled());
    }

    #[test]
    fn gains_change_clears_integral() {
        let mut c = PeltierController::new(config().with_gains(Gains::new(1.0, 1.0, 0.0)));
        c.tick(at(0), 5.0);
        c.tick(at(500), 5.0);
        assert!(c.integral() > 0.0);
        c.apply(Command::SetGains(Gains::new(2.0, 0.1, 1.0)));
        assert_eq!(c.integral(), 0.0);
        assert_eq!(c.config().gains, Gains::new(2.0, 0.1, 1.0));
    }

    #[test]
    fn setpoint_change_without_sign_flip_keeps_integral() {
        let mut c = PeltierController::new(config().with_gains(Gains::new(1.0, 1.0, 0.0)));
        c.tick(at(0), 5.0);
        let integral = c.integral();
        assert!(integral > 0.0);
        c.apply(Command::SetSetpoint(4.5));
        assert_eq!(c.integral(), integral);
        assert_eq!(c.mode(), Mode::PidActive);
    }

    #[test]
    fn setpoint_change_with_sign_flip_resets() {
        let mut c = PeltierController::new(config().with_gains(Gains::new(1.0, 1.0, 0.0)));
        c.tick(at(0), 5.0);
        c.apply(Command::SetSetpoint(6.0));
        assert_eq!(c.integral(), 0.0);
        assert_eq!(c.mode(), Mode::Idle);
        assert_eq!(c.output(), 0);
    }

    #[test]
    fn setpoint_far_below_temperature_enters_cooldown() {
        let mut c = PeltierController::new(config());
        c.tick(at(0), 5.0);
        c.apply(Command::SetSetpoint(1.0));
        assert_eq!(c.mode(), Mode::InitialCooldown);
    }

    #[test]
    fn reset_limit_keeps_integral_and_setpoint() {
        let mut c = PeltierController::new(
            config()
                .with_cooldown_threshold(100.0)
                .with_saturation_timeout(Duration::from_millis(1000))
                .with_gains(Gains::new(100.0, 0.1, 0.0)),
        );
        for i in 0..4 {
            c.tick(at(i * 500), 10.0);
        }
        assert_eq!(c.mode(), Mode::LimitReached);
        let integral = c.integral();
        c.apply(Command::ResetLimit);
        assert_eq!(c.mode(), Mode::PidActive);
        assert_eq!(c.integral(), integral);
        assert_eq!(c.config().setpoint, 4.0);
    }

    #[test]
    fn sensor_fault_does_not_advance_clock() {
        let mut c = PeltierController::new(config().with_gains(Gains::new(10.0, 0.0, 0.0)));
        c.tick(at(0), 5.0);
        assert_eq!(c.on_sensor_fault(), 0);
        assert!(c.snapshot().sensor_fault);
        // Still gated by the tick at t=0
        assert_eq!(c.tick(at(200), 5.0), 0);
        assert_eq!(c.tick(at(500), 5.0), 10);
        assert!(!c.snapshot().sensor_fault);
    }

    #[test]
    fn snapshot_reports_state() {
        let mut c = PeltierController::new(config());
        c.tick(at(0), 10.0);
        let snapshot = c.snapshot();
        assert_eq!(snapshot.temperature, Some(10.0));
        assert_eq!(snapshot.error, Some(6.0));
        assert_eq!(snapshot.pwm_output, 255);
        assert_eq!(snapshot.mode, Mode::InitialCooldown);
        assert!(snapshot.enabled);
        assert!(!snapshot.limit_reached);
    }

    #[test]
    fn snapshot_serializes_to_json() {
        let mut c = PeltierController::new(config());
        c.tick(at(0), 3.0);
        let json = c.snapshot().to_json().unwrap();
        assert!(json.starts_with("{\"temperature\":3"));
        assert!(json.contains("\"pwm_output\":0"));
        assert!(json.contains("\"mode\":\"Idle\""));
        assert!(json.contains("\"enabled\":true"));
    }

    #[test]
    fn unknown_temperature_serializes_as_null() {
        let c = PeltierController::new(config());
        let json = c.snapshot().to_json().unwrap();
        assert!(json.contains("\"temperature\":null"));
    }
}
