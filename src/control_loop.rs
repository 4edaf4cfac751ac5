use embassy_time::{Instant, Timer};

use crate::command::Command;
use crate::config::ControllerConfig;
use crate::log::*;
use crate::peltier_controller::PeltierController;
use crate::temperature_reader::{TemperatureReader, TemperatureSensor};
use crate::{COMMAND_CHANNEL, CURRENT_STATUS};

/// PWM sink for the Peltier element.
pub trait PeltierDrive {
    fn set_duty(&mut self, duty: u8);
}

pub struct ControlLoop<S, D> {
    reader: TemperatureReader<S>,
    drive: D,
    controller: PeltierController,
}

impl<S, D> ControlLoop<S, D>
where
    S: TemperatureSensor,
    D: PeltierDrive,
{
    pub fn new(sensor: S, mut drive: D, config: ControllerConfig) -> Self {
        drive.set_duty(0);
        Self {
            reader: TemperatureReader::new(sensor),
            drive,
            controller: PeltierController::new(config),
        }
    }

    pub fn controller(&self) -> &PeltierController {
        &self.controller
    }

    pub fn reader(&self) -> &TemperatureReader<S> {
        &self.reader
    }

    pub fn drive(&self) -> &D {
        &self.drive
    }

    /// Apply a command between ticks.
    pub fn apply(&mut self, command: Command) {
        self.controller.apply(command);
        if !self.controller.enabled() {
            self.drive.set_duty(0);
        }
    }

    /// One control tick: read, compute, write. Returns the duty written.
    pub async fn step(&mut self, now: Instant) -> u8 {
        if self.controller.enabled() && !self.controller.is_due(now) {
            return self.controller.output();
        }

        let duty = match self.reader.sample().await {
            Ok(sample) => self.controller.tick(now, sample.temperature),
            Err(_) => self.controller.on_sensor_fault(),
        };
        self.drive.set_duty(duty);
        duty
    }

    pub async fn run(&mut self) -> ! {
        let period = self.controller.config().sample_period;
        let receiver = COMMAND_CHANNEL.receiver();
        let sender = CURRENT_STATUS.sender();
        let mut deadline = Instant::now();

        info!(
            "Starting control loop, setpoint {}",
            self.controller.config().setpoint
        );

        loop {
            while let Ok(command) = receiver.try_receive() {
                self.apply(command);
            }

            self.step(deadline).await;
            sender.send(self.controller.snapshot());

            deadline += period;
            let now = Instant::now();
            if deadline < now {
                // Overran a full period, resynchronise instead of bursting
                deadline = now;
            }
            Timer::at(deadline).await;
        }
    }
}

#[cfg(any(feature = "std", feature = "rp2040"))]
#[embassy_executor::task]
pub async fn controller_task(
    sensor: crate::temperature_sensor::Sensor,
    drive: crate::peltier::Drive,
    config: ControllerConfig,
) -> ! {
    let mut control = ControlLoop::new(sensor, drive, config);
    control.run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Gains;
    use crate::peltier_controller::Mode;
    use crate::temperature_reader::{SensorFault, DISCONNECTED_C};
    use embassy_futures::block_on;
    use std::collections::VecDeque;

    struct ScriptedSensor(VecDeque<f32>);

    impl TemperatureSensor for ScriptedSensor {
        async fn read_celsius(&mut self) -> Result<f32, SensorFault> {
            self.0.pop_front().ok_or(SensorFault::Bus)
        }
    }

    #[derive(Default)]
    struct RecordingDrive(Vec<u8>);

    impl PeltierDrive for RecordingDrive {
        fn set_duty(&mut self, duty: u8) {
            self.0.push(duty);
        }
    }

    fn control(
        readings: &[f32],
        config: ControllerConfig,
    ) -> ControlLoop<ScriptedSensor, RecordingDrive> {
        ControlLoop::new(
            ScriptedSensor(readings.iter().copied().collect()),
            RecordingDrive::default(),
            config,
        )
    }

    fn at(ms: u64) -> Instant {
        Instant::from_millis(ms)
    }

    #[test]
    fn writes_duty_every_tick() {
        let mut control = control(&[10.0, 10.0], ControllerConfig::default());
        assert_eq!(block_on(control.step(at(0))), 255);
        assert_eq!(block_on(control.step(at(500))), 255);
        assert_eq!(control.drive().0, [0, 255, 255]);
    }

    #[test]
    fn sensor_fault_forces_zero_without_touching_filter() {
        let mut control = control(
            &[4.5, DISCONNECTED_C, 4.5],
            ControllerConfig::default().with_gains(Gains::new(10.0, 0.0, 0.0)),
        );
        assert_eq!(block_on(control.step(at(0))), 5);
        assert_eq!(block_on(control.step(at(500))), 0);
        assert_eq!(control.reader().filter().readings(), &[4.5]);
        assert!(control.controller().snapshot().sensor_fault);
        assert_eq!(block_on(control.step(at(1000))), 5);
        assert_eq!(control.drive().0, [0, 5, 0, 5]);
    }

    #[test]
    fn early_step_does_not_read_sensor() {
        let mut control = control(&[6.0, 9.0], ControllerConfig::default());
        block_on(control.step(at(0)));
        block_on(control.step(at(100)));
        assert_eq!(control.reader().filter().readings(), &[6.0]);
    }

    #[test]
    fn disable_turns_drive_off_immediately() {
        let mut control = control(&[10.0], ControllerConfig::default());
        block_on(control.step(at(0)));
        control.apply(Command::Disable);
        assert_eq!(control.drive().0.last(), Some(&0));
        assert_eq!(control.controller().mode(), Mode::Idle);
    }
}
