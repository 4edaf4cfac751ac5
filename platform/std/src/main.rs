use clap::Parser;
use embassy_executor::Spawner;
use embassy_time::Duration;
use log::*;
use peltier_controller::control_loop::controller_task;
use peltier_controller::peltier::SimulatedPeltier;
use peltier_controller::serial_interface::{spawn_command_reader, status_task};
use peltier_controller::temperature_sensor::MockTemperatureSensor;
use peltier_controller::{ControllerConfig, Gains, VERSION};

/// Peltier controller against a simulated chamber. Commands are read from
/// stdin as JSON lines, status is printed to stdout.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Target temperature in °C
    #[arg(long, default_value_t = 4.0)]
    setpoint: f32,
    #[arg(long, default_value_t = 100.0)]
    kp: f32,
    #[arg(long, default_value_t = 0.5)]
    ki: f32,
    #[arg(long, default_value_t = 50.0)]
    kd: f32,
    #[arg(long, default_value_t = 0.2)]
    deadband: f32,
    /// Error above which the Peltier runs open-loop at full power
    #[arg(long, default_value_t = 1.0)]
    cooldown_threshold: f32,
    #[arg(long, default_value_t = 500)]
    sample_millis: u64,
    /// Ambient temperature of the simulated chamber
    #[arg(long, default_value_t = 25.0)]
    ambient: f32,
    /// Simulate a disconnected probe on every Nth read (0 = never)
    #[arg(long, default_value_t = 0)]
    fault_every: u32,
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .format_timestamp_nanos()
        .init();

    let args = Args::parse();
    info!("Peltier controller {} (simulation)", VERSION);

    let config = ControllerConfig::default()
        .with_setpoint(args.setpoint)
        .with_deadband(args.deadband)
        .with_cooldown_threshold(args.cooldown_threshold)
        .with_sample_period(Duration::from_millis(args.sample_millis))
        .with_gains(Gains::new(args.kp, args.ki, args.kd));
    let sensor = MockTemperatureSensor::new(args.ambient).with_fault_every(args.fault_every);

    if let Err(e) = spawn_command_reader() {
        error!("Failed to start command reader: {}", e);
    }

    spawner.spawn(status_task().unwrap());
    spawner.spawn(controller_task(sensor, SimulatedPeltier, config).unwrap());
}
