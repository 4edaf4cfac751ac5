#![cfg_attr(not(test), no_std)]

#[cfg(all(feature = "std", not(test)))]
extern crate std;

#[cfg(feature = "rp2040")]
pub use defmt as log;

#[cfg(not(feature = "rp2040"))]
pub use log;

pub mod command;
pub mod config;
pub mod control_loop;
pub mod peltier_controller;
pub mod pid;
pub mod temperature_reader;

#[cfg(feature = "rp2040")]
pub mod resources_rp2040;
#[cfg(feature = "rp2040")]
pub use resources_rp2040 as resources;
#[cfg(feature = "rp2040")]
pub use resources_rp2040::*;

#[cfg(feature = "rp2040")]
pub mod peltier_rp2040;
#[cfg(feature = "rp2040")]
pub use peltier_rp2040 as peltier;

#[cfg(feature = "std")]
pub mod peltier_std;
#[cfg(feature = "std")]
pub use peltier_std as peltier;

#[cfg(feature = "rp2040")]
pub mod temperature_sensor_ds18b20;
#[cfg(feature = "rp2040")]
pub use temperature_sensor_ds18b20 as temperature_sensor;

#[cfg(feature = "std")]
pub mod temperature_sensor_mock;
#[cfg(feature = "std")]
pub use temperature_sensor_mock as temperature_sensor;

#[cfg(feature = "rp2040")]
pub mod serial_interface_rp2040;
#[cfg(feature = "rp2040")]
pub use serial_interface_rp2040 as serial_interface;

#[cfg(feature = "std")]
pub mod serial_interface_std;
#[cfg(feature = "std")]
pub use serial_interface_std as serial_interface;

pub static VERSION: &str = "v0.1";
pub static SYSTEM_TICK_MILLIS: u32 = 100;
pub static STATUS_REPORT_MILLIS: u32 = 2000;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::watch::Watch;

pub use command::Command;
pub use config::{ControllerConfig, Gains};
pub use peltier_controller::{Mode, PeltierController, StatusSnapshot};

/// Configuration commands, drained by the control loop at tick boundaries.
pub static COMMAND_CHANNEL: Channel<CriticalSectionRawMutex, Command, 4> = Channel::new();
/// Latest controller status, published after every tick.
pub static CURRENT_STATUS: Watch<CriticalSectionRawMutex, StatusSnapshot, 3> = Watch::new();

/// Queue a command for the next tick. A full queue drops the command.
pub fn submit_command(command: Command) -> bool {
    match COMMAND_CHANNEL.try_send(command) {
        Ok(()) => true,
        Err(_) => {
            crate::log::warn!("Command queue full, dropping command");
            false
        }
    }
}
