#![no_std]
#![no_main]

use defmt::*;
use embassy_executor::Spawner;
use embassy_rp::bind_interrupts;
use embassy_rp::peripherals::PIO0;
use embassy_rp::pio::{Common, InterruptHandler, Pio};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use peltier_controller::control_loop::controller_task;
use peltier_controller::peltier::PwmPeltier;
use peltier_controller::serial_interface::usb_task;
use peltier_controller::temperature_sensor::{Ds18b20, Resolution};
use peltier_controller::{
    split_resources, AssignedResources, ControllerConfig, PeltierResources, SensorResources,
    USBResources, VERSION,
};

bind_interrupts!(struct Irqs {
    PIO0_IRQ_0 => InterruptHandler<PIO0>;
});

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Peltier controller {}", VERSION);
    let p = embassy_rp::init(Default::default());
    let r = split_resources!(p);

    let Pio { common, sm0, .. } = Pio::new(r.sensor.pio, Irqs);
    static PIO_COMMON: StaticCell<Common<'static, PIO0>> = StaticCell::new();
    let common = PIO_COMMON.init(common);
    let mut sensor = Ds18b20::new(common, sm0, r.sensor.data);
    if let Err(e) = sensor.set_resolution(Resolution::Bits11).await {
        warn!("Could not configure DS18B20: {}", e);
    }

    let peltier = PwmPeltier::new(r.peltier);

    spawner.spawn(unwrap!(usb_task(spawner, r.usb)));
    spawner.spawn(unwrap!(controller_task(
        sensor,
        peltier,
        ControllerConfig::default()
    )));
}
