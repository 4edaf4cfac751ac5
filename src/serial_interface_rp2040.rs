use embassy_rp::bind_interrupts;
use embassy_rp::peripherals::USB;
use embassy_rp::rom_data::reset_to_usb_boot;

use embassy_rp::usb::{Driver, InterruptHandler};
use embassy_usb_logger::ReceiverHandler;

use crate::command::Command;
use crate::resources::USBResources;
use crate::{submit_command, CURRENT_STATUS, STATUS_REPORT_MILLIS};
use core::str;
use embassy_executor::Spawner;
use embassy_time::Timer;

// USB interrupt binding
bind_interrupts!(struct Irqs {
    USBCTRL_IRQ => InterruptHandler<USB>;
});

struct Handler;

impl ReceiverHandler for Handler {
    async fn handle_data(&self, data: &[u8]) {
        if let Ok(data) = str::from_utf8(data) {
            let data = data.trim();

            // If you are using elf2uf2-term with the '-t' flag, then when closing the serial monitor,
            // this will automatically put the pico into boot mode
            if data == "q" || data == "elf2uf2-term" {
                reset_to_usb_boot(0, 0); // Restart the chip
            } else {
                match Command::parse(data) {
                    Ok(command) => {
                        defmt::info!("Received command: {}", data);
                        submit_command(command);
                    }
                    Err(e) => defmt::warn!("Rejected command {}: {}", data, e),
                }
            }
        }
    }

    fn new() -> Self {
        Self
    }
}

#[embassy_executor::task]
async fn logger_task(driver: Driver<'static, USB>) {
    embassy_usb_logger::run!(1024, log::LevelFilter::Info, driver, Handler);
}

#[embassy_executor::task]
pub async fn usb_task(spawner: Spawner, r: USBResources) {
    let driver = Driver::new(r.usb, Irqs);
    match logger_task(driver) {
        Ok(token) => spawner.spawn(token),
        Err(_) => {
            defmt::error!("Failed to spawn USB logger");
            return;
        }
    }

    let Some(mut receiver) = CURRENT_STATUS.receiver() else {
        defmt::error!("No status receiver available");
        return;
    };

    loop {
        let status = receiver.get().await;
        match status.to_json() {
            Ok(json) => log::info!("{}", json),
            Err(_) => defmt::warn!("Status does not fit the JSON buffer"),
        }
        Timer::after_millis(STATUS_REPORT_MILLIS.into()).await;
    }
}
