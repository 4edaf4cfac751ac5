use assign_resources::assign_resources;
use embassy_rp::peripherals;
use embassy_rp::Peri;

assign_resources! {
    sensor: SensorResources {
        pio: PIO0,
        data: PIN_4,
    },
    peltier: PeltierResources {
        slice: PWM_SLICE2,
        gate: PIN_5,
    },
    usb: USBResources {
        usb: USB,
    },
}
