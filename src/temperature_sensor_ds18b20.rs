use crate::log::*;
use crate::temperature_reader::{SensorFault, TemperatureSensor};
use embassy_rp::peripherals::PIO0;
use embassy_rp::pio::{self, Common, StateMachine};
use embassy_rp::pio_programs::onewire::{PioOneWire, PioOneWireProgram};
use embassy_rp::Peri;
use embassy_time::{Duration, Timer};

pub type Sensor = Ds18b20<'static, PIO0, 0>;

const SKIP_ROM: u8 = 0xCC;
const CONVERT_T: u8 = 0x44;
const READ_SCRATCHPAD: u8 = 0xBE;
const WRITE_SCRATCHPAD: u8 = 0x4E;

/// Resolution settings for temperature readings
#[derive(Copy, Clone)]
pub enum Resolution {
    Bits9 = 0x1F,  // 0.5°C resolution, 93.75ms conversion time
    Bits10 = 0x3F, // 0.25°C resolution, 187.5ms conversion time
    Bits11 = 0x5F, // 0.125°C resolution, 375ms conversion time
    Bits12 = 0x7F, // 0.0625°C resolution, 750ms conversion time
}

impl Resolution {
    fn conversion_time(self) -> Duration {
        match self {
            Resolution::Bits9 => Duration::from_millis(94),
            Resolution::Bits10 => Duration::from_millis(188),
            Resolution::Bits11 => Duration::from_millis(375),
            Resolution::Bits12 => Duration::from_millis(750),
        }
    }
}

/// Single DS18B20 on a PIO one-wire bus.
///
/// Conversions are pipelined: each read collects the previous conversion and
/// starts the next one, so a tick never waits for the full conversion time.
pub struct Ds18b20<'d, PIO: pio::Instance, const SM: usize> {
    wire: PioOneWire<'d, PIO, SM>,
    resolution: Resolution,
    converting: bool,
}

impl<'d, PIO: pio::Instance, const SM: usize> Ds18b20<'d, PIO, SM> {
    pub fn new(
        common: &mut Common<'d, PIO>,
        sm: StateMachine<'d, PIO, SM>,
        pin: Peri<'d, impl pio::PioPin>,
    ) -> Self {
        let program = PioOneWireProgram::new(common);
        Self {
            wire: PioOneWire::new(common, sm, pin, &program),
            resolution: Resolution::Bits11,
            converting: false,
        }
    }

    /// Set the resolution for all devices (broadcast)
    pub async fn set_resolution(&mut self, resolution: Resolution) -> Result<(), SensorFault> {
        self.select().await?;
        self.wire
            .write_bytes(&[WRITE_SCRATCHPAD, 0x00, 0x00, resolution as u8])
            .await;
        self.resolution = resolution;
        Ok(())
    }

    async fn select(&mut self) -> Result<(), SensorFault> {
        if !self.wire.reset().await {
            return Err(SensorFault::Disconnected);
        }
        self.wire.write_bytes(&[SKIP_ROM]).await;
        Ok(())
    }

    async fn start_conversion(&mut self) -> Result<(), SensorFault> {
        self.select().await?;
        self.wire.write_bytes(&[CONVERT_T]).await;
        self.converting = true;
        Ok(())
    }

    async fn read_scratchpad(&mut self) -> Result<f32, SensorFault> {
        self.select().await?;
        self.wire.write_bytes(&[READ_SCRATCHPAD]).await;
        let mut data = [0; 9];
        self.wire.read_bytes(&mut data).await;
        if crc8(&data) != 0 {
            return Err(SensorFault::Bus);
        }
        Ok(decode_celsius(data[0], data[1]))
    }
}

impl<'d, PIO: pio::Instance, const SM: usize> TemperatureSensor for Ds18b20<'d, PIO, SM> {
    async fn read_celsius(&mut self) -> Result<f32, SensorFault> {
        if !self.converting {
            self.start_conversion().await?;
            Timer::after(self.resolution.conversion_time()).await;
        }
        self.converting = false;
        let reading = self.read_scratchpad().await;
        if let Err(e) = self.start_conversion().await {
            debug!("Could not start next conversion: {}", e);
        }
        reading
    }
}

/// Scratchpad bytes 0..2 hold a signed 12.4 fixed-point value.
fn decode_celsius(lsb: u8, msb: u8) -> f32 {
    i16::from_le_bytes([lsb, msb]) as f32 / 16.0
}

/// Dallas/Maxim CRC8; a valid scratchpad including its CRC byte sums to 0.
fn crc8(data: &[u8]) -> u8 {
    let mut crc = 0u8;
    for &byte in data {
        let mut b = byte;
        for _ in 0..8 {
            let mix = (crc ^ b) & 0x01;
            crc >>= 1;
            if mix != 0 {
                crc ^= 0x8C;
            }
            b >>= 1;
        }
    }
    crc
}
