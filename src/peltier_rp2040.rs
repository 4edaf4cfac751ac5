use crate::control_loop::PeltierDrive;
use crate::log::*;
use crate::resources::PeltierResources;
use embassy_rp::pwm::{Config, Pwm};
use fixed_macro::fixed;

pub type Drive = PwmPeltier;

/// Peltier MOSFET gate on PWM channel B.
///
/// 8-bit duty: `top` is 254 so a compare of 255 keeps the output high for the
/// whole period. 125 MHz / 255 / 255 gives roughly 1.9 kHz.
pub struct PwmPeltier {
    pwm: Pwm<'static>,
    config: Config,
}

impl PwmPeltier {
    pub fn new(r: PeltierResources) -> Self {
        let mut config = Config::default();
        config.top = 254;
        config.divider = fixed!(255: U12F4);
        config.compare_b = 0;
        let pwm = Pwm::new_output_b(r.slice, r.gate, config.clone());
        info!("Peltier PWM ready");
        Self { pwm, config }
    }
}

impl PeltierDrive for PwmPeltier {
    fn set_duty(&mut self, duty: u8) {
        if self.config.compare_b == duty as u16 {
            return;
        }
        self.config.compare_b = duty as u16;
        self.pwm.set_config(&self.config);
    }
}
